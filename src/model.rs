//! In-memory form of a decoded binary model.
//!
//! These containers are filled by the model loader from archive data and are
//! read-only inputs to export. Only the first level of detail is converted.
use glam::{Vec2, Vec3};

/// A decoded model with its level-of-detail groups.
#[derive(Debug, Clone, Default)]
pub struct Model {
    /// File name of the model without extension, such as `c0101e0001_top`.
    pub name: String,
    pub lods: Vec<Lod>,
    /// Canonical bone order. A bone's position here is its global index.
    pub bone_list: Vec<String>,
    /// Per-mesh-group bone subsets that vertex bone indices point into.
    pub bone_index_mesh_list: Vec<BoneIndexMesh>,
}

#[derive(Debug, Clone, Default)]
pub struct Lod {
    pub meshes: Vec<Mesh>,
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertex_data: VertexData,
    pub parts: Vec<MeshPart>,
    /// Index into [Model::bone_index_mesh_list] for this mesh's bone subset.
    pub bone_list_index: usize,
    /// Body materials only carry diffuse and normal textures.
    pub is_body: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshPart {
    pub index_count: usize,
}

/// A bone subset for one mesh group.
#[derive(Debug, Clone, Default)]
pub struct BoneIndexMesh {
    /// Global [Model::bone_list] index for each local bone index.
    pub bone_indices: Vec<usize>,
}

/// Vertex attribute streams of a mesh.
///
/// Every non-empty stream has one row per vertex. The index buffer is the
/// concatenation of each part's indices in part order.
#[derive(Debug, Clone, Default)]
pub struct VertexData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub binormals: Vec<Vec3>,
    pub texture_coordinates0: Vec<Vec2>,
    pub texture_coordinates1: Vec<Vec2>,
    /// Up to four weights per vertex. Unused slots are zero.
    pub bone_weights: Vec<[f32; 4]>,
    /// Local bone indices matching [VertexData::bone_weights].
    pub bone_indices: Vec<[u8; 4]>,
    pub colors: Vec<[u8; 4]>,
    pub indices: Vec<u32>,
}

impl Model {
    /// Meshes of the highest quality level of detail.
    pub fn lod0_meshes(&self) -> &[Mesh] {
        self.lods.first().map(|l| l.meshes.as_slice()).unwrap_or_default()
    }

    /// The skeleton file name prefix, which is the race or model id.
    pub fn race_code(&self) -> &str {
        match self.name.char_indices().nth(5) {
            Some((end, _)) => &self.name[..end],
            None => &self.name,
        }
    }

    /// Translate a mesh's local bone index to its global [Model::bone_list] index.
    pub fn global_bone_index(&self, mesh: &Mesh, local: u8) -> Option<usize> {
        self.bone_index_mesh_list
            .get(mesh.bone_list_index)
            .and_then(|set| set.bone_indices.get(local as usize))
            .copied()
    }
}

impl Mesh {
    pub fn has_bone_weights(&self) -> bool {
        !self.vertex_data.bone_weights.is_empty()
    }
}
