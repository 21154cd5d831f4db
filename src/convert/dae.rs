use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;
use xmltree::{Element, XMLNode};

use super::profile::{parse_mesh_part_id, ArraySemantic, ImportProfile, MeshPartId};
use crate::export::dae::NATIVE_AUTHORING_TOOL;
use crate::error::{DaeError, DuplicateKind, Result};
use crate::model::Model;

/// Configuration for DAE import
#[derive(Debug, Clone)]
pub struct DaeImportConfig {
    /// Bone names containing this marker are matched without digit stripping.
    pub hair_bone_marker: String,
}

impl Default for DaeImportConfig {
    fn default() -> Self {
        Self {
            hair_bone_marker: "h0".to_string(),
        }
    }
}

/// Vertex and skin data read for one mesh part.
///
/// Float arrays are flat as they appear in the document. The per-semantic
/// index lists are decoded from `indices` using `index_stride`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColladaMeshPart {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub texture_coordinates0: Vec<f32>,
    pub texture_coordinates1: Vec<f32>,
    pub tangents: Vec<f32>,
    pub binormals: Vec<f32>,

    /// The `<p>` integers of every `<triangles>` element.
    pub indices: Vec<u32>,
    pub index_stride: usize,
    pub texcoord_stride: usize,
    pub position_indices: Vec<u32>,
    pub normal_indices: Vec<u32>,
    pub texture_coordinate0_indices: Vec<u32>,
    pub texture_coordinate1_indices: Vec<u32>,
    pub binormal_indices: Vec<u32>,

    /// Joint sids from the skin's `Name_array`.
    pub bone_names: Vec<String>,
    pub weights: Vec<f32>,
    /// Influence count per skinned vertex.
    pub vertex_counts: Vec<usize>,
    /// Global bone index and index into `weights` for each influence.
    pub bone_weight_pairs: Vec<(usize, usize)>,
}

impl ColladaMeshPart {
    /// Influences grouped per vertex as (global bone index, weight).
    pub fn vertex_weights(&self) -> Vec<Vec<(usize, f32)>> {
        let mut pairs = self.bone_weight_pairs.iter();
        self.vertex_counts
            .iter()
            .map(|&count| {
                pairs
                    .by_ref()
                    .take(count)
                    .map(|&(bone, weight)| (bone, self.weights.get(weight).copied().unwrap_or(0.0)))
                    .collect()
            })
            .collect()
    }
}

/// Imported parts keyed by mesh index, then part index.
pub type ColladaMeshTable = BTreeMap<usize, BTreeMap<usize, ColladaMeshPart>>;

/// Joint names the model's bone list does not contain.
///
/// Collected across every controller and reported together.
#[derive(Debug, Default)]
struct UnresolvedBones {
    bones: Vec<String>,
}

impl UnresolvedBones {
    fn push(&mut self, bone: &str) {
        if !self.bones.iter().any(|b| b == bone) {
            self.bones.push(bone.to_string());
        }
    }

    fn into_result(self) -> Result<()> {
        if self.bones.is_empty() {
            Ok(())
        } else {
            Err(DaeError::UnresolvedBones { bones: self.bones })
        }
    }
}

/// Read a COLLADA file into per-mesh-part data for `model`.
pub fn import_from_dae(
    model: &Model,
    input_path: &Path,
    config: &DaeImportConfig,
) -> Result<ColladaMeshTable> {
    if !input_path.is_file() {
        return Err(DaeError::DocumentNotFound(input_path.to_path_buf()));
    }
    let file = File::open(input_path)?;
    let root = Element::parse(BufReader::new(file))?;
    let table = import_from_element(model, &root, config)?;

    log::info!(
        "Imported {} mesh parts from {}",
        table.values().map(BTreeMap::len).sum::<usize>(),
        input_path.display()
    );
    Ok(table)
}

/// Read a COLLADA document held in memory.
pub fn import_from_str(model: &Model, text: &str, config: &DaeImportConfig) -> Result<ColladaMeshTable> {
    let root = Element::parse(text.as_bytes())?;
    import_from_element(model, &root, config)
}

/// Run both passes over a parsed `<COLLADA>` element.
///
/// Joint names are read and validated first. Geometry is read before
/// controllers so every controller can find its part.
pub fn import_from_element(
    model: &Model,
    root: &Element,
    config: &DaeImportConfig,
) -> Result<ColladaMeshTable> {
    let profile = read_profile(root)?;
    log::debug!("Using {:?} import profile", profile.tool);

    let joints = read_joint_names(root)?;

    let mut table: ColladaMeshTable = (0..model.lod0_meshes().len())
        .map(|mesh| (mesh, BTreeMap::new()))
        .collect();

    let geometry_names = read_geometries(root, &profile, &mut table)?;
    read_controllers(
        root,
        &profile,
        model,
        config,
        &joints,
        &geometry_names,
        &mut table,
    )?;

    Ok(table)
}

fn read_profile(root: &Element) -> Result<ImportProfile> {
    let tool = find_child(root, "asset")
        .into_iter()
        .flat_map(|asset| find_all_children(asset, "contributor"))
        .find_map(|contributor| find_child(contributor, "authoring_tool"))
        .and_then(get_element_text);

    match tool {
        Some(tool) => ImportProfile::from_authoring_tool(tool.trim()),
        None => {
            log::warn!("Document has no authoring tool, assuming {NATIVE_AUTHORING_TOOL}");
            ImportProfile::from_authoring_tool(NATIVE_AUTHORING_TOOL)
        }
    }
}

/// Map each joint sid in the first visual scene to its display name.
fn read_joint_names(root: &Element) -> Result<HashMap<String, String>> {
    let mut joints = HashMap::new();
    if let Some(scene) = find_child(root, "library_visual_scenes")
        .and_then(|library| find_child(library, "visual_scene"))
    {
        collect_joint_names(scene, &mut joints)?;
    }

    if joints.is_empty() {
        return Err(DaeError::NoBones);
    }
    log::debug!("Found {} joints", joints.len());
    Ok(joints)
}

fn collect_joint_names(parent: &Element, joints: &mut HashMap<String, String>) -> Result<()> {
    for node in find_all_children(parent, "node") {
        if let Some(sid) = node.attributes.get("sid") {
            let name = node.attributes.get("name").unwrap_or(sid);
            if joints.insert(sid.clone(), name.clone()).is_some() {
                return Err(DaeError::Duplicate {
                    kind: DuplicateKind::BoneSid,
                    key: sid.clone(),
                });
            }
        }
        collect_joint_names(node, joints)?;
    }
    Ok(())
}

/// Returns the name of every geometry keyed by id.
fn read_geometries(
    root: &Element,
    profile: &ImportProfile,
    table: &mut ColladaMeshTable,
) -> Result<HashMap<String, String>> {
    let mut names_by_id: HashMap<String, String> = HashMap::new();
    let mut names: HashSet<String> = HashSet::new();

    for library in find_all_children(root, "library_geometries") {
        for geometry in find_all_children(library, "geometry") {
            let id = attribute(geometry, "id");
            let name = geometry
                .attributes
                .get("name")
                .map(String::as_str)
                .unwrap_or(id);

            if names_by_id.contains_key(id) {
                return Err(DaeError::Duplicate {
                    kind: DuplicateKind::GeometryId,
                    key: id.to_string(),
                });
            }
            if !names.insert(name.to_string()) {
                return Err(DaeError::Duplicate {
                    kind: DuplicateKind::GeometryName,
                    key: name.to_string(),
                });
            }
            names_by_id.insert(id.to_string(), name.to_string());

            let MeshPartId { mesh, part } =
                parse_mesh_part_id(name).ok_or_else(|| DaeError::MalformedElement {
                    element: "geometry".to_string(),
                    owner: id.to_string(),
                    reason: format!("'{name}' does not end in a mesh number"),
                })?;
            let parts = table.get_mut(&mesh).ok_or_else(|| DaeError::MalformedElement {
                element: "geometry".to_string(),
                owner: id.to_string(),
                reason: format!("the model has no mesh {mesh}"),
            })?;
            if parts.contains_key(&part) {
                return Err(DaeError::Duplicate {
                    kind: DuplicateKind::MeshPart,
                    key: format!("{mesh}.{part}"),
                });
            }

            let mesh_element =
                find_child(geometry, "mesh").ok_or_else(|| DaeError::MalformedElement {
                    element: "geometry".to_string(),
                    owner: id.to_string(),
                    reason: "missing <mesh>".to_string(),
                })?;
            let data = read_mesh(mesh_element, profile, id)?;
            log::debug!(
                "Geometry {id}: mesh {mesh} part {part}, {} vertices, {} triangles",
                data.positions.len() / 3,
                data.position_indices.len() / 3
            );
            parts.insert(part, data);
        }
    }

    Ok(names_by_id)
}

fn read_mesh(mesh: &Element, profile: &ImportProfile, owner: &str) -> Result<ColladaMeshPart> {
    let mut part = ColladaMeshPart {
        texcoord_stride: profile.texcoord_stride,
        ..Default::default()
    };

    for source in find_all_children(mesh, "source") {
        for array in find_all_children(source, "float_array") {
            let id = attribute(array, "id");
            let Some(semantic) = profile.classify_float_array(id) else {
                continue;
            };
            // Positions come first. Anything before them is a partial array.
            if semantic != ArraySemantic::Positions && part.positions.is_empty() {
                log::debug!("Ignoring {id} in {owner}, no positions read yet");
                continue;
            }
            let values = parse_values::<f32>(array, owner)?;
            let target = match semantic {
                ArraySemantic::Positions => &mut part.positions,
                ArraySemantic::Normals => &mut part.normals,
                ArraySemantic::TexCoord0 => &mut part.texture_coordinates0,
                ArraySemantic::TexCoord1 => &mut part.texture_coordinates1,
                ArraySemantic::Tangents => &mut part.tangents,
                ArraySemantic::Binormals => &mut part.binormals,
            };
            target.extend(values);
        }
    }

    for triangles in find_all_children(mesh, "triangles") {
        if let Some(p) = find_child(triangles, "p") {
            part.indices.extend(parse_values::<u32>(p, owner)?);
        }
    }

    let has_texcoord1 = !part.texture_coordinates1.is_empty();
    let has_binormals = !part.binormals.is_empty();
    let layout = profile.index_layout(has_texcoord1);
    part.index_stride = layout.stride;

    if part.indices.len() % layout.stride != 0 {
        return Err(DaeError::MalformedElement {
            element: "p".to_string(),
            owner: owner.to_string(),
            reason: format!(
                "{} indices is not a multiple of the stride {}",
                part.indices.len(),
                layout.stride
            ),
        });
    }

    for vertex in part.indices.chunks_exact(layout.stride) {
        part.position_indices.push(vertex[layout.position]);
        part.normal_indices.push(vertex[layout.normal]);
        part.texture_coordinate0_indices.push(vertex[layout.texcoord0]);
        if has_texcoord1 {
            part.texture_coordinate1_indices.push(vertex[layout.texcoord1]);
        }
        if has_binormals {
            part.binormal_indices.push(vertex[layout.binormal]);
        }
    }

    Ok(part)
}

fn read_controllers(
    root: &Element,
    profile: &ImportProfile,
    model: &Model,
    config: &DaeImportConfig,
    joints: &HashMap<String, String>,
    geometry_names: &HashMap<String, String>,
    table: &mut ColladaMeshTable,
) -> Result<()> {
    let bone_indices: HashMap<&str, usize> = model
        .bone_list
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let mut unresolved = UnresolvedBones::default();

    for library in find_all_children(root, "library_controllers") {
        for controller in find_all_children(library, "controller") {
            let id = attribute(controller, "id");
            let skin = find_child(controller, "skin").ok_or_else(|| DaeError::MalformedElement {
                element: "controller".to_string(),
                owner: id.to_string(),
                reason: "missing <skin>".to_string(),
            })?;

            let key = if profile.blender_controllers {
                let source = attribute(skin, "source").trim_start_matches('#');
                geometry_names
                    .get(source)
                    .map(String::as_str)
                    .ok_or_else(|| DaeError::UnknownReference {
                        owner: format!("Controller {id}"),
                        target: format!("geometry {source}"),
                    })?
            } else {
                id
            };

            let MeshPartId { mesh, part } =
                parse_mesh_part_id(key).ok_or_else(|| DaeError::MalformedElement {
                    element: "controller".to_string(),
                    owner: id.to_string(),
                    reason: format!("'{key}' does not end in a mesh number"),
                })?;
            let data = table
                .get_mut(&mesh)
                .and_then(|parts| parts.get_mut(&part))
                .ok_or_else(|| DaeError::UnknownReference {
                    owner: format!("Controller {id}"),
                    target: format!("mesh {mesh} part {part}"),
                })?;

            read_skin(
                skin,
                id,
                data,
                joints,
                &bone_indices,
                &config.hair_bone_marker,
                &mut unresolved,
            )?;
        }
    }

    unresolved.into_result()
}

fn read_skin(
    skin: &Element,
    owner: &str,
    part: &mut ColladaMeshPart,
    joints: &HashMap<String, String>,
    bone_indices: &HashMap<&str, usize>,
    hair_bone_marker: &str,
    unresolved: &mut UnresolvedBones,
) -> Result<()> {
    for source in find_all_children(skin, "source") {
        if let Some(names) = find_child(source, "Name_array") {
            part.bone_names = get_element_text(names)
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect();
        }
        for array in find_all_children(source, "float_array") {
            if attribute(array, "id").to_lowercase().contains("weights-array") {
                part.weights = parse_values::<f32>(array, owner)?;
            }
        }
    }

    let malformed = |element: &str, reason: String| DaeError::MalformedElement {
        element: element.to_string(),
        owner: owner.to_string(),
        reason,
    };

    let vertex_weights = find_child(skin, "vertex_weights")
        .ok_or_else(|| malformed("skin", "missing <vertex_weights>".to_string()))?;
    part.vertex_counts = match find_child(vertex_weights, "vcount") {
        Some(vcount) => parse_values::<usize>(vcount, owner)?,
        None => Vec::new(),
    };
    let v = match find_child(vertex_weights, "v") {
        Some(v) => parse_values::<usize>(v, owner)?,
        None => Vec::new(),
    };

    let influences: usize = part.vertex_counts.iter().sum();
    if v.len() != influences * 2 {
        return Err(malformed(
            "v",
            format!("expected {} values for {influences} influences, found {}", influences * 2, v.len()),
        ));
    }

    for pair in v.chunks_exact(2) {
        let (joint, weight) = (pair[0], pair[1]);
        if weight >= part.weights.len() {
            return Err(malformed("v", format!("weight index {weight} is out of range")));
        }
        let sid = part
            .bone_names
            .get(joint)
            .ok_or_else(|| malformed("v", format!("joint index {joint} is out of range")))?;
        let name = joints.get(sid).ok_or_else(|| DaeError::UnknownReference {
            owner: format!("Controller {owner}"),
            target: format!("joint {sid}"),
        })?;

        let canonical = canonical_bone_name(name, hair_bone_marker);
        match bone_indices.get(&*canonical) {
            Some(&bone) => part.bone_weight_pairs.push((bone, weight)),
            None => unresolved.push(name),
        }
    }

    Ok(())
}

/// The bone list spelling of a joint name.
///
/// Exporters number duplicated bones, so digits are dropped unless the name
/// is a hair bone, whose digits are part of the name.
fn canonical_bone_name<'a>(name: &'a str, hair_bone_marker: &str) -> Cow<'a, str> {
    if name.contains(hair_bone_marker) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(name.chars().filter(|c| !c.is_ascii_digit()).collect())
    }
}

fn attribute<'a>(element: &'a Element, name: &str) -> &'a str {
    element
        .attributes
        .get(name)
        .map(String::as_str)
        .unwrap_or_default()
}

fn parse_values<T: FromStr>(element: &Element, owner: &str) -> Result<Vec<T>> {
    get_element_text(element)
        .unwrap_or_default()
        .split_whitespace()
        .map(|s| {
            s.parse().map_err(|_| DaeError::MalformedElement {
                element: element.name.clone(),
                owner: owner.to_string(),
                reason: format!("'{s}' is not a valid number"),
            })
        })
        .collect()
}

fn find_child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    element.children.iter().find_map(|node| match node {
        XMLNode::Element(child) if child.name == name => Some(child),
        _ => None,
    })
}

fn get_element_text(element: &Element) -> Option<String> {
    element.children.iter().find_map(|node| match node {
        XMLNode::Text(text) => Some(text.clone()),
        _ => None,
    })
}

fn find_all_children<'a>(element: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    element.children.iter().filter_map(move |node| match node {
        XMLNode::Element(child) if child.name == name => Some(child),
        _ => None,
    })
}
