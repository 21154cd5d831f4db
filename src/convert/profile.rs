//! Naming and stride conventions of the COLLADA exporters accepted on import.
use crate::error::{DaeError, Result};

/// The program that wrote a COLLADA document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthoringTool {
    /// Documents written by this crate.
    Native,
    OpenCollada,
    Fbx,
    Blender,
}

impl AuthoringTool {
    /// Identify the tool from an `<authoring_tool>` string.
    pub fn detect(text: &str) -> Result<Self> {
        if text.contains("OpenCOLLADA") {
            Ok(Self::OpenCollada)
        } else if text.contains("FBX") {
            Ok(Self::Fbx)
        } else if text.contains("Exporter for Blender") {
            Ok(Self::Blender)
        } else if text.contains("TexTools") {
            Ok(Self::Native)
        } else {
            Err(DaeError::UnsupportedAuthoringTool(text.to_string()))
        }
    }
}

/// What a `<float_array>` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySemantic {
    Positions,
    Normals,
    TexCoord0,
    TexCoord1,
    Tangents,
    Binormals,
}

/// Float array id suffixes and index strides for one authoring tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportProfile {
    pub tool: AuthoringTool,
    pub positions: &'static str,
    pub normals: &'static str,
    pub texcoord0: &'static str,
    pub texcoord1: &'static str,
    pub tangents: &'static str,
    pub binormals: &'static str,
    /// Integers per vertex in a `<p>` element.
    pub index_stride: usize,
    /// Floats per texture coordinate.
    pub texcoord_stride: usize,
    /// Controller ids do not follow geometry names and must be resolved
    /// through the skin's source geometry.
    pub blender_controllers: bool,
}

const NATIVE: ImportProfile = ImportProfile {
    tool: AuthoringTool::Native,
    positions: "-positions-array",
    normals: "-normals-array",
    texcoord0: "-map0-array",
    texcoord1: "-map1-array",
    tangents: "-textangents",
    binormals: "-texbinormals",
    index_stride: 4,
    texcoord_stride: 2,
    blender_controllers: false,
};

impl ImportProfile {
    pub fn for_tool(tool: AuthoringTool) -> Self {
        match tool {
            AuthoringTool::Native => NATIVE,
            AuthoringTool::OpenCollada => Self {
                tool,
                texcoord0: "-map1-array",
                texcoord1: "-map2-array",
                tangents: "-map1-textangents",
                binormals: "-map1-texbinormals",
                index_stride: 6,
                texcoord_stride: 3,
                ..NATIVE
            },
            AuthoringTool::Fbx => Self {
                tool,
                positions: "-position-array",
                normals: "-normal0-array",
                texcoord0: "-uv0-array",
                texcoord1: "-uv1-array",
                ..NATIVE
            },
            AuthoringTool::Blender => Self {
                tool,
                texcoord0: "-texcoord-0-array",
                texcoord1: "-texcoord-1-array",
                tangents: "-tangents-array",
                binormals: "-bitangents-array",
                index_stride: 1,
                blender_controllers: true,
                ..NATIVE
            },
        }
    }

    pub fn from_authoring_tool(text: &str) -> Result<Self> {
        AuthoringTool::detect(text).map(Self::for_tool)
    }

    /// Classify a float array by its id.
    ///
    /// Suffixes are tested in a fixed order so an id is only ever assigned
    /// to the first semantic it matches.
    pub fn classify_float_array(&self, id: &str) -> Option<ArraySemantic> {
        let id = id.to_lowercase();
        [
            (self.positions, ArraySemantic::Positions),
            (self.normals, ArraySemantic::Normals),
            (self.texcoord0, ArraySemantic::TexCoord0),
            (self.texcoord1, ArraySemantic::TexCoord1),
            (self.tangents, ArraySemantic::Tangents),
            (self.binormals, ArraySemantic::Binormals),
        ]
        .into_iter()
        .find(|(suffix, _)| id.contains(suffix))
        .map(|(_, semantic)| semantic)
    }

    /// Where each semantic's index sits inside one vertex of a `<p>` element.
    pub fn index_layout(&self, has_texcoord1: bool) -> IndexLayout {
        match self.index_stride {
            1 => IndexLayout {
                stride: 1,
                position: 0,
                normal: 0,
                texcoord0: 0,
                texcoord1: 0,
                binormal: 0,
            },
            6 if has_texcoord1 => IndexLayout {
                stride: 6,
                texcoord1: 4,
                ..IndexLayout::FOUR
            },
            _ => IndexLayout::FOUR,
        }
    }
}

/// Offsets of each semantic within one vertex of a `<p>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLayout {
    pub stride: usize,
    pub position: usize,
    pub normal: usize,
    pub texcoord0: usize,
    pub texcoord1: usize,
    pub binormal: usize,
}

impl IndexLayout {
    const FOUR: Self = Self {
        stride: 4,
        position: 0,
        normal: 1,
        texcoord0: 2,
        texcoord1: 2,
        binormal: 3,
    };
}

/// Mesh and part numbers encoded in a geometry or controller id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MeshPartId {
    pub mesh: usize,
    pub part: usize,
}

/// Parse `..._<mesh>[.<part>]...` from the segment after the last underscore.
///
/// `c0101e0001_top_2` is mesh 2 part 0 and `geom-c0101e0001_top_2.1-skin1`
/// is mesh 2 part 1.
pub fn parse_mesh_part_id(id: &str) -> Option<MeshPartId> {
    let (_, tail) = id.rsplit_once('_')?;
    let (mesh, rest) = leading_number(tail)?;
    let part = match rest.strip_prefix('.') {
        Some(rest) => leading_number(rest).map(|(part, _)| part).unwrap_or(0),
        None => 0,
    };
    Some(MeshPartId { mesh, part })
}

fn leading_number(text: &str) -> Option<(usize, &str)> {
    let end = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let value = text[..end].parse().ok()?;
    Some((value, &text[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_native_profile() {
        let profile = ImportProfile::from_authoring_tool("FFXIV TexTools2").unwrap();
        assert_eq!(profile.tool, AuthoringTool::Native);
        assert_eq!(profile.positions, "-positions-array");
        assert_eq!(profile.texcoord0, "-map0-array");
        assert_eq!(profile.index_stride, 4);
        assert_eq!(profile.texcoord_stride, 2);
        assert!(!profile.blender_controllers);
    }

    #[test]
    fn test_opencollada_profile() {
        let profile =
            ImportProfile::from_authoring_tool("OpenCOLLADA for 3ds Max;  Version: 1.6").unwrap();
        assert_eq!(profile.tool, AuthoringTool::OpenCollada);
        assert_eq!(profile.positions, "-positions-array");
        assert_eq!(profile.texcoord0, "-map1-array");
        assert_eq!(profile.texcoord1, "-map2-array");
        assert_eq!(profile.tangents, "-map1-textangents");
        assert_eq!(profile.binormals, "-map1-texbinormals");
        assert_eq!(profile.index_stride, 6);
        assert_eq!(profile.texcoord_stride, 3);
    }

    #[test]
    fn test_fbx_profile() {
        let profile = ImportProfile::from_authoring_tool("FBX COLLADA exporter").unwrap();
        assert_eq!(profile.tool, AuthoringTool::Fbx);
        assert_eq!(profile.positions, "-position-array");
        assert_eq!(profile.normals, "-normal0-array");
        assert_eq!(profile.texcoord0, "-uv0-array");
        assert_eq!(profile.texcoord1, "-uv1-array");
        assert_eq!(profile.tangents, "-textangents");
        assert_eq!(profile.index_stride, 4);
    }

    #[test]
    fn test_blender_profile() {
        let profile =
            ImportProfile::from_authoring_tool("Better Collada Exporter for Blender").unwrap();
        assert_eq!(profile.tool, AuthoringTool::Blender);
        assert_eq!(profile.texcoord0, "-texcoord-0-array");
        assert_eq!(profile.binormals, "-bitangents-array");
        assert_eq!(profile.index_stride, 1);
        assert!(profile.blender_controllers);
    }

    #[test]
    fn test_unknown_tool() {
        let err = ImportProfile::from_authoring_tool("Maya 2018").unwrap_err();
        assert!(matches!(err, DaeError::UnsupportedAuthoringTool(ref t) if t == "Maya 2018"));
        assert_eq!(err.kind(), ErrorKind::FormatViolation);
    }

    #[test]
    fn test_classify_native_arrays() {
        let profile = ImportProfile::for_tool(AuthoringTool::Native);
        let classify = |id: &str| profile.classify_float_array(id);
        assert_eq!(
            classify("geom-c0101e0001_top_0-positions-array"),
            Some(ArraySemantic::Positions)
        );
        assert_eq!(
            classify("geom-c0101e0001_top_0-map0-array"),
            Some(ArraySemantic::TexCoord0)
        );
        assert_eq!(
            classify("geom-c0101e0001_top_0-map0-textangents-array"),
            Some(ArraySemantic::Tangents)
        );
        assert_eq!(
            classify("geom-c0101e0001_top_0-map0-texbinormals-array"),
            Some(ArraySemantic::Binormals)
        );
        assert_eq!(classify("geom-c0101e0001_top_0-skin1-weights-array"), None);
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let profile = ImportProfile::for_tool(AuthoringTool::Fbx);
        assert_eq!(
            profile.classify_float_array("Mesh_0-POSITION-array"),
            Some(ArraySemantic::Positions)
        );
    }

    #[test]
    fn test_blender_bitangents_are_not_tangents() {
        let profile = ImportProfile::for_tool(AuthoringTool::Blender);
        assert_eq!(
            profile.classify_float_array("mesh_0-bitangents-array"),
            Some(ArraySemantic::Binormals)
        );
        assert_eq!(
            profile.classify_float_array("mesh_0-tangents-array"),
            Some(ArraySemantic::Tangents)
        );
    }

    #[test]
    fn test_index_layout_degrades_without_second_uv() {
        let profile = ImportProfile::for_tool(AuthoringTool::OpenCollada);
        let with_uv1 = profile.index_layout(true);
        assert_eq!(with_uv1.stride, 6);
        assert_eq!(with_uv1.texcoord1, 4);
        assert_eq!(profile.index_layout(false), IndexLayout::FOUR);

        let blender = ImportProfile::for_tool(AuthoringTool::Blender).index_layout(true);
        assert_eq!(blender.stride, 1);
        assert_eq!(blender.binormal, 0);
    }

    #[test]
    fn test_parse_mesh_part_id() {
        assert_eq!(
            parse_mesh_part_id("c0101e0001_top_2"),
            Some(MeshPartId { mesh: 2, part: 0 })
        );
        assert_eq!(
            parse_mesh_part_id("geom-c0101e0001_top_0.3"),
            Some(MeshPartId { mesh: 0, part: 3 })
        );
        assert_eq!(
            parse_mesh_part_id("geom-c0101e0001_top_1.2-skin1"),
            Some(MeshPartId { mesh: 1, part: 2 })
        );
        assert_eq!(
            parse_mesh_part_id("geom-c0101e0001_top_4-skin1"),
            Some(MeshPartId { mesh: 4, part: 0 })
        );
        assert_eq!(parse_mesh_part_id("geom-c0101e0001_top"), None);
        assert_eq!(parse_mesh_part_id("nounderscore"), None);
    }
}
