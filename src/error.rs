use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for COLLADA export and import
#[derive(Error, Debug)]
pub enum DaeError {
    /// I/O error while reading or writing a file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The COLLADA document is not well-formed XML
    #[error("XML parse error: {0}")]
    XmlParse(#[from] xmltree::ParseError),

    /// The COLLADA document could not be emitted
    #[error("XML write error: {0}")]
    XmlWrite(#[from] xmltree::Error),

    /// A skeleton database line is not a valid bone record
    #[error("Skeleton record on line {line} is invalid: {source}")]
    SkeletonRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The skeleton file for the model's race does not exist
    #[error("Skeleton file not found: {}", .0.display())]
    SkeletonNotFound(PathBuf),

    /// The COLLADA document to import does not exist
    #[error("COLLADA document not found: {}", .0.display())]
    DocumentNotFound(PathBuf),

    /// The skeleton database is older than the model referencing it
    #[error("The skeleton {skeleton} does not contain bone {bone}. Consider updating the skeleton file.")]
    BoneNotInSkeleton { skeleton: String, bone: String },

    /// Neither of the known root bone names exists in the resolved skeleton
    #[error("No root bone found, tried: {}", .tried.join(", "))]
    MissingRootBone { tried: Vec<String> },

    /// The visual scene of an imported document defines no joints
    #[error("No bones were found in the dae file")]
    NoBones,

    /// The declared authoring tool is not one of the supported exporters
    #[error("The authoring tool being used is unsupported. Tool: {0}")]
    UnsupportedAuthoringTool(String),

    /// A mesh part's indices do not follow the contiguous vertex layout
    #[error("Mesh {mesh} part {part}: {reason}")]
    InvalidLayout {
        mesh: usize,
        part: usize,
        reason: String,
    },

    /// A vertex stream has fewer rows than the mesh has positions
    #[error("Mesh {mesh}: {stream} has {len} rows, expected at least {expected}")]
    StreamLength {
        mesh: usize,
        stream: &'static str,
        len: usize,
        expected: usize,
    },

    /// Element content could not be decoded
    #[error("Malformed <{element}> in {owner}: {reason}")]
    MalformedElement {
        element: String,
        owner: String,
        reason: String,
    },

    /// An element references a mesh, part, or bone that is not present
    #[error("{owner} references unknown {target}")]
    UnknownReference { owner: String, target: String },

    /// The same key appeared twice where it must be unique
    #[error("Duplicate {kind} found: {key}")]
    Duplicate { kind: DuplicateKind, key: String },

    /// Bones used by skin controllers that the model does not have
    #[error("The model contains extra bones: {}", .bones.join(", "))]
    UnresolvedBones { bones: Vec<String> },
}

/// What was duplicated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    BoneSid,
    GeometryId,
    GeometryName,
    MeshPart,
    SkeletonBone,
}

impl std::fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DuplicateKind::BoneSid => "bone sid",
            DuplicateKind::GeometryId => "geometry id",
            DuplicateKind::GeometryName => "geometry name",
            DuplicateKind::MeshPart => "mesh part",
            DuplicateKind::SkeletonBone => "skeleton bone",
        };
        f.write_str(text)
    }
}

/// Coarse classification used by callers to decide how to report a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    MissingResource,
    FormatViolation,
    StructuralDuplicate,
    UnresolvedReference,
}

impl DaeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DaeError::Io(_) => ErrorKind::Io,
            DaeError::XmlParse(_) | DaeError::XmlWrite(_) | DaeError::SkeletonRecord { .. } => {
                ErrorKind::Parse
            }
            DaeError::SkeletonNotFound(_)
            | DaeError::DocumentNotFound(_)
            | DaeError::BoneNotInSkeleton { .. }
            | DaeError::MissingRootBone { .. }
            | DaeError::NoBones => ErrorKind::MissingResource,
            DaeError::UnsupportedAuthoringTool(_)
            | DaeError::InvalidLayout { .. }
            | DaeError::StreamLength { .. }
            | DaeError::MalformedElement { .. } => ErrorKind::FormatViolation,
            DaeError::Duplicate { .. } => ErrorKind::StructuralDuplicate,
            DaeError::UnknownReference { .. } | DaeError::UnresolvedBones { .. } => {
                ErrorKind::UnresolvedReference
            }
        }
    }
}

/// Result type using DaeError
pub type Result<T> = std::result::Result<T, DaeError>;
