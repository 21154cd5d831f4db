//! Conversion between skinned game models and COLLADA documents.
//!
//! [export::dae::export_model_to_dae] writes a model's first level of detail
//! with its skeleton. [convert::dae::import_from_dae] reads a document written
//! by this crate or by one of the supported exporters back into per-part data.
pub mod convert;
pub mod error;
pub mod export;
pub mod model;
pub mod skeleton;

pub use convert::dae::{import_from_dae, ColladaMeshPart, ColladaMeshTable, DaeImportConfig};
pub use error::{DaeError, ErrorKind, Result};
pub use export::dae::{export_model_to_dae, DaeExportConfig};
pub use model::Model;
pub use skeleton::{SkeletonDatabase, SkeletonRecord, SkeletonSubset};
