//! Model Catalog
//!
//! Static registry of downloadable model artifacts.
//!
//! Module structure:
//! - types.rs: ModelId, TaskKind, ModelDescriptor
//! - registry.rs: Built-in model list and the Catalog lookup struct

pub mod registry;
pub mod types;

pub use registry::{builtin_models, Catalog};
pub use types::{ModelDescriptor, ModelFormat, ModelId, ResourceRequirements, TaskKind, GIB, MIB};
