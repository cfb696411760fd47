//! Inference backends and loaded instances
//!
//! Module structure:
//! - capability.rs: InferenceCapability trait implemented by native runtimes
//! - instance.rs: ModelInstance, owner of one backend handle
//! - mock.rs: deterministic mock outputs and the MockInference backend

pub mod capability;
pub mod instance;
pub mod mock;

pub use capability::{HandleId, InferenceCapability, TranscriptSegment};
pub use instance::ModelInstance;
pub use mock::{mock_summarize, mock_transcribe, MockInference};
