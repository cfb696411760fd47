// Meeting-Local model lifecycle
//
// Downloads, verifies, stores and loads the Whisper and LLM models used for
// local transcription and summarization, and picks which ones are active:
// - Catalog of downloadable models
// - Storage budget, integrity checks and eviction
// - Model manager with a single-flight guard for mutations
// - Device tiering and adaptive switching in the AI coordinator

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod download;
pub mod error;
pub mod events;
pub mod inference;
pub mod manager;
pub mod storage;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, ModelDescriptor, ModelId, TaskKind};
pub use config::LifecycleConfig;
pub use coordinator::{AiCoordinator, PerformanceEvent};
pub use device::{DeviceCapability, DeviceDetector, PerformanceTier};
pub use error::{ModelError, Result};
pub use events::{ModelEvent, ModelObserver};
pub use inference::{InferenceCapability, ModelInstance, MockInference};
pub use manager::ModelManager;

/// Initialize env_logger to output to stderr (reads RUST_LOG env var).
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
