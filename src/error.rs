//! Error types for model lifecycle operations

use thiserror::Error;

use crate::catalog::{ModelId, TaskKind};

/// Errors surfaced by the model manager and the coordinator.
///
/// Integrity and native-load failures are normally recovered inside the
/// manager (file deleted, placeholder substituted). Storage, concurrency and
/// initialization failures always reach the caller.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Unknown model id, or model not downloaded when a local file is required
    #[error("Model not found: {0}")]
    NotFound(String),

    /// Another download or switch is already running
    #[error("Another model operation is in progress: {0}")]
    Concurrency(String),

    /// Storage budget exceeded even after eviction
    #[error("Insufficient storage: need {required} bytes, {available} bytes available within budget")]
    Storage { required: u64, available: u64 },

    /// On-disk file does not match its descriptor
    #[error("Integrity check failed for {model}: {reason}")]
    Integrity { model: ModelId, reason: String },

    /// Transfer failed before or during streaming
    #[error("Network error: {0}")]
    Network(String),

    /// Native handle acquisition failed
    #[error("Failed to load model: {0}")]
    Load(String),

    /// Backend failed while running a loaded model
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Required directories could not be created
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Operation abandoned through its cancellation token
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Model is held by an active owner and cannot be released
    #[error("Model {0} is in use")]
    InUse(ModelId),

    /// Model serves a different task than the one requested
    #[error("Model {model} serves {actual}, not {expected}")]
    TaskMismatch {
        model: ModelId,
        expected: TaskKind,
        actual: TaskKind,
    },

    /// Coordinator does not keep an active implementation for this task
    #[error("Task {0} has no switchable implementation")]
    UnsupportedTask(TaskKind),

    /// Invalid configuration file
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Whether the caller may retry once the conflicting operation finishes
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Concurrency(_) | ModelError::Network(_) | ModelError::Cancelled(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
