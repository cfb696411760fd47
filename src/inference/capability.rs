//! Inference capability boundary
//!
//! The native backends (whisper.cpp, llama.cpp) sit behind this trait so the
//! lifecycle code can be driven by any runtime, or by the mock in tests.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::TaskKind;

/// Opaque handle to a model loaded by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// A transcribed span of audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[async_trait]
pub trait InferenceCapability: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Load the weights at `path` for `task`
    async fn load_handle(&self, task: TaskKind, path: &Path) -> anyhow::Result<HandleId>;

    /// Release a handle. Must be safe to call from `Drop`.
    fn free_handle(&self, handle: HandleId);

    /// Transcribe 16 kHz mono samples
    async fn recognize(
        &self,
        handle: HandleId,
        samples: &[f32],
    ) -> anyhow::Result<Vec<TranscriptSegment>>;

    async fn summarize(&self, handle: HandleId, text: &str) -> anyhow::Result<String>;
}
