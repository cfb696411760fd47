//! Mock inference
//!
//! Deterministic outputs used in mock mode, by placeholder instances, and as
//! the capability in tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::capability::{HandleId, InferenceCapability, TranscriptSegment};
use crate::catalog::TaskKind;

/// Sample rate assumed for incoming audio
pub const SAMPLE_RATE_HZ: u64 = 16_000;

const MOCK_SUMMARY_WORDS: usize = 24;

/// Fixed transcript covering the whole buffer. Empty input gives no segments.
pub fn mock_transcribe(samples: &[f32]) -> Vec<TranscriptSegment> {
    if samples.is_empty() {
        return Vec::new();
    }
    let end_ms = samples.len() as u64 * 1000 / SAMPLE_RATE_HZ;
    vec![TranscriptSegment {
        text: "[mock transcript]".to_string(),
        start_ms: 0,
        end_ms,
    }]
}

/// First words of the input, prefixed so callers can tell it is synthetic
pub fn mock_summarize(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return "[mock summary]".to_string();
    }
    let mut summary = words
        .iter()
        .take(MOCK_SUMMARY_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if words.len() > MOCK_SUMMARY_WORDS {
        summary.push_str("...");
    }
    format!("[mock summary] {}", summary)
}

/// In-process backend that tracks live handles without loading weights
#[derive(Default)]
pub struct MockInference {
    next_handle: AtomicU64,
    live: DashMap<HandleId, (TaskKind, PathBuf)>,
}

impl MockInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles loaded and not yet freed
    pub fn live_handles(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: HandleId) -> bool {
        self.live.contains_key(&handle)
    }
}

#[async_trait]
impl InferenceCapability for MockInference {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load_handle(&self, task: TaskKind, path: &Path) -> anyhow::Result<HandleId> {
        if !tokio::fs::try_exists(path).await? {
            anyhow::bail!("model file not found: {}", path.display());
        }
        let handle = HandleId(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.live.insert(handle, (task, path.to_path_buf()));
        log::debug!("Mock backend loaded {} as {}", path.display(), handle);
        Ok(handle)
    }

    fn free_handle(&self, handle: HandleId) {
        if self.live.remove(&handle).is_some() {
            log::debug!("Mock backend freed {}", handle);
        }
    }

    async fn recognize(
        &self,
        handle: HandleId,
        samples: &[f32],
    ) -> anyhow::Result<Vec<TranscriptSegment>> {
        if !self.is_live(handle) {
            anyhow::bail!("{} is not loaded", handle);
        }
        Ok(mock_transcribe(samples))
    }

    async fn summarize(&self, handle: HandleId, text: &str) -> anyhow::Result<String> {
        if !self.is_live(handle) {
            anyhow::bail!("{} is not loaded", handle);
        }
        Ok(mock_summarize(text))
    }
}
