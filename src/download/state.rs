//! Download state tracking

use std::collections::HashMap;

use dashmap::DashMap;
use serde::Serialize;

use crate::catalog::ModelId;

/// Progress of the most recent download attempt for one model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadState {
    /// Fraction in [0, 1]
    pub progress: f64,
    pub in_flight: bool,
    pub completed: bool,
    pub error: Option<String>,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

impl DownloadState {
    fn started(total_bytes: u64) -> Self {
        Self {
            in_flight: true,
            total_bytes,
            ..Self::default()
        }
    }
}

/// Registry of download states keyed by model id.
/// Reads never wait on an in-flight download.
#[derive(Debug, Default)]
pub struct DownloadStates {
    inner: DashMap<ModelId, DownloadState>,
}

impl DownloadStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, model_id: &ModelId, total_bytes: u64) {
        debug_assert!(self.in_flight().is_none(), "only one download may be in flight");
        self.inner
            .insert(model_id.clone(), DownloadState::started(total_bytes));
    }

    pub fn update(&self, model_id: &ModelId, downloaded_bytes: u64, total_bytes: u64) {
        if let Some(mut state) = self.inner.get_mut(model_id) {
            state.downloaded_bytes = downloaded_bytes;
            state.total_bytes = total_bytes;
            state.progress = if total_bytes > 0 {
                (downloaded_bytes as f64 / total_bytes as f64).min(1.0)
            } else {
                0.0
            };
        }
    }

    pub fn complete(&self, model_id: &ModelId) {
        if let Some(mut state) = self.inner.get_mut(model_id) {
            state.in_flight = false;
            state.completed = true;
            state.progress = 1.0;
            state.error = None;
        }
    }

    /// Record a failure. Also used when no transfer happened.
    pub fn fail(&self, model_id: &ModelId, error: impl Into<String>) {
        let mut state = self.inner.entry(model_id.clone()).or_default();
        state.in_flight = false;
        state.completed = false;
        state.error = Some(error.into());
    }

    /// Forget the state, e.g. after the model was deleted
    pub fn clear(&self, model_id: &ModelId) {
        self.inner.remove(model_id);
    }

    pub fn get(&self, model_id: &str) -> Option<DownloadState> {
        self.inner.get(model_id).map(|s| s.clone())
    }

    pub fn in_flight(&self) -> Option<ModelId> {
        self.inner
            .iter()
            .find(|entry| entry.in_flight)
            .map(|entry| entry.key().clone())
    }

    pub fn snapshot(&self) -> HashMap<ModelId, DownloadState> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let states = DownloadStates::new();
        let id = ModelId::from("whisper-tiny");

        states.begin(&id, 200);
        assert_eq!(states.in_flight(), Some(id.clone()));

        states.update(&id, 50, 200);
        let state = states.get("whisper-tiny").unwrap();
        assert_eq!(state.progress, 0.25);
        assert!(!state.completed);

        states.complete(&id);
        let state = states.get("whisper-tiny").unwrap();
        assert!(state.completed && !state.in_flight);
        assert_eq!(states.in_flight(), None);
    }

    #[test]
    fn test_fail_without_begin() {
        let states = DownloadStates::new();
        let id = ModelId::from("big");
        states.fail(&id, "Insufficient storage");
        let state = states.get("big").unwrap();
        assert_eq!(state.error.as_deref(), Some("Insufficient storage"));
        assert!(!state.in_flight);
    }
}
