//! Coordinator state

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{ModelId, TaskKind};
use crate::error::{ModelError, Result};
use crate::inference::{mock_summarize, mock_transcribe, ModelInstance, TranscriptSegment};

/// What currently serves a task
#[derive(Debug, Clone)]
pub enum ActiveImplementation {
    Real(Arc<ModelInstance>),
    Mock,
}

impl ActiveImplementation {
    pub fn is_mock(&self) -> bool {
        matches!(self, ActiveImplementation::Mock)
    }

    pub fn instance(&self) -> Option<&Arc<ModelInstance>> {
        match self {
            ActiveImplementation::Real(instance) => Some(instance),
            ActiveImplementation::Mock => None,
        }
    }

    pub async fn recognize(&self, samples: &[f32]) -> Result<Vec<TranscriptSegment>> {
        match self {
            ActiveImplementation::Real(instance) => instance.recognize(samples).await,
            ActiveImplementation::Mock => Ok(mock_transcribe(samples)),
        }
    }

    pub async fn summarize(&self, text: &str) -> Result<String> {
        match self {
            ActiveImplementation::Real(instance) => instance.summarize(text).await,
            ActiveImplementation::Mock => Ok(mock_summarize(text)),
        }
    }
}

/// Configured model and its implementation for one task
#[derive(Debug, Clone)]
pub struct TaskSlot {
    pub model_id: ModelId,
    pub implementation: ActiveImplementation,
}

impl TaskSlot {
    pub fn mock(model_id: ModelId) -> Self {
        Self {
            model_id,
            implementation: ActiveImplementation::Mock,
        }
    }

    /// Configured model is the one actually serving
    pub fn is_serving(&self, model_id: &ModelId) -> bool {
        &self.model_id == model_id
            && self
                .implementation
                .instance()
                .map(|i| i.model_id() == model_id)
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorState {
    pub speech: TaskSlot,
    pub summarization: TaskSlot,
    pub use_mock: bool,
    pub adaptive_enabled: bool,
}

impl CoordinatorState {
    pub fn new(speech_model: ModelId, summarization_model: ModelId, use_mock: bool) -> Self {
        Self {
            speech: TaskSlot::mock(speech_model),
            summarization: TaskSlot::mock(summarization_model),
            use_mock,
            adaptive_enabled: false,
        }
    }

    pub fn slot(&self, task: TaskKind) -> Result<&TaskSlot> {
        match task {
            TaskKind::SpeechRecognition => Ok(&self.speech),
            TaskKind::TextSummarization => Ok(&self.summarization),
            other => Err(ModelError::UnsupportedTask(other)),
        }
    }

    pub fn slot_mut(&mut self, task: TaskKind) -> Result<&mut TaskSlot> {
        match task {
            TaskKind::SpeechRecognition => Ok(&mut self.speech),
            TaskKind::TextSummarization => Ok(&mut self.summarization),
            other => Err(ModelError::UnsupportedTask(other)),
        }
    }

    pub fn snapshot(&self, is_switching: bool) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            speech_model: self.speech.model_id.clone(),
            summarization_model: self.summarization.model_id.clone(),
            speech_mock: self.speech.implementation.is_mock(),
            summarization_mock: self.summarization.implementation.is_mock(),
            use_mock: self.use_mock,
            adaptive_enabled: self.adaptive_enabled,
            is_switching,
        }
    }
}

/// Serializable view of the coordinator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorSnapshot {
    pub speech_model: ModelId,
    pub summarization_model: ModelId,
    pub speech_mock: bool,
    pub summarization_mock: bool,
    pub use_mock: bool,
    pub adaptive_enabled: bool,
    pub is_switching: bool,
}
