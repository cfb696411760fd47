//! Loaded model instances
//!
//! A `ModelInstance` owns its backend handle; the handle is freed exactly
//! once, when the last reference is dropped or `release` is called.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::capability::{HandleId, InferenceCapability, TranscriptSegment};
use super::mock::{mock_summarize, mock_transcribe};
use crate::catalog::{ModelDescriptor, ModelId, TaskKind};
use crate::error::{ModelError, Result};

enum Backing {
    Native {
        capability: Arc<dyn InferenceCapability>,
        handle: Mutex<Option<HandleId>>,
    },
    /// Stand-in after a failed native load; produces mock output
    Placeholder { reason: String },
}

pub struct ModelInstance {
    model_id: ModelId,
    task: TaskKind,
    path: Option<PathBuf>,
    loaded_at: DateTime<Utc>,
    backing: Backing,
}

impl ModelInstance {
    pub(crate) fn native(
        descriptor: &ModelDescriptor,
        path: PathBuf,
        capability: Arc<dyn InferenceCapability>,
        handle: HandleId,
    ) -> Self {
        Self {
            model_id: descriptor.id.clone(),
            task: descriptor.task,
            path: Some(path),
            loaded_at: Utc::now(),
            backing: Backing::Native {
                capability,
                handle: Mutex::new(Some(handle)),
            },
        }
    }

    pub(crate) fn placeholder(descriptor: &ModelDescriptor, reason: impl Into<String>) -> Self {
        Self {
            model_id: descriptor.id.clone(),
            task: descriptor.task,
            path: None,
            loaded_at: Utc::now(),
            backing: Backing::Placeholder {
                reason: reason.into(),
            },
        }
    }

    pub fn model_id(&self) -> &ModelId {
        &self.model_id
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.backing, Backing::Placeholder { .. })
    }

    /// Why the native load failed, for placeholders
    pub fn placeholder_reason(&self) -> Option<&str> {
        match &self.backing {
            Backing::Placeholder { reason } => Some(reason),
            Backing::Native { .. } => None,
        }
    }

    /// Current native handle; `None` for placeholders and released instances
    pub fn handle(&self) -> Option<HandleId> {
        match &self.backing {
            Backing::Native { handle, .. } => handle.lock().ok().and_then(|h| *h),
            Backing::Placeholder { .. } => None,
        }
    }

    pub async fn recognize(&self, samples: &[f32]) -> Result<Vec<TranscriptSegment>> {
        self.expect_task(TaskKind::SpeechRecognition)?;
        match &self.backing {
            Backing::Placeholder { .. } => Ok(mock_transcribe(samples)),
            Backing::Native { capability, .. } => {
                let handle = self.live_handle()?;
                capability
                    .recognize(handle, samples)
                    .await
                    .map_err(|e| ModelError::Inference(format!("{}: {:#}", self.model_id, e)))
            }
        }
    }

    pub async fn summarize(&self, text: &str) -> Result<String> {
        self.expect_task(TaskKind::TextSummarization)?;
        match &self.backing {
            Backing::Placeholder { .. } => Ok(mock_summarize(text)),
            Backing::Native { capability, .. } => {
                let handle = self.live_handle()?;
                capability
                    .summarize(handle, text)
                    .await
                    .map_err(|e| ModelError::Inference(format!("{}: {:#}", self.model_id, e)))
            }
        }
    }

    /// Free the native handle now. Later calls are no-ops.
    pub fn release(&self) {
        if let Backing::Native { capability, handle } = &self.backing {
            let taken = match handle.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some(h) = taken {
                log::info!("Releasing {} ({}) on {}", self.model_id, h, capability.name());
                capability.free_handle(h);
            }
        }
    }

    fn expect_task(&self, expected: TaskKind) -> Result<()> {
        if self.task != expected {
            return Err(ModelError::TaskMismatch {
                model: self.model_id.clone(),
                expected,
                actual: self.task,
            });
        }
        Ok(())
    }

    fn live_handle(&self) -> Result<HandleId> {
        self.handle()
            .ok_or_else(|| ModelError::Inference(format!("{} has been released", self.model_id)))
    }
}

impl Drop for ModelInstance {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInstance")
            .field("model_id", &self.model_id)
            .field("task", &self.task)
            .field("placeholder", &self.is_placeholder())
            .field("handle", &self.handle())
            .finish()
    }
}
