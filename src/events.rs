//! Lifecycle events and the observer boundary
//!
//! The manager and coordinator publish plain `ModelEvent` values; whoever
//! renders state (UI, CLI, telemetry) subscribes with a `ModelObserver`.

use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::catalog::{ModelId, TaskKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ModelEvent {
    DownloadStarted {
        model_id: ModelId,
        total_bytes: u64,
    },
    DownloadProgress {
        model_id: ModelId,
        downloaded_bytes: u64,
        total_bytes: u64,
        progress: f64,
    },
    DownloadVerifying {
        model_id: ModelId,
    },
    DownloadCompleted {
        model_id: ModelId,
    },
    DownloadFailed {
        model_id: ModelId,
        error: String,
    },
    ModelEvicted {
        model_id: ModelId,
        freed_bytes: u64,
    },
    ModelRemoved {
        model_id: ModelId,
    },
    InstanceLoaded {
        model_id: ModelId,
        placeholder: bool,
    },
    InstanceUnloaded {
        model_id: ModelId,
    },
    ActiveModelChanged {
        task: TaskKind,
        model_id: ModelId,
        previous: Option<ModelId>,
    },
    ImplementationModeChanged {
        use_mock: bool,
    },
}

/// Receives lifecycle events. Called synchronously; keep handlers short.
pub trait ModelObserver: Send + Sync {
    fn on_event(&self, event: &ModelEvent);
}

impl<F> ModelObserver for F
where
    F: Fn(&ModelEvent) + Send + Sync,
{
    fn on_event(&self, event: &ModelEvent) {
        self(event)
    }
}

/// Registered observers, shared by the manager and the coordinator
#[derive(Default)]
pub struct Observers {
    inner: RwLock<Vec<Arc<dyn ModelObserver>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn ModelObserver>) {
        if let Ok(mut guard) = self.inner.write() {
            guard.push(observer);
        }
    }

    pub fn emit(&self, event: ModelEvent) {
        let observers = match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for observer in observers {
            observer.on_event(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_observer_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observers = Observers::new();
        observers.subscribe(Arc::new(move |event: &ModelEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        observers.emit(ModelEvent::ImplementationModeChanged { use_mock: true });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ModelEvent::ImplementationModeChanged { use_mock: true });
    }

    #[test]
    fn test_event_serialization_tag() {
        let json = serde_json::to_value(ModelEvent::DownloadCompleted {
            model_id: ModelId::from("whisper-tiny"),
        })
        .unwrap();
        assert_eq!(json["event"], "downloadCompleted");
        assert_eq!(json["model_id"], "whisper-tiny");
    }
}
