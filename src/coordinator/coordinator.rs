//! AI Coordinator - active model per task and the switching state machine
//!
//! A switch downloads and loads the new model first, swaps the task slot,
//! and only then unloads the previous instance, so a task is never left
//! without an implementation. All switches share the manager's
//! single-flight guard.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::performance::{EventKind, PerformanceEvent, PerformanceHistory};
use super::state::{ActiveImplementation, CoordinatorSnapshot, CoordinatorState};
use crate::catalog::{ModelId, TaskKind};
use crate::config::AdaptationConfig;
use crate::device::PerformanceTier;
use crate::error::{ModelError, Result};
use crate::events::{ModelEvent, ModelObserver};
use crate::inference::{ModelInstance, TranscriptSegment};
use crate::manager::{FlightPermit, ModelManager};

pub struct AiCoordinator {
    manager: Arc<ModelManager>,
    state: RwLock<CoordinatorState>,
    history: StdMutex<PerformanceHistory>,
    adaptation: AdaptationConfig,
}

impl AiCoordinator {
    /// Start from the configured models with mock implementations;
    /// `initialize` discovers the real ones.
    pub fn new(manager: Arc<ModelManager>) -> Self {
        let config = manager.config();
        let state = CoordinatorState::new(
            ModelId::new(config.speech_model.clone()),
            ModelId::new(config.summarization_model.clone()),
            config.use_mock,
        );
        let adaptation = config.adaptation.clone();
        Self {
            history: StdMutex::new(PerformanceHistory::new(adaptation.history_len)),
            adaptation,
            state: RwLock::new(state),
            manager,
        }
    }

    /// Load the configured models that are already downloaded. Tasks
    /// without a usable model are served by the mock implementation.
    pub async fn initialize(&self) -> Result<()> {
        let permit = self.manager.single_flight().try_acquire("discover implementations")?;
        self.discover_locked(&permit, false).await;
        let snapshot = self.snapshot().await;
        log::info!(
            "AI coordinator ready: speech={} ({}), summarization={} ({})",
            snapshot.speech_model,
            if snapshot.speech_mock { "mock" } else { "real" },
            snapshot.summarization_model,
            if snapshot.summarization_mock { "mock" } else { "real" },
        );
        Ok(())
    }

    pub async fn switch_speech_model(&self, model_id: &str) -> Result<()> {
        self.switch_model(TaskKind::SpeechRecognition, model_id).await
    }

    pub async fn switch_summarization_model(&self, model_id: &str) -> Result<()> {
        self.switch_model(TaskKind::TextSummarization, model_id).await
    }

    /// Make `model_id` the active model for `task`. On failure the previous
    /// model stays active.
    pub async fn switch_model(&self, task: TaskKind, model_id: &str) -> Result<()> {
        if !task.is_switchable() {
            return Err(ModelError::UnsupportedTask(task));
        }
        let descriptor = self
            .manager
            .catalog()
            .get(model_id)
            .ok_or_else(|| ModelError::NotFound(model_id.to_string()))?;
        if descriptor.task != task {
            return Err(ModelError::TaskMismatch {
                model: descriptor.id.clone(),
                expected: task,
                actual: descriptor.task,
            });
        }
        let target = descriptor.id.clone();

        let permit = self
            .manager
            .single_flight()
            .try_acquire(format!("switch {} to {}", task, target))?;

        if let Some(previous) = self.switch_locked(&permit, task, &target).await? {
            log::info!("Switched {} from {} to {}", task, previous, target);
            self.record(
                PerformanceEvent::now(EventKind::Switch, task, target).with_previous(Some(previous)),
            );
        }
        Ok(())
    }

    /// Returns the previous model id, or `None` when `target` was already
    /// active. Load and unload events are recorded here; the caller records
    /// the switch itself.
    async fn switch_locked(
        &self,
        permit: &FlightPermit,
        task: TaskKind,
        target: &ModelId,
    ) -> Result<Option<ModelId>> {
        let (current, use_mock, serving) = {
            let state = self.state.read().await;
            let slot = state.slot(task)?;
            (slot.model_id.clone(), state.use_mock, slot.is_serving(target))
        };

        if use_mock {
            if &current == target {
                return Ok(None);
            }
            self.state.write().await.slot_mut(task)?.model_id = target.clone();
            self.emit_active_changed(task, target, Some(&current));
            return Ok(Some(current));
        }

        if serving {
            return Ok(None);
        }

        let instance = self.acquire_instance(permit, task, target, true).await?;
        let previous = self.install(task, target, ActiveImplementation::Real(instance)).await?;
        self.release_previous(permit, task, previous, Some(target)).await;
        Ok(Some(current))
    }

    /// Download when allowed and missing, then load
    async fn acquire_instance(
        &self,
        permit: &FlightPermit,
        task: TaskKind,
        model_id: &ModelId,
        download: bool,
    ) -> Result<Arc<ModelInstance>> {
        if !self.manager.is_downloaded(model_id.as_str()).await {
            if !download {
                return Err(ModelError::NotFound(format!("{} is not downloaded", model_id)));
            }
            self.manager
                .download_locked(permit, model_id.as_str(), CancellationToken::new())
                .await?;
        }

        let was_loaded = self.manager.instance(model_id.as_str()).await.is_some();
        let instance = self.manager.load_locked(permit, model_id.as_str()).await?;
        if !was_loaded {
            self.record(PerformanceEvent::now(EventKind::Load, task, model_id.clone()));
        }
        Ok(instance)
    }

    /// Swap the slot in one write. Returns what was serving before.
    async fn install(
        &self,
        task: TaskKind,
        model_id: &ModelId,
        implementation: ActiveImplementation,
    ) -> Result<(ModelId, ActiveImplementation)> {
        let (previous_id, previous_impl) = {
            let mut state = self.state.write().await;
            let slot = state.slot_mut(task)?;
            let previous_impl = std::mem::replace(&mut slot.implementation, implementation);
            let previous_id = std::mem::replace(&mut slot.model_id, model_id.clone());
            (previous_id, previous_impl)
        };
        if &previous_id != model_id {
            self.emit_active_changed(task, model_id, Some(&previous_id));
        }
        Ok((previous_id, previous_impl))
    }

    /// Unload the instance that was replaced, unless it is `keep`
    async fn release_previous(
        &self,
        permit: &FlightPermit,
        task: TaskKind,
        previous: (ModelId, ActiveImplementation),
        keep: Option<&ModelId>,
    ) {
        let ActiveImplementation::Real(instance) = previous.1 else {
            return;
        };
        let previous_id = instance.model_id().clone();
        if keep == Some(&previous_id) {
            return;
        }
        drop(instance);
        if self.manager.unload_locked(permit, previous_id.as_str()).await {
            self.record(PerformanceEvent::now(EventKind::Unload, task, previous_id));
        }
    }

    /// Rebuild every task's implementation from the configured model ids.
    /// Failures fall back to mock per task.
    async fn discover_locked(&self, permit: &FlightPermit, download: bool) {
        let use_mock = self.state.read().await.use_mock;

        for task in TaskKind::SWITCHABLE {
            let model_id = match self.state.read().await.slot(task) {
                Ok(slot) => slot.model_id.clone(),
                Err(_) => continue,
            };

            let implementation = if use_mock {
                ActiveImplementation::Mock
            } else {
                match self.acquire_instance(permit, task, &model_id, download).await {
                    Ok(instance) => ActiveImplementation::Real(instance),
                    Err(e) => {
                        log::warn!(
                            "No real implementation for {} ({}), using mock: {}",
                            task,
                            model_id,
                            e
                        );
                        ActiveImplementation::Mock
                    }
                }
            };

            let keep = implementation.instance().map(|i| i.model_id().clone());
            match self.install(task, &model_id, implementation).await {
                Ok(previous) => {
                    self.release_previous(permit, task, previous, keep.as_ref())
                        .await
                }
                Err(e) => log::error!("Failed to install implementation for {}: {}", task, e),
            }
        }
    }

    pub async fn switch_to_mock_implementations(&self) -> Result<()> {
        let permit = self.manager.single_flight().try_acquire("switch to mock implementations")?;
        self.state.write().await.use_mock = true;
        self.manager
            .observers()
            .emit(ModelEvent::ImplementationModeChanged { use_mock: true });
        self.discover_locked(&permit, false).await;
        log::info!("Using mock implementations");
        Ok(())
    }

    /// Leave mock mode, downloading configured models as needed
    pub async fn switch_to_real_implementations(&self) -> Result<()> {
        let permit = self.manager.single_flight().try_acquire("switch to real implementations")?;
        self.state.write().await.use_mock = false;
        self.manager
            .observers()
            .emit(ModelEvent::ImplementationModeChanged { use_mock: false });
        self.discover_locked(&permit, true).await;
        log::info!("Using real implementations where available");
        Ok(())
    }

    /// Switch every task to the device recommendation. A second call while
    /// enabled does nothing. Individual switch failures are only logged.
    pub async fn enable_adaptive_model_switching(&self) -> Result<()> {
        if self.state.read().await.adaptive_enabled {
            log::debug!("Adaptive model switching already enabled");
            return Ok(());
        }
        let permit = self.manager.single_flight().try_acquire("adaptive switching")?;
        {
            let mut state = self.state.write().await;
            if state.adaptive_enabled {
                log::debug!("Adaptive model switching already enabled");
                return Ok(());
            }
            state.adaptive_enabled = true;
        }

        let capability = self.manager.device().detect();
        let mut targets = Vec::new();
        for task in TaskKind::SWITCHABLE {
            match capability.recommended(task) {
                Some(id) if self.manager.catalog().contains(id.as_str()) => {
                    targets.push((task, id.clone()))
                }
                _ => log::debug!("No recommendation for {} on {:?} tier", task, capability.tier),
            }
        }

        self.adapt_locked(&permit, targets, &format!("device tier {:?}", capability.tier))
            .await;
        Ok(())
    }

    pub async fn disable_adaptive_model_switching(&self) {
        self.state.write().await.adaptive_enabled = false;
    }

    /// Fall back to the lightest models when switching has been frequent on
    /// a host below the high tier. Returns whether anything switched.
    pub async fn performance_based_adaptation(&self) -> Result<bool> {
        let permit = self.manager.single_flight().try_acquire("performance adaptation")?;

        let too_many = match self.history.lock() {
            Ok(history) => history.too_many_switches(&self.adaptation, Utc::now()),
            Err(_) => false,
        };
        if !too_many {
            return Ok(false);
        }
        let tier = self.manager.device().detect().tier;
        if tier == PerformanceTier::High {
            return Ok(false);
        }

        let targets: Vec<(TaskKind, ModelId)> = TaskKind::SWITCHABLE
            .into_iter()
            .filter_map(|task| {
                self.manager
                    .catalog()
                    .smallest(task)
                    .map(|m| (task, m.id.clone()))
            })
            .collect();

        let switched = self
            .adapt_locked(&permit, targets, "frequent switching")
            .await;
        Ok(switched > 0)
    }

    /// Switch each task to its target, then record one adaptive event.
    /// Returns the number of tasks switched.
    async fn adapt_locked(
        &self,
        permit: &FlightPermit,
        targets: Vec<(TaskKind, ModelId)>,
        reason: &str,
    ) -> usize {
        let mut changes = Vec::new();
        for (task, target) in targets {
            match self.switch_locked(permit, task, &target).await {
                Ok(Some(previous)) => changes.push((task, previous, target)),
                Ok(None) => {}
                Err(e) => log::warn!("Adaptive switch of {} to {} failed: {}", task, target, e),
            }
        }

        let Some((task, previous, target)) = changes.first().cloned() else {
            return 0;
        };
        let note = changes
            .iter()
            .map(|(task, previous, target)| format!("{}: {} -> {}", task, previous, target))
            .collect::<Vec<_>>()
            .join(", ");
        log::info!("Adaptive pass ({}): {}", reason, note);
        self.record(
            PerformanceEvent::now(EventKind::Adaptive, task, target)
                .with_previous(Some(previous))
                .with_note(format!("{}; {}", reason, note)),
        );
        changes.len()
    }

    /// Cancel the download behind a running switch
    pub fn cancel_current_operation(&self) -> bool {
        self.manager.cancel_download()
    }

    pub async fn speech_recognition(&self) -> ActiveImplementation {
        self.state.read().await.speech.implementation.clone()
    }

    pub async fn summarization(&self) -> ActiveImplementation {
        self.state.read().await.summarization.implementation.clone()
    }

    pub async fn recognize(&self, samples: &[f32]) -> Result<Vec<TranscriptSegment>> {
        let implementation = self.speech_recognition().await;
        implementation.recognize(samples).await
    }

    pub async fn summarize(&self, text: &str) -> Result<String> {
        let implementation = self.summarization().await;
        implementation.summarize(text).await
    }

    pub async fn current_model(&self, task: TaskKind) -> Result<ModelId> {
        Ok(self.state.read().await.slot(task)?.model_id.clone())
    }

    pub async fn current_speech_model(&self) -> ModelId {
        self.state.read().await.speech.model_id.clone()
    }

    pub async fn current_summarization_model(&self) -> ModelId {
        self.state.read().await.summarization.model_id.clone()
    }

    pub async fn use_mock(&self) -> bool {
        self.state.read().await.use_mock
    }

    pub fn is_switching(&self) -> bool {
        self.manager.single_flight().is_busy()
    }

    pub async fn is_adaptive_enabled(&self) -> bool {
        self.state.read().await.adaptive_enabled
    }

    pub fn performance_history(&self) -> Vec<PerformanceEvent> {
        self.history.lock().map(|h| h.events()).unwrap_or_default()
    }

    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        let is_switching = self.is_switching();
        self.state.read().await.snapshot(is_switching)
    }

    pub fn subscribe(&self, observer: Arc<dyn ModelObserver>) {
        self.manager.subscribe(observer);
    }

    pub fn manager(&self) -> &Arc<ModelManager> {
        &self.manager
    }

    /// Cancel work in flight, return every task to mock and release all
    /// instances
    pub async fn shutdown(&self) {
        self.cancel_current_operation();
        {
            let mut state = self.state.write().await;
            state.speech.implementation = ActiveImplementation::Mock;
            state.summarization.implementation = ActiveImplementation::Mock;
        }
        self.manager.shutdown().await;
        log::info!("AI coordinator shut down");
    }

    fn record(&self, event: PerformanceEvent) {
        match self.history.lock() {
            Ok(mut history) => history.record(event),
            Err(poisoned) => poisoned.into_inner().record(event),
        }
    }

    fn emit_active_changed(&self, task: TaskKind, model_id: &ModelId, previous: Option<&ModelId>) {
        self.manager.observers().emit(ModelEvent::ActiveModelChanged {
            task,
            model_id: model_id.clone(),
            previous: previous.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GIB, MIB};
    use crate::testing::{meeting_catalog, test_catalog, Harness, SourceBehavior};
    use tempfile::TempDir;

    fn kinds(events: &[PerformanceEvent]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    async fn coordinator(h: &Harness) -> AiCoordinator {
        let coordinator = AiCoordinator::new(h.manager.clone());
        coordinator.initialize().await.unwrap();
        coordinator
    }

    #[tokio::test]
    async fn test_initialize_uses_downloaded_models() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        h.manager.download_model("tiny").await.unwrap();

        let c = coordinator(&h).await;
        let snapshot = c.snapshot().await;
        assert!(!snapshot.speech_mock);
        // llm-small is not downloaded
        assert!(snapshot.summarization_mock);
        assert_eq!(snapshot.summarization_model, ModelId::from("llm-small"));
        assert!(h.manager.instance("tiny").await.is_some());
        assert_eq!(h.source.opened(), 1);
    }

    #[tokio::test]
    async fn test_switch_loads_new_then_unloads_old() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        h.manager.download_model("tiny").await.unwrap();
        let c = coordinator(&h).await;

        c.switch_speech_model("base").await.unwrap();

        assert_eq!(c.current_speech_model().await, ModelId::from("base"));
        let active = c.speech_recognition().await;
        assert_eq!(active.instance().unwrap().model_id(), &ModelId::from("base"));
        assert!(h.manager.instance("tiny").await.is_none());
        assert_eq!(h.backend.live_handles(), 1);

        let history = c.performance_history();
        assert_eq!(
            kinds(&history),
            vec![EventKind::Load, EventKind::Load, EventKind::Unload, EventKind::Switch]
        );
        let switch = history.last().unwrap();
        assert_eq!(switch.previous_model_id, Some(ModelId::from("tiny")));

        // switching to the active model is a no-op
        c.switch_speech_model("base").await.unwrap();
        assert_eq!(c.performance_history().len(), history.len());
    }

    #[tokio::test]
    async fn test_switch_never_leaves_speech_unserved() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        h.manager.download_model("tiny").await.unwrap();
        let c = Arc::new(coordinator(&h).await);

        // (event, model serving speech at that moment)
        let seen: Arc<StdMutex<Vec<(String, Option<ModelId>)>>> = Arc::default();
        let sink = seen.clone();
        let weak = Arc::downgrade(&c);
        h.manager.subscribe(Arc::new(move |event: &ModelEvent| {
            let label = match event {
                ModelEvent::InstanceLoaded { model_id, .. } => format!("loaded {}", model_id),
                ModelEvent::InstanceUnloaded { model_id } => format!("unloaded {}", model_id),
                _ => return,
            };
            let serving = weak.upgrade().and_then(|c| {
                let state = c.state.try_read().ok()?;
                let serving = state.speech.implementation.instance().map(|i| i.model_id().clone());
                serving
            });
            sink.lock().unwrap().push((label, serving));
        }));

        c.switch_speech_model("base").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("loaded base".to_string(), Some(ModelId::from("tiny"))),
                ("unloaded tiny".to_string(), Some(ModelId::from("base"))),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_previous_model() {
        let dir = TempDir::new().unwrap();
        let mut config = Harness::config(&dir, 10 * GIB);
        config.speech_model = "whisper-tiny".to_string();
        config.summarization_model = "qwen-2.5-0.5b-instruct".to_string();
        let h = Harness::with_config(dir, config, meeting_catalog(), 4).await;
        h.manager.download_model("whisper-tiny").await.unwrap();
        let c = coordinator(&h).await;
        h.source.set_behavior("whisper-base", SourceBehavior::Unreachable);

        let err = c.switch_speech_model("whisper-base").await.unwrap_err();

        assert!(matches!(err, ModelError::Network(_)));
        assert_eq!(c.current_speech_model().await, ModelId::from("whisper-tiny"));
        let active = c.speech_recognition().await;
        assert_eq!(
            active.instance().unwrap().model_id(),
            &ModelId::from("whisper-tiny")
        );
        assert!(!c.is_switching());
        assert!(h
            .manager
            .download_state("whisper-base")
            .unwrap()
            .error
            .is_some());
    }

    #[tokio::test]
    async fn test_switch_validation() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        let c = coordinator(&h).await;

        assert!(matches!(
            c.switch_speech_model("missing").await,
            Err(ModelError::NotFound(_))
        ));
        assert!(matches!(
            c.switch_speech_model("llm-large").await,
            Err(ModelError::TaskMismatch { .. })
        ));
        assert!(matches!(
            c.switch_model(TaskKind::LanguageDetection, "tiny").await,
            Err(ModelError::UnsupportedTask(TaskKind::LanguageDetection))
        ));
        assert!(c.performance_history().is_empty());
    }

    #[tokio::test]
    async fn test_switch_rejected_while_busy_leaves_state() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        let c = coordinator(&h).await;
        let before = c.snapshot().await;

        let permit = h.manager.single_flight().try_acquire("download tiny").unwrap();
        assert!(c.is_switching());
        assert!(matches!(
            c.switch_speech_model("base").await,
            Err(ModelError::Concurrency(_))
        ));
        assert!(matches!(
            c.enable_adaptive_model_switching().await,
            Err(ModelError::Concurrency(_))
        ));
        drop(permit);

        let after = c.snapshot().await;
        assert_eq!(before, after);
        assert!(!c.is_adaptive_enabled().await);
        assert_eq!(h.source.opened(), 0);
    }

    #[tokio::test]
    async fn test_mock_mode_switch_only_updates_id() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        h.manager.download_model("tiny").await.unwrap();
        let c = coordinator(&h).await;
        assert_eq!(h.backend.live_handles(), 1);

        c.switch_to_mock_implementations().await.unwrap();
        assert!(c.use_mock().await);
        assert!(c.speech_recognition().await.is_mock());
        assert_eq!(h.backend.live_handles(), 0);

        c.switch_speech_model("small").await.unwrap();
        assert_eq!(c.current_speech_model().await, ModelId::from("small"));
        assert!(!h.manager.is_downloaded("small").await);
        let segments = c.recognize(&vec![0.0; 16_000]).await.unwrap();
        assert_eq!(segments[0].end_ms, 1000);
    }

    #[tokio::test]
    async fn test_switch_to_real_downloads_configured_models() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        let c = coordinator(&h).await;
        assert!(c.speech_recognition().await.is_mock());

        c.switch_to_real_implementations().await.unwrap();

        assert!(!c.use_mock().await);
        assert!(h.manager.is_downloaded("tiny").await);
        assert!(h.manager.is_downloaded("llm-small").await);
        assert!(!c.speech_recognition().await.is_mock());
        let summary = c.summarize("quarterly planning went fine").await.unwrap();
        assert!(summary.contains("quarterly"));
    }

    #[tokio::test]
    async fn test_real_mode_falls_back_to_mock_per_task() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        h.source.set_behavior("llm-small", SourceBehavior::Unreachable);
        let c = coordinator(&h).await;

        c.switch_to_real_implementations().await.unwrap();

        assert!(!c.speech_recognition().await.is_mock());
        assert!(c.summarization().await.is_mock());
        assert!(c.summarize("still works").await.is_ok());
    }

    #[tokio::test]
    async fn test_enable_adaptive_twice_switches_once() {
        let dir = TempDir::new().unwrap();
        let config = Harness::config(&dir, 64 * MIB);
        // medium tier: mid-sized models recommended
        let h = Harness::with_config(dir, config, test_catalog(), 8).await;
        let c = coordinator(&h).await;

        c.enable_adaptive_model_switching().await.unwrap();
        assert!(c.is_adaptive_enabled().await);
        assert_eq!(c.current_speech_model().await, ModelId::from("base"));
        assert_eq!(c.current_summarization_model().await, ModelId::from("llm-large"));

        let history = c.performance_history();
        let adaptive: Vec<&PerformanceEvent> = history
            .iter()
            .filter(|e| e.kind == EventKind::Adaptive)
            .collect();
        assert_eq!(adaptive.len(), 1);
        let note = adaptive[0].note.as_deref().unwrap();
        assert!(note.contains("tiny -> base"));
        assert!(note.contains("llm-small -> llm-large"));
        assert!(!history.iter().any(|e| e.kind == EventKind::Switch));

        c.enable_adaptive_model_switching().await.unwrap();
        assert_eq!(c.performance_history(), history);
        assert_eq!(h.source.opened(), 2);

        // already enabled: succeeds even while another mutation holds the guard
        let permit = h.manager.single_flight().try_acquire("download small").unwrap();
        c.enable_adaptive_model_switching().await.unwrap();
        drop(permit);
        assert_eq!(c.performance_history(), history);
    }

    #[tokio::test]
    async fn test_performance_adaptation_downgrades() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        let c = coordinator(&h).await;
        c.switch_to_mock_implementations().await.unwrap();

        for id in ["base", "small", "base", "small"] {
            c.switch_speech_model(id).await.unwrap();
        }
        // four events: below the minimum
        assert!(!c.performance_based_adaptation().await.unwrap());

        c.switch_speech_model("base").await.unwrap();
        assert!(c.performance_based_adaptation().await.unwrap());
        assert_eq!(c.current_speech_model().await, ModelId::from("tiny"));
        // summarization already on the lightest model
        assert_eq!(c.current_summarization_model().await, ModelId::from("llm-small"));

        let last = c.performance_history().last().cloned().unwrap();
        assert_eq!(last.kind, EventKind::Adaptive);
        assert_eq!(last.previous_model_id, Some(ModelId::from("base")));
    }

    #[tokio::test]
    async fn test_performance_adaptation_skipped_on_high_tier() {
        let dir = TempDir::new().unwrap();
        let mut config = Harness::config(&dir, 64 * MIB);
        config.use_mock = true;
        let h = Harness::with_config(dir, config, test_catalog(), 32).await;
        let c = coordinator(&h).await;

        for id in ["base", "small", "base", "small", "base"] {
            c.switch_speech_model(id).await.unwrap();
        }
        assert!(!c.performance_based_adaptation().await.unwrap());
        assert_eq!(c.current_speech_model().await, ModelId::from("base"));
    }

    #[tokio::test]
    async fn test_active_model_events_published() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        let c = coordinator(&h).await;
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        c.subscribe(Arc::new(move |event: &ModelEvent| {
            if let ModelEvent::ActiveModelChanged { model_id, .. } = event {
                sink.lock().unwrap().push(model_id.clone());
            }
        }));

        c.switch_summarization_model("llm-large").await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![ModelId::from("llm-large")]);
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let h = Harness::new(test_catalog(), 64 * MIB).await;
        h.manager.download_model("tiny").await.unwrap();
        h.manager.download_model("llm-small").await.unwrap();
        let c = coordinator(&h).await;
        assert_eq!(h.backend.live_handles(), 2);

        c.shutdown().await;
        assert_eq!(h.backend.live_handles(), 0);
        assert!(c.speech_recognition().await.is_mock());
    }
}
