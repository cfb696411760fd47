//! Performance history for adaptive decisions

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::catalog::{ModelId, TaskKind};
use crate::config::AdaptationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Switch,
    Load,
    Unload,
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceEvent {
    pub timestamp: DateTime<Utc>,
    pub model_id: ModelId,
    pub task: TaskKind,
    pub kind: EventKind,
    pub previous_model_id: Option<ModelId>,
    /// Summary for adaptive passes
    pub note: Option<String>,
}

impl PerformanceEvent {
    pub fn now(kind: EventKind, task: TaskKind, model_id: ModelId) -> Self {
        Self {
            timestamp: Utc::now(),
            model_id,
            task,
            kind,
            previous_model_id: None,
            note: None,
        }
    }

    pub fn with_previous(mut self, previous: Option<ModelId>) -> Self {
        self.previous_model_id = previous;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Most recent events, oldest dropped first
#[derive(Debug, Clone)]
pub struct PerformanceHistory {
    events: VecDeque<PerformanceEvent>,
    capacity: usize,
}

impl PerformanceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, event: PerformanceEvent) {
        log::debug!(
            "Performance event: {:?} {} {}",
            event.kind,
            event.task,
            event.model_id
        );
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> Vec<PerformanceEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn switches_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind == EventKind::Switch && e.timestamp >= cutoff)
            .count()
    }

    /// Whether recent switching is frequent enough to fall back to lighter models
    pub fn too_many_switches(&self, config: &AdaptationConfig, now: DateTime<Utc>) -> bool {
        if self.events.len() < config.min_events {
            return false;
        }
        let cutoff = now - Duration::minutes(config.window_minutes);
        self.switches_since(cutoff) > config.max_switches_in_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch_at(minutes_ago: i64) -> PerformanceEvent {
        let mut event = PerformanceEvent::now(
            EventKind::Switch,
            TaskKind::SpeechRecognition,
            ModelId::from("tiny"),
        );
        event.timestamp = Utc::now() - Duration::minutes(minutes_ago);
        event
    }

    #[test]
    fn test_bounded_history() {
        let mut history = PerformanceHistory::new(3);
        for i in 0..5 {
            let mut event = switch_at(0);
            event.model_id = ModelId::new(format!("m{}", i));
            history.record(event);
        }
        assert_eq!(history.len(), 3);
        // oldest two dropped
        let ids: Vec<String> = history.events().iter().map(|e| e.model_id.to_string()).collect();
        assert_eq!(ids, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_needs_minimum_events() {
        let config = AdaptationConfig::default();
        let mut history = PerformanceHistory::new(100);
        for _ in 0..4 {
            history.record(switch_at(1));
        }
        assert!(!history.too_many_switches(&config, Utc::now()));

        history.record(switch_at(1));
        assert!(history.too_many_switches(&config, Utc::now()));
    }

    #[test]
    fn test_old_switches_ignored() {
        let config = AdaptationConfig::default();
        let mut history = PerformanceHistory::new(100);
        for _ in 0..3 {
            history.record(switch_at(5));
        }
        for _ in 0..5 {
            history.record(switch_at(45));
        }
        assert_eq!(history.switches_since(Utc::now() - Duration::minutes(30)), 3);
        assert!(!history.too_many_switches(&config, Utc::now()));
    }

    #[test]
    fn test_only_switch_events_counted() {
        let config = AdaptationConfig::default();
        let mut history = PerformanceHistory::new(100);
        for _ in 0..6 {
            history.record(PerformanceEvent::now(
                EventKind::Load,
                TaskKind::TextSummarization,
                ModelId::from("llm"),
            ));
        }
        assert!(!history.too_many_switches(&config, Utc::now()));
    }
}
