//! AI Coordinator
//!
//! Keeps one active implementation per task and switches between models
//! without leaving a task unserved.
//!
//! Module structure:
//! - state.rs: task slots and the active implementation enum
//! - performance.rs: bounded switch/load history for adaptation
//! - coordinator.rs: AiCoordinator

pub mod coordinator;
pub mod performance;
pub mod state;

pub use coordinator::AiCoordinator;
pub use performance::{EventKind, PerformanceEvent, PerformanceHistory};
pub use state::{ActiveImplementation, CoordinatorSnapshot, CoordinatorState, TaskSlot};
