//! Model Manager
//!
//! Owns downloaded model records, loaded instances and the storage budget.
//!
//! Module structure:
//! - types.rs: LoadedModel, ModelInfo, CleanupReport
//! - single_flight.rs: global guard for mutating operations
//! - manager.rs: ModelManager

pub mod manager;
pub mod single_flight;
pub mod types;

pub use manager::ModelManager;
pub use single_flight::{FlightPermit, SingleFlight};
pub use types::{CleanupReport, LoadedModel, ModelInfo};
