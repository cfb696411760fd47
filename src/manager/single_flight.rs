//! Global single-flight guard for mutating operations
//!
//! Downloads, loads, unloads and coordinator switches all take the same
//! guard. A second caller fails fast instead of queueing.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ModelError, Result};

#[derive(Clone, Default)]
pub struct SingleFlight {
    lock: Arc<Mutex<()>>,
    current: Arc<StdMutex<Option<String>>>,
}

/// Proof that the guard is held. Released on drop.
pub struct FlightPermit {
    _guard: OwnedMutexGuard<()>,
    operation: String,
    current: Arc<StdMutex<Option<String>>>,
}

impl FlightPermit {
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        log::debug!("Finished {}", self.operation);
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard for `operation`, or fail with `Concurrency`
    pub fn try_acquire(&self, operation: impl Into<String>) -> Result<FlightPermit> {
        let operation = operation.into();
        match self.lock.clone().try_lock_owned() {
            Ok(guard) => {
                if let Ok(mut current) = self.current.lock() {
                    *current = Some(operation.clone());
                }
                log::debug!("Started {}", operation);
                Ok(FlightPermit {
                    _guard: guard,
                    operation,
                    current: self.current.clone(),
                })
            }
            Err(_) => {
                let running = self
                    .current_operation()
                    .unwrap_or_else(|| "another operation".to_string());
                log::warn!("Rejected {}: {} is running", operation, running);
                Err(ModelError::Concurrency(format!(
                    "cannot start {} while {} is running",
                    operation, running
                )))
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    pub fn current_operation(&self) -> Option<String> {
        self.current.lock().ok().and_then(|c| c.clone())
    }
}
