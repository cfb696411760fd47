//! Storage accounting, integrity checks and eviction
//!
//! Module structure:
//! - tracker.rs: usage scan against the budget
//! - integrity.rs: size tolerance and SHA-256 verification
//! - eviction.rs: oldest-first victim selection with a protected set

pub mod eviction;
pub mod integrity;
pub mod tracker;

pub use eviction::{EvictionCandidate, EvictionPolicy};
pub use integrity::{sha256_file, IntegrityVerifier, Verdict};
pub use tracker::{StorageTracker, StorageUsage};
