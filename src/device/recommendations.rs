//! Model recommendations per performance tier
//!
//! Derived from the catalog at call time so new entries are picked up
//! without code changes.

use super::detector::PerformanceTier;
use crate::catalog::{Catalog, ModelDescriptor, TaskKind};

/// RAM needed before a high-tier host gets the largest model of a task
pub const LARGEST_MODEL_MIN_RAM_GB: f64 = 16.0;

/// Recommended model for `task`, or `None` when the catalog has no entry for it
pub fn recommend<'a>(
    catalog: &'a Catalog,
    task: TaskKind,
    tier: PerformanceTier,
    ram_gb: f64,
) -> Option<&'a ModelDescriptor> {
    match tier {
        PerformanceTier::High if ram_gb >= LARGEST_MODEL_MIN_RAM_GB => catalog.largest(task),
        PerformanceTier::High | PerformanceTier::Medium => catalog.mid(task),
        PerformanceTier::Low => catalog.smallest(task),
    }
}
