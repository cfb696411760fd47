//! Storage Tracker - on-disk usage against the global budget

use tokio::fs;

use crate::catalog::ModelId;
use crate::manager::LoadedModel;

/// Result of a usage scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageUsage {
    /// Bytes occupied by model files that still exist
    pub total_bytes: u64,
    /// Records whose file has disappeared (counted as zero)
    pub stale: Vec<ModelId>,
}

#[derive(Debug, Clone, Copy)]
pub struct StorageTracker {
    budget_bytes: u64,
}

impl StorageTracker {
    pub fn new(budget_bytes: u64) -> Self {
        Self { budget_bytes }
    }

    pub fn budget(&self) -> u64 {
        self.budget_bytes
    }

    /// Sum sizes of all records whose files still exist
    pub async fn usage<'a, I>(&self, records: I) -> StorageUsage
    where
        I: IntoIterator<Item = &'a LoadedModel>,
    {
        let mut usage = StorageUsage::default();
        for record in records {
            match fs::metadata(&record.path).await {
                Ok(metadata) if metadata.is_file() => usage.total_bytes += metadata.len(),
                _ => {
                    log::warn!(
                        "Model file for {} is missing: {}",
                        record.model_id,
                        record.path.display()
                    );
                    usage.stale.push(record.model_id.clone());
                }
            }
        }
        usage
    }

    /// Whether `additional` bytes fit on top of `usage`
    pub fn fits(&self, usage: u64, additional: u64) -> bool {
        usage.saturating_add(additional) <= self.budget_bytes
    }

    /// Bytes that must be freed before `additional` bytes fit
    pub fn bytes_to_free(&self, usage: u64, additional: u64) -> u64 {
        usage
            .saturating_add(additional)
            .saturating_sub(self.budget_bytes)
    }

    pub fn available(&self, usage: u64) -> u64 {
        self.budget_bytes.saturating_sub(usage)
    }
}
