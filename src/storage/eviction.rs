//! Eviction Policy - picks downloaded models to delete when space is needed
//!
//! Oldest download goes first. Models in the device's recommended set are
//! only taken once every other candidate has been used up.

use chrono::{DateTime, Utc};

use crate::catalog::ModelId;

#[derive(Debug, Clone, PartialEq)]
pub struct EvictionCandidate {
    pub model_id: ModelId,
    pub size_bytes: u64,
    pub downloaded_at: DateTime<Utc>,
    /// In the recommended set
    pub protected: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvictionPolicy;

impl EvictionPolicy {
    /// Full eviction order for the given candidates
    pub fn order(&self, candidates: &[EvictionCandidate]) -> Vec<EvictionCandidate> {
        let mut ordered = candidates.to_vec();
        ordered.sort_by(|a, b| {
            a.protected
                .cmp(&b.protected)
                .then(a.downloaded_at.cmp(&b.downloaded_at))
                .then_with(|| a.model_id.cmp(&b.model_id))
        });
        ordered
    }

    /// Smallest prefix of the eviction order that frees at least
    /// `bytes_to_free`. Returns everything when the total is insufficient.
    pub fn select(&self, candidates: &[EvictionCandidate], bytes_to_free: u64) -> Vec<EvictionCandidate> {
        if bytes_to_free == 0 {
            return Vec::new();
        }

        let mut freed = 0u64;
        let mut victims = Vec::new();
        for candidate in self.order(candidates) {
            if freed >= bytes_to_free {
                break;
            }
            freed += candidate.size_bytes;
            victims.push(candidate);
        }
        victims
    }

    pub fn reclaimable(&self, candidates: &[EvictionCandidate]) -> u64 {
        candidates.iter().map(|c| c.size_bytes).sum()
    }
}
