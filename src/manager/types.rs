//! Model Manager Types

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{ModelDescriptor, ModelId};
use crate::download::DownloadState;

/// A verified model file on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedModel {
    pub model_id: ModelId,
    pub path: PathBuf,
    /// Verified byte size
    pub size_bytes: u64,
    pub downloaded_at: DateTime<Utc>,
}

/// Catalog entry merged with its local status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    #[serde(flatten)]
    pub descriptor: ModelDescriptor,
    pub is_downloaded: bool,
    pub is_loaded: bool,
    /// Loaded instance fell back to mock output
    pub is_placeholder: bool,
    pub is_recommended: bool,
    pub local_path: Option<PathBuf>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub download: Option<DownloadState>,
}

/// Outcome of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub evicted: Vec<ModelId>,
    pub freed_bytes: u64,
    pub usage_after: u64,
}
