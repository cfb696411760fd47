//! Lifecycle configuration
//!
//! Reference deployment values live in the constants below. A JSON file can
//! override any subset of fields; missing fields keep their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{GIB, MIB};
use crate::error::{ModelError, Result};

/// Global storage budget for downloaded models
pub const DEFAULT_STORAGE_BUDGET_BYTES: u64 = 10 * GIB;

/// Allowed difference between expected and actual file size
pub const DEFAULT_INTEGRITY_TOLERANCE_BYTES: u64 = MIB;

/// `cleanup_models` target as a fraction of the budget
pub const DEFAULT_CLEANUP_TARGET_RATIO: f64 = 0.7;

/// Default speech model when no preference is configured
pub const DEFAULT_SPEECH_MODEL: &str = "whisper-tiny";

/// Default summarization model when no preference is configured
pub const DEFAULT_SUMMARIZATION_MODEL: &str = "qwen-2.5-0.5b-instruct";

/// Overrides host detection with fixed values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOverride {
    pub ram_gb: f64,
    pub cpu_cores: usize,
    #[serde(default)]
    pub gpu_acceleration: bool,
}

/// Thresholds for the performance-based downgrade heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Events retained in the performance history
    pub history_len: usize,
    /// Minimum events before the heuristic activates
    pub min_events: usize,
    /// Sliding window for counting switches
    pub window_minutes: i64,
    /// Switch count above which the downgrade triggers
    pub max_switches_in_window: usize,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            history_len: 100,
            min_events: 5,
            window_minutes: 30,
            max_switches_in_window: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub models_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub storage_budget_bytes: u64,
    pub integrity_tolerance_bytes: u64,
    pub cleanup_target_ratio: f64,
    /// Verify SHA-256 after downloads when the descriptor publishes one
    pub verify_checksums: bool,
    /// Also hash files found during the startup scan (slow for large models)
    pub verify_checksums_on_scan: bool,
    pub http_timeout_secs: u64,
    pub use_mock: bool,
    pub speech_model: String,
    pub summarization_model: String,
    pub adaptation: AdaptationConfig,
    pub device_override: Option<DeviceOverride>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meeting-local");

        Self::with_base_dir(base_dir)
    }
}

impl LifecycleConfig {
    /// Default configuration rooted at `base_dir` (models/ and cache/ inside)
    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        Self {
            models_dir: base_dir.join("models"),
            cache_dir: base_dir.join("cache"),
            storage_budget_bytes: DEFAULT_STORAGE_BUDGET_BYTES,
            integrity_tolerance_bytes: DEFAULT_INTEGRITY_TOLERANCE_BYTES,
            cleanup_target_ratio: DEFAULT_CLEANUP_TARGET_RATIO,
            verify_checksums: true,
            verify_checksums_on_scan: false,
            http_timeout_secs: 3600,
            use_mock: false,
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            summarization_model: DEFAULT_SUMMARIZATION_MODEL.to_string(),
            adaptation: AdaptationConfig::default(),
            device_override: None,
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ModelError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            ModelError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        log::info!("Loaded lifecycle config from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_budget_bytes == 0 {
            return Err(ModelError::Config("storage budget must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.cleanup_target_ratio) {
            return Err(ModelError::Config(format!(
                "cleanup_target_ratio must be within [0, 1], got {}",
                self.cleanup_target_ratio
            )));
        }
        if self.adaptation.history_len == 0 {
            return Err(ModelError::Config("history_len must be positive".into()));
        }
        Ok(())
    }

    /// Default `cleanup_models` target in bytes
    pub fn cleanup_target_bytes(&self) -> u64 {
        (self.storage_budget_bytes as f64 * self.cleanup_target_ratio) as u64
    }
}
