//! Catalog Types

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Typed model identifier (e.g. "whisper-tiny")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ModelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a model artifact is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    SpeechRecognition,
    TextSummarization,
    SpeakerIdentification,
    LanguageDetection,
}

impl TaskKind {
    /// Tasks the coordinator keeps an active implementation for
    pub const SWITCHABLE: [TaskKind; 2] = [TaskKind::SpeechRecognition, TaskKind::TextSummarization];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::SpeechRecognition => "speech-recognition",
            TaskKind::TextSummarization => "text-summarization",
            TaskKind::SpeakerIdentification => "speaker-identification",
            TaskKind::LanguageDetection => "language-detection",
        }
    }

    pub fn is_switchable(&self) -> bool {
        Self::SWITCHABLE.contains(self)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk weight format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Ggml,
    Gguf,
    Onnx,
}

/// Minimum host resources for running a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub min_ram_mb: u32,
    pub cpu_optimized: bool,
    pub gpu_optimized: bool,
}

/// Information about a downloadable model artifact.
/// Created once with the catalog and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique identifier, no spaces
    pub id: ModelId,
    /// Human-readable name
    pub display_name: String,
    pub task: TaskKind,
    /// Expected size on disk in bytes
    pub size_bytes: u64,
    /// Download URL
    pub url: String,
    /// Filename inside the models directory
    pub filename: String,
    /// ISO 639-1 codes, empty means multilingual
    pub languages: Vec<String>,
    pub quantized: bool,
    pub format: ModelFormat,
    pub requirements: ResourceRequirements,
    /// Expected SHA-256 hash (hex), when published
    pub sha256: Option<String>,
}

impl ModelDescriptor {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / MIB as f64
    }

    /// Temporary filename used while streaming
    pub fn partial_filename(&self) -> String {
        format!("{}.partial", self.filename)
    }
}
