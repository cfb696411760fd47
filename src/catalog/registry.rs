//! Model Registry - catalog of downloadable artifacts

use std::collections::HashMap;

use super::types::{ModelDescriptor, ModelFormat, ModelId, ResourceRequirements, TaskKind};

const WHISPER_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

fn whisper(
    id: &str,
    name: &str,
    file: &str,
    size_bytes: u64,
    min_ram_mb: u32,
    sha256: Option<&str>,
) -> ModelDescriptor {
    ModelDescriptor {
        id: ModelId::from(id),
        display_name: name.to_string(),
        task: TaskKind::SpeechRecognition,
        size_bytes,
        url: format!("{}/{}", WHISPER_BASE_URL, file),
        filename: file.to_string(),
        languages: Vec::new(),
        quantized: false,
        format: ModelFormat::Ggml,
        requirements: ResourceRequirements {
            min_ram_mb,
            cpu_optimized: true,
            gpu_optimized: false,
        },
        sha256: sha256.map(str::to_string),
    }
}

fn gguf(
    id: &str,
    name: &str,
    repo: &str,
    file: &str,
    size_bytes: u64,
    min_ram_mb: u32,
) -> ModelDescriptor {
    ModelDescriptor {
        id: ModelId::from(id),
        display_name: name.to_string(),
        task: TaskKind::TextSummarization,
        size_bytes,
        url: format!("https://huggingface.co/{}/resolve/main/{}", repo, file),
        filename: file.to_string(),
        languages: vec!["en".to_string()],
        quantized: true,
        format: ModelFormat::Gguf,
        requirements: ResourceRequirements {
            min_ram_mb,
            cpu_optimized: true,
            gpu_optimized: true,
        },
        sha256: None,
    }
}

/// Curated list of models shipped with the application.
///
/// Sizes are the exact byte counts of the hosted files; the integrity check
/// compares against them with a small tolerance.
pub fn builtin_models() -> Vec<ModelDescriptor> {
    vec![
        // Speech recognition (smallest first)
        whisper("whisper-tiny", "Whisper Tiny", "ggml-tiny.bin", 77_691_713, 512, None), // ~74 MB
        whisper("whisper-base", "Whisper Base", "ggml-base.bin", 147_951_465, 1024, None), // ~141 MB
        whisper(
            "whisper-small",
            "Whisper Small",
            "ggml-small.bin",
            487_601_967, // ~465 MB
            2048,
            Some("1be3a9b2063867b937e64e2ec7483364a79917e157fa98c5d94b5c1fffea987b"),
        ),
        // Summarization
        gguf(
            "qwen-2.5-0.5b-instruct",
            "Qwen 2.5 0.5B Instruct",
            "Qwen/Qwen2.5-0.5B-Instruct-GGUF",
            "qwen2.5-0.5b-instruct-q4_k_m.gguf",
            491_400_032, // ~469 MB
            1024,
        ),
        gguf(
            "llama-3.2-1b-instruct",
            "Llama 3.2 1B Instruct",
            "bartowski/Llama-3.2-1B-Instruct-GGUF",
            "Llama-3.2-1B-Instruct-Q4_K_M.gguf",
            807_694_464, // ~770 MB
            2048,
        ),
        gguf(
            "llama-3.2-3b-instruct",
            "Llama 3.2 3B Instruct",
            "bartowski/Llama-3.2-3B-Instruct-GGUF",
            "Llama-3.2-3B-Instruct-Q4_K_M.gguf",
            2_019_377_696, // ~1.9 GB
            4096,
        ),
    ]
}

/// Immutable registry of model descriptors keyed by id
#[derive(Debug, Clone)]
pub struct Catalog {
    models: Vec<ModelDescriptor>,
    index: HashMap<ModelId, usize>,
}

impl Catalog {
    /// Build a catalog from descriptors. Later duplicates of an id are ignored.
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        let mut index = HashMap::new();
        let mut unique = Vec::with_capacity(models.len());
        for model in models {
            if index.contains_key(&model.id) {
                log::warn!("Duplicate catalog entry ignored: {}", model.id);
                continue;
            }
            index.insert(model.id.clone(), unique.len());
            unique.push(model);
        }
        Self {
            models: unique,
            index,
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_models())
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.index.get(id).map(|&i| &self.models[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn all(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Find the descriptor whose destination filename matches
    pub fn by_filename(&self, filename: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.filename == filename)
    }

    /// Models for a task ordered by expected size, smallest first
    pub fn for_task(&self, task: TaskKind) -> Vec<&ModelDescriptor> {
        let mut models: Vec<&ModelDescriptor> =
            self.models.iter().filter(|m| m.task == task).collect();
        models.sort_by_key(|m| m.size_bytes);
        models
    }

    pub fn smallest(&self, task: TaskKind) -> Option<&ModelDescriptor> {
        self.for_task(task).into_iter().next()
    }

    pub fn largest(&self, task: TaskKind) -> Option<&ModelDescriptor> {
        self.for_task(task).into_iter().last()
    }

    /// Middle entry of the size-ordered list
    pub fn mid(&self, task: TaskKind) -> Option<&ModelDescriptor> {
        let models = self.for_task(task);
        models.get(models.len() / 2).copied()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
