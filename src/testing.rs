//! Test doubles shared by the unit tests

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use tempfile::TempDir;

use crate::catalog::{
    Catalog, ModelDescriptor, ModelFormat, ModelId, ResourceRequirements, TaskKind, GIB, MIB,
};
use crate::config::LifecycleConfig;
use crate::device::{DeviceDetector, GpuType, HostSnapshot, StaticProbe};
use crate::download::{ArtifactSource, RemoteArtifact};
use crate::error::{ModelError, Result};
use crate::inference::{HandleId, InferenceCapability, MockInference, TranscriptSegment};
use crate::manager::ModelManager;

/// Descriptor with filename `<id>.bin`
pub fn descriptor(id: &str, task: TaskKind, size_bytes: u64) -> ModelDescriptor {
    ModelDescriptor {
        id: ModelId::from(id),
        display_name: id.to_string(),
        task,
        size_bytes,
        url: format!("https://models.test/{}.bin", id),
        filename: format!("{}.bin", id),
        languages: Vec::new(),
        quantized: false,
        format: ModelFormat::Ggml,
        requirements: ResourceRequirements {
            min_ram_mb: 512,
            cpu_optimized: true,
            gpu_optimized: false,
        },
        sha256: None,
    }
}

/// Small catalog: speech tiny/base/small, summarization llm-small/llm-large
pub fn test_catalog() -> Catalog {
    Catalog::new(vec![
        descriptor("tiny", TaskKind::SpeechRecognition, 4 * MIB),
        descriptor("base", TaskKind::SpeechRecognition, 8 * MIB),
        descriptor("small", TaskKind::SpeechRecognition, 16 * MIB),
        descriptor("llm-small", TaskKind::TextSummarization, 6 * MIB),
        descriptor("llm-large", TaskKind::TextSummarization, 12 * MIB),
    ])
}

/// Reference-size meeting models: whisper-tiny at 39 MiB, whisper-base at
/// 74 MiB, qwen at 380 MiB, with the real filenames
pub fn meeting_catalog() -> Catalog {
    let named = |id: &str, task: TaskKind, size_mb: u64, filename: &str| {
        let mut d = descriptor(id, task, size_mb * MIB);
        d.filename = filename.to_string();
        d
    };
    Catalog::new(vec![
        named("whisper-tiny", TaskKind::SpeechRecognition, 39, "ggml-tiny.bin"),
        named("whisper-base", TaskKind::SpeechRecognition, 74, "ggml-base.bin"),
        named(
            "qwen-2.5-0.5b-instruct",
            TaskKind::TextSummarization,
            380,
            "qwen2.5-0.5b-instruct-q4_k_m.gguf",
        ),
    ])
}

pub fn fixed_detector(catalog: Arc<Catalog>, ram_gb: u64, cpu_cores: usize) -> Arc<DeviceDetector> {
    Arc::new(DeviceDetector::new(
        Box::new(StaticProbe(HostSnapshot {
            total_memory_bytes: ram_gb * GIB,
            cpu_cores,
            gpu_type: GpuType::None,
        })),
        catalog,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceBehavior {
    /// Exactly the catalog size
    Exact,
    /// Catalog size plus extra bytes
    Oversize(u64),
    /// Fewer bytes than the catalog size, then a clean end
    Truncated(u64),
    /// Given bytes, then a network error
    FailAfter(u64),
    /// Given bytes, then nothing ever again
    Stall(u64),
    /// Connection refused
    Unreachable,
}

/// In-memory artifact source producing zero-filled 1 MiB chunks
pub struct MemorySource {
    behaviors: DashMap<String, SourceBehavior>,
    opened: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            behaviors: DashMap::new(),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, model_id: &str, behavior: SourceBehavior) {
        self.behaviors.insert(model_id.to_string(), behavior);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

fn zero_chunks(total: u64) -> Vec<Result<Bytes>> {
    let block = Bytes::from(vec![0u8; MIB as usize]);
    let mut chunks = Vec::new();
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(MIB);
        chunks.push(Ok(block.slice(..n as usize)));
        remaining -= n;
    }
    chunks
}

#[async_trait]
impl ArtifactSource for MemorySource {
    async fn open(&self, descriptor: &ModelDescriptor) -> Result<RemoteArtifact> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .get(descriptor.id.as_str())
            .map(|b| *b)
            .unwrap_or(SourceBehavior::Exact);
        let size = descriptor.size_bytes;

        let stream = match behavior {
            SourceBehavior::Exact => stream::iter(zero_chunks(size)).boxed(),
            SourceBehavior::Oversize(extra) => stream::iter(zero_chunks(size + extra)).boxed(),
            SourceBehavior::Truncated(bytes) => stream::iter(zero_chunks(bytes)).boxed(),
            SourceBehavior::FailAfter(bytes) => {
                let mut chunks = zero_chunks(bytes);
                chunks.push(Err(ModelError::Network("connection reset".into())));
                stream::iter(chunks).boxed()
            }
            SourceBehavior::Stall(bytes) => stream::iter(zero_chunks(bytes))
                .chain(stream::pending())
                .boxed(),
            SourceBehavior::Unreachable => {
                return Err(ModelError::Network(format!(
                    "Failed to start download: {} unreachable",
                    descriptor.url
                )))
            }
        };

        Ok(RemoteArtifact {
            content_length: Some(size),
            stream,
        })
    }
}

/// Mock backend whose loads can be made to fail
#[derive(Default)]
pub struct FlakyInference {
    inner: MockInference,
    fail_loads: AtomicBool,
    loads: AtomicUsize,
}

impl FlakyInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.inner.live_handles()
    }
}

#[async_trait]
impl InferenceCapability for FlakyInference {
    fn name(&self) -> &str {
        "flaky-mock"
    }

    async fn load_handle(&self, task: TaskKind, path: &Path) -> anyhow::Result<HandleId> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            anyhow::bail!("unsupported model architecture");
        }
        self.inner.load_handle(task, path).await
    }

    fn free_handle(&self, handle: HandleId) {
        self.inner.free_handle(handle)
    }

    async fn recognize(
        &self,
        handle: HandleId,
        samples: &[f32],
    ) -> anyhow::Result<Vec<TranscriptSegment>> {
        self.inner.recognize(handle, samples).await
    }

    async fn summarize(&self, handle: HandleId, text: &str) -> anyhow::Result<String> {
        self.inner.summarize(handle, text).await
    }
}

/// Manager over a temp directory with in-memory downloads
pub struct Harness {
    pub dir: TempDir,
    pub manager: Arc<ModelManager>,
    pub source: Arc<MemorySource>,
    pub backend: Arc<FlakyInference>,
}

impl Harness {
    pub fn config(dir: &TempDir, budget_bytes: u64) -> LifecycleConfig {
        let mut config = LifecycleConfig::with_base_dir(dir.path());
        config.storage_budget_bytes = budget_bytes;
        config.speech_model = "tiny".to_string();
        config.summarization_model = "llm-small".to_string();
        config
    }

    /// Low-tier host: recommended models are the smallest per task
    pub async fn new(catalog: Catalog, budget_bytes: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let config = Self::config(&dir, budget_bytes);
        Self::with_config(dir, config, catalog, 4).await
    }

    pub async fn with_config(dir: TempDir, config: LifecycleConfig, catalog: Catalog, ram_gb: u64) -> Self {
        let catalog = Arc::new(catalog);
        let source = Arc::new(MemorySource::new());
        let backend = Arc::new(FlakyInference::new());
        let cores = if ram_gb >= 16 { 8 } else if ram_gb >= 8 { 4 } else { 2 };
        let manager = Arc::new(ModelManager::new(
            config,
            catalog.clone(),
            source.clone(),
            backend.clone(),
            fixed_detector(catalog, ram_gb, cores),
        ));
        manager.initialize().await.unwrap();
        Self {
            dir,
            manager,
            source,
            backend,
        }
    }

    pub fn models_dir(&self) -> std::path::PathBuf {
        self.manager.models_dir().to_path_buf()
    }
}
