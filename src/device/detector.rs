//! Device Capability Detector
//!
//! Classifies the host into a performance tier and derives the recommended
//! model per task. The result is cached until `refresh()`.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use sysinfo::System;

use super::recommendations::recommend;
use crate::catalog::{Catalog, ModelId, TaskKind, GIB};
use crate::config::DeviceOverride;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GpuType {
    None,
    Metal,  // Apple Silicon
    Cuda,   // NVIDIA
    Vulkan, // AMD/Intel
    OpenCL, // Generic GPU compute
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Low,
    Medium,
    High,
}

/// Raw host facts reported by a probe
#[derive(Debug, Clone, PartialEq)]
pub struct HostSnapshot {
    pub total_memory_bytes: u64,
    pub cpu_cores: usize,
    pub gpu_type: GpuType,
}

/// Detected capabilities plus the recommended model per task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceCapability {
    pub ram_gb: f64,
    pub cpu_cores: usize,
    pub gpu_acceleration: bool,
    pub gpu_type: GpuType,
    pub tier: PerformanceTier,
    pub recommended_speech: Option<ModelId>,
    pub recommended_summarization: Option<ModelId>,
}

impl DeviceCapability {
    pub fn recommended(&self, task: TaskKind) -> Option<&ModelId> {
        match task {
            TaskKind::SpeechRecognition => self.recommended_speech.as_ref(),
            TaskKind::TextSummarization => self.recommended_summarization.as_ref(),
            _ => None,
        }
    }
}

/// Source of host facts
pub trait HostProbe: Send + Sync {
    fn probe(&self) -> anyhow::Result<HostSnapshot>;
}

/// Reads the real host through sysinfo and environment heuristics
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProbe;

impl HostProbe for SysinfoProbe {
    fn probe(&self) -> anyhow::Result<HostSnapshot> {
        let sys = System::new_all();
        let total_memory_bytes = sys.total_memory();
        if total_memory_bytes == 0 {
            anyhow::bail!("sysinfo reported no memory");
        }
        let cpu_cores = std::thread::available_parallelism()?.get();

        Ok(HostSnapshot {
            total_memory_bytes,
            cpu_cores,
            gpu_type: detect_gpu(),
        })
    }
}

/// Fixed host facts, from configuration or tests
#[derive(Debug, Clone)]
pub struct StaticProbe(pub HostSnapshot);

impl From<&DeviceOverride> for StaticProbe {
    fn from(o: &DeviceOverride) -> Self {
        StaticProbe(HostSnapshot {
            total_memory_bytes: (o.ram_gb * GIB as f64) as u64,
            cpu_cores: o.cpu_cores,
            gpu_type: if o.gpu_acceleration {
                GpuType::OpenCL
            } else {
                GpuType::None
            },
        })
    }
}

impl HostProbe for StaticProbe {
    fn probe(&self) -> anyhow::Result<HostSnapshot> {
        Ok(self.0.clone())
    }
}

/// Conservative facts used when probing fails
fn fallback_snapshot() -> HostSnapshot {
    HostSnapshot {
        total_memory_bytes: 4 * GIB,
        cpu_cores: 2,
        gpu_type: GpuType::None,
    }
}

pub fn calculate_tier(ram_gb: f64, cpu_cores: usize) -> PerformanceTier {
    if ram_gb >= 16.0 && cpu_cores >= 8 {
        PerformanceTier::High
    } else if ram_gb >= 8.0 && cpu_cores >= 4 {
        PerformanceTier::Medium
    } else {
        PerformanceTier::Low
    }
}

pub struct DeviceDetector {
    probe: Box<dyn HostProbe>,
    catalog: Arc<Catalog>,
    cached: RwLock<Option<DeviceCapability>>,
}

impl DeviceDetector {
    pub fn new(probe: Box<dyn HostProbe>, catalog: Arc<Catalog>) -> Self {
        Self {
            probe,
            catalog,
            cached: RwLock::new(None),
        }
    }

    /// Real host detection unless the configuration pins the values
    pub fn from_override(device_override: Option<&DeviceOverride>, catalog: Arc<Catalog>) -> Self {
        match device_override {
            Some(o) => {
                log::info!("Using configured device override: {:?}", o);
                Self::new(Box::new(StaticProbe::from(o)), catalog)
            }
            None => Self::new(Box::new(SysinfoProbe), catalog),
        }
    }

    /// Cached capability, detected on first use
    pub fn detect(&self) -> DeviceCapability {
        if let Ok(guard) = self.cached.read() {
            if let Some(capability) = guard.as_ref() {
                return capability.clone();
            }
        }
        self.refresh()
    }

    /// Re-run detection and replace the cached value
    pub fn refresh(&self) -> DeviceCapability {
        let capability = self.compute();
        log::info!("Detected device capability: {:?}", capability);
        match self.cached.write() {
            Ok(mut guard) => *guard = Some(capability.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(capability.clone()),
        }
        capability
    }

    /// Ids eviction treats as protected
    pub fn recommended_ids(&self) -> Vec<ModelId> {
        let capability = self.detect();
        [capability.recommended_speech, capability.recommended_summarization]
            .into_iter()
            .flatten()
            .collect()
    }

    fn compute(&self) -> DeviceCapability {
        let snapshot = match self.probe.probe() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Device probe failed, assuming low-tier host: {:#}", e);
                fallback_snapshot()
            }
        };

        let ram_gb = snapshot.total_memory_bytes as f64 / GIB as f64;
        let tier = calculate_tier(ram_gb, snapshot.cpu_cores);
        let pick = |task| recommend(&self.catalog, task, tier, ram_gb).map(|m| m.id.clone());

        DeviceCapability {
            ram_gb,
            cpu_cores: snapshot.cpu_cores,
            gpu_acceleration: snapshot.gpu_type != GpuType::None,
            gpu_type: snapshot.gpu_type,
            tier,
            recommended_speech: pick(TaskKind::SpeechRecognition),
            recommended_summarization: pick(TaskKind::TextSummarization),
        }
    }
}

fn detect_gpu() -> GpuType {
    #[cfg(target_os = "macos")]
    {
        if std::env::consts::ARCH == "aarch64" {
            return GpuType::Metal;
        }
    }

    if has_cuda_support() {
        return GpuType::Cuda;
    }

    if has_vulkan_support() {
        return GpuType::Vulkan;
    }

    GpuType::None
}

fn has_cuda_support() -> bool {
    if std::env::var("CUDA_PATH").is_ok() || std::env::var("CUDA_HOME").is_ok() {
        return true;
    }

    if std::path::Path::new("/usr/local/cuda").exists() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::path::Path::new("C:\\Windows\\System32\\nvcuda.dll").exists() {
            return true;
        }
    }

    false
}

fn has_vulkan_support() -> bool {
    if std::env::var("VULKAN_SDK").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::path::Path::new("C:\\Windows\\System32\\vulkan-1.dll").exists() {
            return true;
        }
    }

    std::path::Path::new("/usr/lib/x86_64-linux-gnu/libvulkan.so").exists()
        || std::path::Path::new("/usr/lib/libvulkan.so").exists()
}
