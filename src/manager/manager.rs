//! Model Manager - downloads, storage budget, and loaded instances
//!
//! Every mutation runs under the shared `SingleFlight` guard. Public methods
//! acquire it; the `*_locked` variants take a `FlightPermit` so the
//! coordinator can chain several steps under one acquisition.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::single_flight::{FlightPermit, SingleFlight};
use super::types::{CleanupReport, LoadedModel, ModelInfo};
use crate::catalog::{Catalog, ModelDescriptor, ModelId};
use crate::config::LifecycleConfig;
use crate::device::DeviceDetector;
use crate::download::{ArtifactSource, DownloadState, DownloadStates, Downloader, HttpSource};
use crate::error::{ModelError, Result};
use crate::events::{ModelEvent, ModelObserver, Observers};
use crate::inference::{InferenceCapability, ModelInstance};
use crate::storage::{EvictionCandidate, EvictionPolicy, IntegrityVerifier, StorageTracker, StorageUsage};

pub struct ModelManager {
    config: LifecycleConfig,
    catalog: Arc<Catalog>,
    downloader: Downloader,
    capability: Arc<dyn InferenceCapability>,
    device: Arc<DeviceDetector>,
    tracker: StorageTracker,
    verifier: IntegrityVerifier,
    eviction: EvictionPolicy,
    flight: SingleFlight,
    downloads: DownloadStates,
    records: RwLock<HashMap<ModelId, LoadedModel>>,
    instances: RwLock<HashMap<ModelId, Arc<ModelInstance>>>,
    active_download: StdMutex<Option<CancellationToken>>,
    observers: Arc<Observers>,
}

impl ModelManager {
    pub fn new(
        config: LifecycleConfig,
        catalog: Arc<Catalog>,
        source: Arc<dyn ArtifactSource>,
        capability: Arc<dyn InferenceCapability>,
        device: Arc<DeviceDetector>,
    ) -> Self {
        Self {
            tracker: StorageTracker::new(config.storage_budget_bytes),
            verifier: IntegrityVerifier::new(config.integrity_tolerance_bytes),
            eviction: EvictionPolicy,
            downloader: Downloader::new(source),
            config,
            catalog,
            capability,
            device,
            flight: SingleFlight::new(),
            downloads: DownloadStates::new(),
            records: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            active_download: StdMutex::new(None),
            observers: Arc::new(Observers::new()),
        }
    }

    /// Built-in catalog, HTTPS downloads and host detection (or the
    /// configured device override)
    pub fn from_config(
        config: LifecycleConfig,
        capability: Arc<dyn InferenceCapability>,
    ) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(Catalog::builtin());
        let source = Arc::new(HttpSource::new(Duration::from_secs(config.http_timeout_secs))?);
        let device = Arc::new(DeviceDetector::from_override(
            config.device_override.as_ref(),
            catalog.clone(),
        ));
        Ok(Self::new(config, catalog, source, capability, device))
    }

    /// Create directories and rebuild the record set from disk.
    ///
    /// Files that fail verification and leftover `.partial` files are
    /// deleted. Unknown files are left alone.
    pub async fn initialize(&self) -> Result<()> {
        let _permit = self.flight.try_acquire("initialize")?;

        for dir in [&self.config.models_dir, &self.config.cache_dir] {
            fs::create_dir_all(dir).await.map_err(|e| {
                ModelError::Initialization(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        let mut entries = match fs::read_dir(&self.config.models_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Failed to scan models directory: {}", e);
                return Ok(());
            }
        };

        let mut found = HashMap::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Stopped models directory scan early: {}", e);
                    break;
                }
            };
            let path = entry.path();
            let Some(filename) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };

            if filename.ends_with(".partial") {
                log::info!("Removing interrupted download {}", path.display());
                if let Err(e) = fs::remove_file(&path).await {
                    log::warn!("Failed to remove {}: {}", path.display(), e);
                }
                continue;
            }

            let Some(descriptor) = self.catalog.by_filename(&filename) else {
                log::debug!("Ignoring unknown file in models directory: {}", filename);
                continue;
            };

            match self
                .verifier
                .verify_or_discard(descriptor, &path, self.config.verify_checksums_on_scan)
                .await
            {
                Ok(size_bytes) => {
                    let downloaded_at = modified_at(&path).await;
                    log::info!("Found {} ({} bytes)", descriptor.id, size_bytes);
                    found.insert(
                        descriptor.id.clone(),
                        LoadedModel {
                            model_id: descriptor.id.clone(),
                            path,
                            size_bytes,
                            downloaded_at,
                        },
                    );
                }
                Err(ModelError::Integrity { .. }) => {}
                Err(e) => log::warn!("Failed to verify {}: {}", path.display(), e),
            }
        }

        *self.records.write().await = found;

        let usage = self.usage().await.total_bytes;
        if usage > self.tracker.budget() {
            log::warn!(
                "Model storage ({} bytes) exceeds budget ({} bytes); run cleanup to reclaim space",
                usage,
                self.tracker.budget()
            );
        }
        log::info!(
            "Model manager initialized: {} models, {} bytes",
            self.records.read().await.len(),
            usage
        );
        Ok(())
    }

    pub async fn download_model(&self, model_id: &str) -> Result<()> {
        self.download_model_with_cancel(model_id, CancellationToken::new())
            .await
    }

    /// Download with a caller-owned cancellation token
    pub async fn download_model_with_cancel(
        &self,
        model_id: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        if !self.catalog.contains(model_id) {
            return Err(ModelError::NotFound(model_id.to_string()));
        }
        if self.is_downloaded(model_id).await {
            return Ok(());
        }
        let permit = self.flight.try_acquire(format!("download {}", model_id))?;
        self.download_locked(&permit, model_id, cancel).await
    }

    /// Cancel the in-flight download, if any. Returns whether one was running.
    pub fn cancel_download(&self) -> bool {
        match self.active_download.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub(crate) async fn download_locked(
        &self,
        _permit: &FlightPermit,
        model_id: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        let descriptor = self
            .catalog
            .get(model_id)
            .cloned()
            .ok_or_else(|| ModelError::NotFound(model_id.to_string()))?;

        if self.is_downloaded(model_id).await {
            return Ok(());
        }

        if let Err(e) = self.ensure_space(descriptor.size_bytes).await {
            self.record_failure(&descriptor.id, &e);
            return Err(e);
        }

        self.set_active_download(Some(cancel.clone()));
        self.downloads.begin(&descriptor.id, descriptor.size_bytes);
        self.observers.emit(ModelEvent::DownloadStarted {
            model_id: descriptor.id.clone(),
            total_bytes: descriptor.size_bytes,
        });

        let result = self.transfer(&descriptor, &cancel).await;
        self.set_active_download(None);

        match result {
            Ok(()) => {
                self.downloads.complete(&descriptor.id);
                self.observers.emit(ModelEvent::DownloadCompleted {
                    model_id: descriptor.id.clone(),
                });
                log::info!("Model {} downloaded", descriptor.id);
                Ok(())
            }
            Err(e) => {
                log::error!("Download of {} failed: {}", descriptor.id, e);
                self.record_failure(&descriptor.id, &e);
                Err(e)
            }
        }
    }

    async fn transfer(&self, descriptor: &ModelDescriptor, cancel: &CancellationToken) -> Result<()> {
        let models_dir = self.config.models_dir.clone();
        fs::create_dir_all(&models_dir).await?;

        let mut last_percent = 0u64;
        let partial = self
            .downloader
            .fetch(descriptor, &models_dir, cancel, |downloaded, total| {
                self.downloads.update(&descriptor.id, downloaded, total);
                let percent = if total > 0 { downloaded * 100 / total } else { 0 };
                if percent > last_percent {
                    last_percent = percent;
                    self.observers.emit(ModelEvent::DownloadProgress {
                        model_id: descriptor.id.clone(),
                        downloaded_bytes: downloaded,
                        total_bytes: total,
                        progress: (downloaded as f64 / total as f64).min(1.0),
                    });
                }
            })
            .await?;

        self.observers.emit(ModelEvent::DownloadVerifying {
            model_id: descriptor.id.clone(),
        });
        let size_bytes = self
            .verifier
            .verify_or_discard(descriptor, &partial.path, self.config.verify_checksums)
            .await?;

        // Actual size may exceed the catalog size by the tolerance
        if let Err(e) = self.make_room_for_verified(&descriptor.id, size_bytes).await {
            let _ = fs::remove_file(&partial.path).await;
            return Err(e);
        }

        let final_path = models_dir.join(&descriptor.filename);
        if let Err(e) = fs::rename(&partial.path, &final_path).await {
            let _ = fs::remove_file(&partial.path).await;
            return Err(e.into());
        }

        self.records.write().await.insert(
            descriptor.id.clone(),
            LoadedModel {
                model_id: descriptor.id.clone(),
                path: final_path,
                size_bytes,
                downloaded_at: Utc::now(),
            },
        );

        Ok(())
    }

    /// Evict until `needed` more bytes fit. Nothing is deleted when the
    /// evictable set cannot cover the shortfall.
    async fn ensure_space(&self, needed: u64) -> Result<()> {
        let usage = self.usage().await.total_bytes;
        let to_free = self.tracker.bytes_to_free(usage, needed);
        if to_free == 0 {
            return Ok(());
        }

        let candidates = self.eviction_candidates(None).await;
        let reclaimable = self.eviction.reclaimable(&candidates);
        if reclaimable < to_free {
            return Err(ModelError::Storage {
                required: needed,
                available: self.tracker.available(usage) + reclaimable,
            });
        }

        for victim in self.eviction.select(&candidates, to_free) {
            self.evict(&victim).await?;
        }
        Ok(())
    }

    /// Evict until a verified, not yet published file of `size_bytes` fits
    async fn make_room_for_verified(&self, model_id: &ModelId, size_bytes: u64) -> Result<()> {
        let usage = self.usage().await.total_bytes;
        let excess = self.tracker.bytes_to_free(usage, size_bytes);
        if excess == 0 {
            return Ok(());
        }

        let candidates = self.eviction_candidates(Some(model_id)).await;
        let reclaimable = self.eviction.reclaimable(&candidates);
        if reclaimable < excess {
            log::warn!(
                "{} is {} bytes over the storage budget and nothing else can be evicted",
                model_id,
                excess
            );
            return Err(ModelError::Storage {
                required: size_bytes,
                available: self.tracker.available(usage) + reclaimable,
            });
        }

        for victim in self.eviction.select(&candidates, excess) {
            self.evict(&victim).await?;
        }
        Ok(())
    }

    /// Downloaded models that may be deleted: not loaded, not `keep`
    async fn eviction_candidates(&self, keep: Option<&ModelId>) -> Vec<EvictionCandidate> {
        let protected = self.device.recommended_ids();
        let loaded: Vec<ModelId> = self.instances.read().await.keys().cloned().collect();
        self.records
            .read()
            .await
            .values()
            .filter(|r| Some(&r.model_id) != keep && !loaded.contains(&r.model_id))
            .map(|r| EvictionCandidate {
                model_id: r.model_id.clone(),
                size_bytes: r.size_bytes,
                downloaded_at: r.downloaded_at,
                protected: protected.contains(&r.model_id),
            })
            .collect()
    }

    async fn evict(&self, victim: &EvictionCandidate) -> Result<()> {
        log::info!(
            "Evicting {} ({} bytes, downloaded {})",
            victim.model_id,
            victim.size_bytes,
            victim.downloaded_at
        );
        self.delete_model_file(&victim.model_id).await?;
        self.observers.emit(ModelEvent::ModelEvicted {
            model_id: victim.model_id.clone(),
            freed_bytes: victim.size_bytes,
        });
        Ok(())
    }

    async fn delete_model_file(&self, model_id: &ModelId) -> Result<()> {
        let path = match self.records.read().await.get(model_id) {
            Some(record) => record.path.clone(),
            None => return Ok(()),
        };
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.records.write().await.remove(model_id);
        self.downloads.clear(model_id);
        Ok(())
    }

    pub async fn load_model_instance(&self, model_id: &str) -> Result<Arc<ModelInstance>> {
        if let Some(instance) = self.instance(model_id).await {
            return Ok(instance);
        }
        let permit = self.flight.try_acquire(format!("load {}", model_id))?;
        self.load_locked(&permit, model_id).await
    }

    /// Load a handle for a downloaded model. A backend failure yields a
    /// placeholder instance instead of an error.
    pub(crate) async fn load_locked(
        &self,
        _permit: &FlightPermit,
        model_id: &str,
    ) -> Result<Arc<ModelInstance>> {
        if let Some(instance) = self.instance(model_id).await {
            return Ok(instance);
        }

        let descriptor = self
            .catalog
            .get(model_id)
            .ok_or_else(|| ModelError::NotFound(model_id.to_string()))?;
        let record = self
            .records
            .read()
            .await
            .get(model_id)
            .cloned()
            .ok_or_else(|| ModelError::NotFound(format!("{} is not downloaded", model_id)))?;

        let instance = match self
            .capability
            .load_handle(descriptor.task, &record.path)
            .await
        {
            Ok(handle) => {
                log::info!(
                    "Loaded {} on {} as {}",
                    model_id,
                    self.capability.name(),
                    handle
                );
                ModelInstance::native(descriptor, record.path.clone(), self.capability.clone(), handle)
            }
            Err(e) => {
                log::warn!(
                    "Native load of {} failed, using placeholder: {:#}",
                    model_id,
                    e
                );
                ModelInstance::placeholder(descriptor, format!("{:#}", e))
            }
        };

        let instance = Arc::new(instance);
        self.instances
            .write()
            .await
            .insert(descriptor.id.clone(), instance.clone());
        self.observers.emit(ModelEvent::InstanceLoaded {
            model_id: descriptor.id.clone(),
            placeholder: instance.is_placeholder(),
        });
        Ok(instance)
    }

    /// Drop the manager's record of a loaded instance.
    ///
    /// Refused with `InUse` while anyone else holds the instance.
    pub async fn unload_model_instance(&self, model_id: &str) -> Result<()> {
        let permit = self.flight.try_acquire(format!("unload {}", model_id))?;
        if let Some(instance) = self.instances.read().await.get(model_id) {
            // one reference in the map, anything more is an outside owner
            if Arc::strong_count(instance) > 1 {
                return Err(ModelError::InUse(instance.model_id().clone()));
            }
        }
        self.unload_locked(&permit, model_id).await;
        Ok(())
    }

    /// Remove the instance record. The handle is freed once the last
    /// holder drops it. Returns whether a record existed.
    pub(crate) async fn unload_locked(&self, _permit: &FlightPermit, model_id: &str) -> bool {
        let removed = self.instances.write().await.remove(model_id);
        match removed {
            Some(instance) => {
                log::info!("Unloaded {}", model_id);
                self.observers.emit(ModelEvent::InstanceUnloaded {
                    model_id: instance.model_id().clone(),
                });
                true
            }
            None => false,
        }
    }

    /// Evict oldest-first until usage is at or below `target_bytes`
    /// (default: the configured fraction of the budget)
    pub async fn cleanup_models(&self, target_bytes: Option<u64>) -> Result<CleanupReport> {
        let _permit = self.flight.try_acquire("cleanup")?;
        let target = target_bytes.unwrap_or_else(|| self.config.cleanup_target_bytes());

        let usage = self.usage().await.total_bytes;
        let mut report = CleanupReport {
            usage_after: usage,
            ..CleanupReport::default()
        };
        if usage <= target {
            return Ok(report);
        }

        let candidates = self.eviction_candidates(None).await;
        for victim in self.eviction.select(&candidates, usage - target) {
            match self.evict(&victim).await {
                Ok(()) => {
                    report.freed_bytes += victim.size_bytes;
                    report.evicted.push(victim.model_id);
                }
                Err(e) => log::error!("Failed to evict {}: {}", victim.model_id, e),
            }
        }

        report.usage_after = self.usage().await.total_bytes;
        if report.usage_after > target {
            log::warn!(
                "Cleanup stopped at {} bytes, target {} bytes; remaining models are loaded",
                report.usage_after,
                target
            );
        }
        Ok(report)
    }

    /// Bytes used by downloaded models whose files still exist
    pub async fn get_current_storage_size(&self) -> u64 {
        self.usage().await.total_bytes
    }

    async fn usage(&self) -> StorageUsage {
        let records = self.records.read().await;
        let usage = self.tracker.usage(records.values()).await;
        usage
    }

    /// Re-verify every record; drop records whose file vanished and delete
    /// corrupt files. Loaded models are skipped. Returns the dropped ids.
    pub async fn verify_integrity(&self) -> Result<Vec<ModelId>> {
        let _permit = self.flight.try_acquire("verify integrity")?;
        let records: Vec<LoadedModel> = self.records.read().await.values().cloned().collect();
        let mut dropped = Vec::new();

        for record in records {
            if self.instances.read().await.contains_key(&record.model_id) {
                log::debug!("Skipping loaded model {}", record.model_id);
                continue;
            }
            let Some(descriptor) = self.catalog.get(record.model_id.as_str()) else {
                continue;
            };
            match self
                .verifier
                .verify_or_discard(descriptor, &record.path, self.config.verify_checksums)
                .await
            {
                Ok(_) => {}
                Err(ModelError::Integrity { reason, .. }) => {
                    log::warn!("Dropping {}: {}", record.model_id, reason);
                    self.records.write().await.remove(&record.model_id);
                    self.downloads.clear(&record.model_id);
                    self.observers.emit(ModelEvent::ModelRemoved {
                        model_id: record.model_id.clone(),
                    });
                    dropped.push(record.model_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(dropped)
    }

    /// Delete a downloaded model
    pub async fn remove_model(&self, model_id: &str) -> Result<()> {
        let _permit = self.flight.try_acquire(format!("remove {}", model_id))?;
        let id = match self.records.read().await.get(model_id) {
            Some(record) => record.model_id.clone(),
            None => return Err(ModelError::NotFound(format!("{} is not downloaded", model_id))),
        };
        if self.instances.read().await.contains_key(model_id) {
            return Err(ModelError::InUse(id));
        }
        self.delete_model_file(&id).await?;
        log::info!("Removed {}", id);
        self.observers.emit(ModelEvent::ModelRemoved { model_id: id });
        Ok(())
    }

    /// Catalog merged with local status
    pub async fn available_models(&self) -> Vec<ModelInfo> {
        let records = self.records.read().await;
        let instances = self.instances.read().await;
        let recommended = self.device.recommended_ids();

        self.catalog
            .all()
            .iter()
            .map(|descriptor| {
                let record = records.get(&descriptor.id);
                let instance = instances.get(&descriptor.id);
                ModelInfo {
                    descriptor: descriptor.clone(),
                    is_downloaded: record.is_some(),
                    is_loaded: instance.is_some(),
                    is_placeholder: instance.map(|i| i.is_placeholder()).unwrap_or(false),
                    is_recommended: recommended.contains(&descriptor.id),
                    local_path: record.map(|r| r.path.clone()),
                    downloaded_at: record.map(|r| r.downloaded_at),
                    download: self.downloads.get(descriptor.id.as_str()),
                }
            })
            .collect()
    }

    pub async fn model_info(&self, model_id: &str) -> Option<ModelInfo> {
        self.available_models()
            .await
            .into_iter()
            .find(|info| info.descriptor.id.as_str() == model_id)
    }

    pub fn download_states(&self) -> HashMap<ModelId, DownloadState> {
        self.downloads.snapshot()
    }

    pub fn download_state(&self, model_id: &str) -> Option<DownloadState> {
        self.downloads.get(model_id)
    }

    pub async fn is_downloaded(&self, model_id: &str) -> bool {
        self.records.read().await.contains_key(model_id)
    }

    pub async fn loaded_models(&self) -> Vec<LoadedModel> {
        let mut models: Vec<LoadedModel> = self.records.read().await.values().cloned().collect();
        models.sort_by_key(|m| m.downloaded_at);
        models
    }

    pub async fn instance(&self, model_id: &str) -> Option<Arc<ModelInstance>> {
        self.instances.read().await.get(model_id).cloned()
    }

    pub fn storage_budget(&self) -> u64 {
        self.tracker.budget()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn device(&self) -> &Arc<DeviceDetector> {
        &self.device
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn models_dir(&self) -> &Path {
        &self.config.models_dir
    }

    pub fn subscribe(&self, observer: Arc<dyn ModelObserver>) {
        self.observers.subscribe(observer);
    }

    pub(crate) fn observers(&self) -> &Arc<Observers> {
        &self.observers
    }

    pub fn single_flight(&self) -> &SingleFlight {
        &self.flight
    }

    /// Cancel any download and drop all instance records
    pub async fn shutdown(&self) {
        self.cancel_download();
        let instances: Vec<ModelId> = self.instances.write().await.drain().map(|(id, _)| id).collect();
        for model_id in instances {
            self.observers.emit(ModelEvent::InstanceUnloaded { model_id });
        }
        log::info!("Model manager shut down");
    }

    fn set_active_download(&self, token: Option<CancellationToken>) {
        match self.active_download.lock() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn record_failure(&self, model_id: &ModelId, error: &ModelError) {
        self.downloads.fail(model_id, error.to_string());
        self.observers.emit(ModelEvent::DownloadFailed {
            model_id: model_id.clone(),
            error: error.to_string(),
        });
    }
}

async fn modified_at(path: &Path) -> DateTime<Utc> {
    match fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(time) => DateTime::<Utc>::from(time),
        Err(_) => Utc::now(),
    }
}
