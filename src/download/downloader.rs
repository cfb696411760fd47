//! Model Download Logic
//!
//! Streams an artifact into `<filename>.partial`. The caller verifies the
//! partial file and publishes it; any failure here leaves no partial behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::source::ArtifactSource;
use crate::catalog::ModelDescriptor;
use crate::error::{ModelError, Result};

/// A finished transfer waiting for verification
#[derive(Debug, Clone, PartialEq)]
pub struct PartialArtifact {
    pub path: PathBuf,
    pub bytes_written: u64,
}

#[derive(Clone)]
pub struct Downloader {
    source: Arc<dyn ArtifactSource>,
}

impl Downloader {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self { source }
    }

    /// Stream `descriptor` into `models_dir`.
    ///
    /// `on_progress(downloaded, total)` runs after every chunk. `total` is the
    /// announced content length, falling back to the catalog size.
    pub async fn fetch<F>(
        &self,
        descriptor: &ModelDescriptor,
        models_dir: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<PartialArtifact>
    where
        F: FnMut(u64, u64) + Send,
    {
        let partial_path = models_dir.join(descriptor.partial_filename());

        let artifact = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ModelError::Cancelled(format!("download of {}", descriptor.id)));
            }
            opened = self.source.open(descriptor) => opened?,
        };

        let total = artifact.content_length.unwrap_or(descriptor.size_bytes);
        log::info!(
            "Downloading {} ({} bytes) to {}",
            descriptor.id,
            total,
            partial_path.display()
        );

        match stream_to_file(artifact.stream, &partial_path, total, cancel, &mut on_progress).await {
            Ok(bytes_written) => Ok(PartialArtifact {
                path: partial_path,
                bytes_written,
            }),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&partial_path).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!(
                            "Failed to remove partial file {}: {}",
                            partial_path.display(),
                            remove_err
                        );
                    }
                }
                match e {
                    ModelError::Cancelled(_) => {
                        log::info!("Download of {} cancelled", descriptor.id);
                        Err(ModelError::Cancelled(format!("download of {}", descriptor.id)))
                    }
                    other => Err(other),
                }
            }
        }
    }
}

async fn stream_to_file<F>(
    mut stream: super::source::ByteStream,
    path: &Path,
    total: u64,
    cancel: &CancellationToken,
    on_progress: &mut F,
) -> Result<u64>
where
    F: FnMut(u64, u64) + Send,
{
    let mut file = tokio::fs::File::create(path).await?;
    let mut downloaded: u64 = 0;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ModelError::Cancelled(path.display().to_string()));
            }
            next = stream.next() => next,
        };

        let Some(chunk) = chunk else { break };
        let chunk = chunk?;

        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        on_progress(downloaded, total);
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{TaskKind, MIB};
    use crate::testing::{descriptor, MemorySource, SourceBehavior};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fetch_writes_partial_and_reports_progress() {
        let dir = tempdir().unwrap();
        let desc = descriptor("tiny", TaskKind::SpeechRecognition, 3 * MIB);
        let source = Arc::new(MemorySource::new());
        let downloader = Downloader::new(source);

        let mut reports = Vec::new();
        let artifact = downloader
            .fetch(&desc, dir.path(), &CancellationToken::new(), |done, total| {
                reports.push((done, total))
            })
            .await
            .unwrap();

        assert_eq!(artifact.bytes_written, 3 * MIB);
        assert_eq!(artifact.path, dir.path().join("tiny.bin.partial"));
        assert_eq!(std::fs::metadata(&artifact.path).unwrap().len(), 3 * MIB);
        assert_eq!(reports.last(), Some(&(3 * MIB, 3 * MIB)));
        assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[tokio::test]
    async fn test_network_failure_removes_partial() {
        let dir = tempdir().unwrap();
        let desc = descriptor("flaky", TaskKind::SpeechRecognition, 4 * MIB);
        let source = Arc::new(MemorySource::new());
        source.set_behavior("flaky", SourceBehavior::FailAfter(MIB));
        let downloader = Downloader::new(source);

        let err = downloader
            .fetch(&desc, dir.path(), &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::Network(_)));
        assert!(!dir.path().join("flaky.bin.partial").exists());
    }

    #[tokio::test]
    async fn test_cancel_removes_partial() {
        let dir = tempdir().unwrap();
        let desc = descriptor("slow", TaskKind::SpeechRecognition, 4 * MIB);
        let source = Arc::new(MemorySource::new());
        source.set_behavior("slow", SourceBehavior::Stall(MIB));
        let downloader = Downloader::new(source);

        let token = CancellationToken::new();
        let canceller = token.clone();
        let mut first_chunk = false;
        let fetch = downloader.fetch(&desc, dir.path(), &token, |_, _| {
            if !first_chunk {
                first_chunk = true;
                canceller.cancel();
            }
        });

        let err = fetch.await.unwrap_err();
        assert!(matches!(err, ModelError::Cancelled(_)));
        assert!(!dir.path().join("slow.bin.partial").exists());
    }
}
