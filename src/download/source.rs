//! Artifact sources - where model bytes come from

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;

use crate::catalog::ModelDescriptor;
use crate::error::{ModelError, Result};

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// An opened transfer
pub struct RemoteArtifact {
    /// Size announced by the source, if any
    pub content_length: Option<u64>,
    pub stream: ByteStream,
}

/// Opens a byte stream for a catalog entry
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn open(&self, descriptor: &ModelDescriptor) -> Result<RemoteArtifact>;
}

/// Streams artifacts from their HTTPS URLs
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactSource for HttpSource {
    async fn open(&self, descriptor: &ModelDescriptor) -> Result<RemoteArtifact> {
        log::info!("Sending GET request to: {}", descriptor.url);
        let response = self
            .client
            .get(&descriptor.url)
            .send()
            .await
            .map_err(|e| ModelError::Network(format!("Failed to start download: {}", e)))?;

        if !response.status().is_success() {
            return Err(ModelError::Network(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ModelError::Network(format!("Download error: {}", e))))
            .boxed();

        Ok(RemoteArtifact {
            content_length,
            stream,
        })
    }
}
