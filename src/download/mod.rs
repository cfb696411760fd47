//! Downloader
//!
//! Module structure:
//! - source.rs: ArtifactSource trait and the reqwest-backed HttpSource
//! - downloader.rs: streaming to `.partial` with progress and cancellation
//! - state.rs: per-model DownloadState registry

pub mod downloader;
pub mod source;
pub mod state;

pub use downloader::{Downloader, PartialArtifact};
pub use source::{ArtifactSource, ByteStream, HttpSource, RemoteArtifact};
pub use state::{DownloadState, DownloadStates};
