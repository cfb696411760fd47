//! Integrity Verifier - size tolerance and optional SHA-256 checks

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::catalog::ModelDescriptor;
use crate::error::{ModelError, Result};

/// Outcome of checking one file against its descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid { size_bytes: u64 },
    Missing,
    SizeMismatch { expected: u64, actual: u64 },
    ChecksumMismatch { expected: String, actual: String },
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid { .. })
    }

    fn describe(&self) -> String {
        match self {
            Verdict::Valid { size_bytes } => format!("valid ({} bytes)", size_bytes),
            Verdict::Missing => "file missing".to_string(),
            Verdict::SizeMismatch { expected, actual } => {
                format!("size {} bytes, expected {} bytes", actual, expected)
            }
            Verdict::ChecksumMismatch { expected, actual } => {
                format!("hash mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntegrityVerifier {
    tolerance_bytes: u64,
}

impl IntegrityVerifier {
    pub fn new(tolerance_bytes: u64) -> Self {
        Self { tolerance_bytes }
    }

    pub fn tolerance(&self) -> u64 {
        self.tolerance_bytes
    }

    pub fn size_within_tolerance(&self, expected: u64, actual: u64) -> bool {
        expected.abs_diff(actual) <= self.tolerance_bytes
    }

    /// Check `path` against `descriptor`. The hash is only computed when
    /// `with_checksum` is set and the descriptor publishes one.
    pub async fn check(
        &self,
        descriptor: &ModelDescriptor,
        path: &Path,
        with_checksum: bool,
    ) -> Result<Verdict> {
        let metadata = match fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(Verdict::Missing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Verdict::Missing),
            Err(e) => return Err(e.into()),
        };

        let actual = metadata.len();
        if !self.size_within_tolerance(descriptor.size_bytes, actual) {
            return Ok(Verdict::SizeMismatch {
                expected: descriptor.size_bytes,
                actual,
            });
        }

        if with_checksum {
            if let Some(expected) = &descriptor.sha256 {
                let computed = sha256_file(path).await?;
                if !computed.eq_ignore_ascii_case(expected) {
                    return Ok(Verdict::ChecksumMismatch {
                        expected: expected.clone(),
                        actual: computed,
                    });
                }
            }
        }

        Ok(Verdict::Valid { size_bytes: actual })
    }

    /// Check and delete the file on mismatch. Returns the verified size.
    pub async fn verify_or_discard(
        &self,
        descriptor: &ModelDescriptor,
        path: &Path,
        with_checksum: bool,
    ) -> Result<u64> {
        match self.check(descriptor, path, with_checksum).await? {
            Verdict::Valid { size_bytes } => Ok(size_bytes),
            verdict => {
                log::warn!(
                    "Discarding {} for {}: {}",
                    path.display(),
                    descriptor.id,
                    verdict.describe()
                );
                if verdict != Verdict::Missing {
                    if let Err(e) = fs::remove_file(path).await {
                        log::error!("Failed to delete corrupt file {}: {}", path.display(), e);
                    }
                }
                Err(ModelError::Integrity {
                    model: descriptor.id.clone(),
                    reason: verdict.describe(),
                })
            }
        }
    }
}

/// Hex SHA-256 of a file, read in 1 MiB blocks
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
