//! Local file classification against catalog expectations
//!
//! The [`IntegrityChecker`] runs the cheapest sufficient check first:
//!
//! 1. stat: a missing file needs fetching
//! 2. size: a size mismatch needs fetching and may be a resumable prefix
//! 3. digest: only when sizes agree and checksums are not ignored
//!
//! Nothing is retained between calls; every classification re-stats the file.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::app::checksum::ChecksumStore;
use crate::app::hash::Md5Hash;
use crate::app::models::{LocalFileState, RemoteFileDescriptor};
use crate::errors::{ChecksumError, ChecksumResult};

/// Why a file has to be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    /// No local file
    Missing,
    /// Local file exists with the wrong size
    SizeMismatch { expected: u64, actual: u64 },
    /// Sizes agree but the content does not hash to the expected digest
    ChecksumMismatch {
        expected: Md5Hash,
        actual: Option<Md5Hash>,
    },
}

impl fmt::Display for FetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchReason::Missing => write!(f, "target absent"),
            FetchReason::SizeMismatch { expected, actual } => write!(
                f,
                "size mismatch: expected {} bytes, found {} bytes",
                expected, actual
            ),
            FetchReason::ChecksumMismatch {
                expected,
                actual: Some(actual),
            } => write!(f, "checksum mismatch: expected {}, found {}", expected, actual),
            FetchReason::ChecksumMismatch {
                expected,
                actual: None,
            } => write!(f, "checksum mismatch: expected {}, file vanished", expected),
        }
    }
}

/// Outcome of classifying one local file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Local copy is complete; `checksum_verified` is false when only the
    /// size was compared
    Satisfied { checksum_verified: bool },
    /// Local copy must be (re-)fetched
    NeedsFetch(FetchReason),
}

impl Verdict {
    pub fn needs_fetch(&self) -> bool {
        matches!(self, Verdict::NeedsFetch(_))
    }

    /// Whether the existing bytes may be a prefix worth resuming from
    pub fn is_partial(&self) -> bool {
        matches!(self, Verdict::NeedsFetch(FetchReason::SizeMismatch { .. }))
    }

    /// Size of the local file if it is a plausible resume prefix
    ///
    /// Only a non-empty file strictly smaller than the expected size
    /// qualifies.
    pub fn resume_offset(&self) -> Option<u64> {
        match self {
            Verdict::NeedsFetch(FetchReason::SizeMismatch { expected, actual })
                if *actual > 0 && actual < expected =>
            {
                Some(*actual)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Satisfied {
                checksum_verified: true,
            } => write!(f, "verified"),
            Verdict::Satisfied {
                checksum_verified: false,
            } => write!(f, "size matches (checksum not checked)"),
            Verdict::NeedsFetch(reason) => write!(f, "needs fetch: {}", reason),
        }
    }
}

/// Classifies local files using a shared [`ChecksumStore`]
#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    store: Arc<ChecksumStore>,
}

impl IntegrityChecker {
    pub fn new(store: Arc<ChecksumStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ChecksumStore> {
        &self.store
    }

    /// Classify the file at `path` against `descriptor`
    ///
    /// # Errors
    ///
    /// Returns `ChecksumError::Io` if the file cannot be stat'ed or read, and
    /// `ChecksumError::InvalidPath` for an empty path.
    pub async fn classify(
        &self,
        descriptor: &RemoteFileDescriptor,
        path: &Path,
    ) -> ChecksumResult<Verdict> {
        let local = LocalFileState::inspect(path)
            .await
            .map_err(|source| ChecksumError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let verdict = self.evaluate(descriptor, path, local).await?;
        info!("{}: {}", path.display(), verdict);
        Ok(verdict)
    }

    async fn evaluate(
        &self,
        descriptor: &RemoteFileDescriptor,
        path: &Path,
        local: LocalFileState,
    ) -> ChecksumResult<Verdict> {
        if !local.exists {
            return Ok(Verdict::NeedsFetch(FetchReason::Missing));
        }

        if local.size_on_disk != descriptor.expected_size {
            return Ok(Verdict::NeedsFetch(FetchReason::SizeMismatch {
                expected: descriptor.expected_size,
                actual: local.size_on_disk,
            }));
        }

        if self.store.policy().ignore_checksum {
            debug!("Skipping checksum for {} by policy", path.display());
            return Ok(Verdict::Satisfied {
                checksum_verified: false,
            });
        }

        let actual = self.store.digest_of(path).await?;
        if actual.as_ref() == Some(&descriptor.expected_checksum) {
            Ok(Verdict::Satisfied {
                checksum_verified: true,
            })
        } else {
            Ok(Verdict::NeedsFetch(FetchReason::ChecksumMismatch {
                expected: descriptor.expected_checksum,
                actual,
            }))
        }
    }
}
