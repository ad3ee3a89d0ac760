//! Checksum computation with sidecar caching
//!
//! [`ChecksumStore`] hashes content files incrementally in fixed-size blocks
//! and keeps the result in a sidecar next to each file so that unchanged
//! multi-gigabyte files are not re-read on every run.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::config::ChecksumPolicy;
use super::sidecar::{self, ChecksumRecord};
use crate::app::events::{DecileThrottle, ProgressBus, ProgressEvent};
use crate::app::hash::Md5Hash;
use crate::errors::{ChecksumError, ChecksumResult};

/// Computes, caches and verifies content digests
#[derive(Debug)]
pub struct ChecksumStore {
    policy: ChecksumPolicy,
    bus: Arc<ProgressBus>,
    computations: AtomicUsize,
}

impl ChecksumStore {
    /// Create a store with the given policy, publishing on `bus`
    pub fn new(policy: ChecksumPolicy, bus: Arc<ProgressBus>) -> Self {
        Self {
            policy,
            bus,
            computations: AtomicUsize::new(0),
        }
    }

    /// Policy this store was built with
    pub fn policy(&self) -> &ChecksumPolicy {
        &self.policy
    }

    /// Number of times file content has been hashed by this store
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    /// Digest of the file at `path`
    ///
    /// Returns `Ok(None)` when the file does not exist. A trusted sidecar is
    /// used when the policy allows it; otherwise the content is hashed and the
    /// result written back to the sidecar (unless sidecar writes are off).
    ///
    /// # Errors
    ///
    /// Returns `ChecksumError::InvalidPath` for an empty path and
    /// `ChecksumError::Io` if the file cannot be read.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::path::Path;
    /// use std::sync::Arc;
    /// use hb_fetcher::app::checksum::{ChecksumPolicy, ChecksumStore};
    /// use hb_fetcher::app::events::ProgressBus;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = ChecksumStore::new(ChecksumPolicy::default(), Arc::new(ProgressBus::new()));
    /// if let Some(digest) = store.digest_of(Path::new("game.zip")).await? {
    ///     println!("{}", digest);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn digest_of(&self, path: &Path) -> ChecksumResult<Option<Md5Hash>> {
        sidecar::base_name(path)?;
        if !exists(path).await? {
            return Ok(None);
        }

        if self.policy.uses_cached_digest() {
            if let Some(cached) = self.read_record(path).await? {
                debug!("Using cached digest for {}: {}", path.display(), cached);
                return Ok(Some(cached));
            }
        }

        let digest = self.compute_digest(path).await?;
        self.write_record(path, Some(digest)).await?;
        Ok(Some(digest))
    }

    /// Hash the content of `path`, ignoring any sidecar
    ///
    /// Publishes a hash-started/hash-finished pair with decile progress in
    /// between. The finished event is published even if reading fails.
    pub async fn compute_digest(&self, path: &Path) -> ChecksumResult<Md5Hash> {
        let io_error = |source: io::Error| ChecksumError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).await.map_err(io_error)?;
        let total_bytes = file.metadata().await.map_err(io_error)?.len();

        self.computations.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Hashing {} ({} bytes, block size {})",
            path.display(),
            total_bytes,
            self.policy.block_size
        );
        self.bus.publish(&ProgressEvent::HashStarted {
            path: path.to_path_buf(),
            total_bytes,
        });

        let result = self.hash_blocks(&mut file, total_bytes).await;

        self.bus.publish(&ProgressEvent::HashFinished {
            path: path.to_path_buf(),
        });

        let digest = result.map_err(io_error)?;
        info!("Computed md5 {} for {}", digest, path.display());
        Ok(digest)
    }

    async fn hash_blocks(&self, file: &mut File, total_bytes: u64) -> io::Result<Md5Hash> {
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; self.policy.block_size.max(1)];
        let mut throttle = DecileThrottle::new();
        let mut read_bytes: u64 = 0;

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            context.consume(&buffer[..n]);
            read_bytes += n as u64;
            self.bus
                .report_progress(&mut throttle, read_bytes.min(total_bytes), total_bytes);
        }

        Ok(Md5Hash::from(context.compute()))
    }

    /// Persist `digest` in the sidecar of `path`
    ///
    /// With `None` the digest is computed from the file first. Does nothing
    /// when sidecar writes are disabled or the content file is missing. Any
    /// previous sidecar is removed before the new one is written.
    pub async fn write_record(&self, path: &Path, digest: Option<Md5Hash>) -> ChecksumResult<()> {
        let sidecar_path = sidecar::sidecar_path(path)?;
        if !self.policy.write_cache {
            return Ok(());
        }

        let digest = match digest {
            Some(digest) => digest,
            None => {
                if !exists(path).await? {
                    return Ok(());
                }
                self.compute_digest(path).await?
            }
        };

        self.remove_record(path).await?;

        let record = ChecksumRecord::for_file(digest, path)?;
        fs::write(&sidecar_path, record.to_line())
            .await
            .map_err(|source| ChecksumError::Io {
                path: sidecar_path.clone(),
                source,
            })?;

        debug!("Wrote sidecar {}", sidecar_path.display());
        Ok(())
    }

    /// Cached digest of `path`, if a trusted sidecar exists
    ///
    /// Returns `Ok(None)` when sidecar reads are disabled, the sidecar is
    /// missing or unreadable, or no line in it refers to the file's current
    /// base name.
    pub async fn read_record(&self, path: &Path) -> ChecksumResult<Option<Md5Hash>> {
        let sidecar_path = sidecar::sidecar_path(path)?;
        let file_name = sidecar::base_name(path)?;
        if !self.policy.read_cache {
            return Ok(None);
        }

        let contents = match fs::read(&sidecar_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(
                    "Ignoring unreadable sidecar {}: {}",
                    sidecar_path.display(),
                    e
                );
                return Ok(None);
            }
        };

        let digest = sidecar::find_trusted(&String::from_utf8_lossy(&contents), &file_name);
        if digest.is_none() {
            warn!(
                "Sidecar {} does not describe {}; ignoring it",
                sidecar_path.display(),
                file_name
            );
        }
        Ok(digest)
    }

    /// Delete the sidecar of `path`; a missing sidecar is not an error
    pub async fn remove_record(&self, path: &Path) -> ChecksumResult<()> {
        let sidecar_path = sidecar::sidecar_path(path)?;
        match fs::remove_file(&sidecar_path).await {
            Ok(()) => {
                debug!("Removed sidecar {}", sidecar_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ChecksumError::Io {
                path: sidecar_path,
                source,
            }),
        }
    }

    /// Whether `path` hashes to `expected`
    ///
    /// A missing file never verifies. Without a trusted sidecar this hashes
    /// the whole file.
    pub async fn verify(&self, path: &Path, expected: &Md5Hash) -> ChecksumResult<bool> {
        Ok(self.digest_of(path).await?.as_ref() == Some(expected))
    }
}

async fn exists(path: &Path) -> ChecksumResult<bool> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ChecksumError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::EventKind;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn store_with(policy: ChecksumPolicy) -> ChecksumStore {
        ChecksumStore::new(policy, Arc::new(ProgressBus::new()))
    }

    async fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_file_has_no_digest() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(ChecksumPolicy::default());

        let digest = store
            .digest_of(&temp_dir.path().join("absent.bin"))
            .await
            .unwrap();
        assert!(digest.is_none());
        assert_eq!(store.computations(), 0);
    }

    #[tokio::test]
    async fn test_digest_is_cached_in_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "game.zip", b"hello").await;
        let store = store_with(ChecksumPolicy::default());

        let first = store.digest_of(&path).await.unwrap();
        let second = store.digest_of(&path).await.unwrap();

        assert_eq!(first, Some(Md5Hash::of(b"hello")));
        assert_eq!(first, second);
        assert_eq!(store.computations(), 1);

        let sidecar = fs::read_to_string(temp_dir.path().join("game.zip.md5"))
            .await
            .unwrap();
        assert_eq!(sidecar, "5d41402abc4b2a76b9719d911017c592 *game.zip\n");
    }

    #[tokio::test]
    async fn test_force_recompute_ignores_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "game.zip", b"hello").await;
        let store = store_with(ChecksumPolicy::default().with_force_recompute(true));

        store.digest_of(&path).await.unwrap();
        store.digest_of(&path).await.unwrap();
        assert_eq!(store.computations(), 2);
    }

    #[tokio::test]
    async fn test_write_cache_disabled_leaves_no_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "game.zip", b"hello").await;
        let store = store_with(ChecksumPolicy::default().with_cache(true, false));

        store.digest_of(&path).await.unwrap();
        assert!(!temp_dir.path().join("game.zip.md5").exists());
    }

    #[tokio::test]
    async fn test_read_cache_disabled_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "game.zip", b"hello").await;
        let writer = store_with(ChecksumPolicy::default());
        writer.write_record(&path, None).await.unwrap();

        let reader = store_with(ChecksumPolicy::default().with_cache(false, true));
        assert!(reader.read_record(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_record_without_digest_computes_it() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "book.pdf", b"pages").await;
        let store = store_with(ChecksumPolicy::default());

        store.write_record(&path, None).await.unwrap();
        assert_eq!(store.computations(), 1);
        assert_eq!(
            store.read_record(&path).await.unwrap(),
            Some(Md5Hash::of(b"pages"))
        );
    }

    #[tokio::test]
    async fn test_write_record_replaces_stale_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "book.pdf", b"pages").await;
        fs::write(
            temp_dir.path().join("book.pdf.md5"),
            "00000000000000000000000000000000 *book.pdf\nextra\n",
        )
        .await
        .unwrap();

        let store = store_with(ChecksumPolicy::default());
        let digest = Md5Hash::of(b"pages");
        store.write_record(&path, Some(digest)).await.unwrap();

        let sidecar = fs::read_to_string(temp_dir.path().join("book.pdf.md5"))
            .await
            .unwrap();
        assert_eq!(sidecar, format!("{} *book.pdf\n", digest));
    }

    #[tokio::test]
    async fn test_sidecar_for_other_file_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "new-name.zip", b"hello").await;
        fs::write(
            temp_dir.path().join("new-name.zip.md5"),
            "00000000000000000000000000000000 *old-name.zip\n",
        )
        .await
        .unwrap();

        let store = store_with(ChecksumPolicy::default());
        assert!(store.read_record(&path).await.unwrap().is_none());
        assert_eq!(
            store.digest_of(&path).await.unwrap(),
            Some(Md5Hash::of(b"hello"))
        );
        assert_eq!(store.computations(), 1);
    }

    #[tokio::test]
    async fn test_remove_record_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "game.zip", b"hello").await;
        let store = store_with(ChecksumPolicy::default());

        store.remove_record(&path).await.unwrap();
        store.write_record(&path, None).await.unwrap();
        store.remove_record(&path).await.unwrap();
        store.remove_record(&path).await.unwrap();
        assert!(store.read_record(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_path_is_rejected() {
        let store = store_with(ChecksumPolicy::default());
        for result in [
            store.read_record(Path::new("")).await.map(|_| ()),
            store.remove_record(Path::new("")).await,
            store.write_record(Path::new(""), None).await,
            store.digest_of(Path::new("")).await.map(|_| ()),
        ] {
            assert!(matches!(result, Err(ChecksumError::InvalidPath { .. })));
        }
    }

    #[tokio::test]
    async fn test_verify() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "game.zip", b"hello").await;
        let store = store_with(ChecksumPolicy::default());

        assert!(store.verify(&path, &Md5Hash::of(b"hello")).await.unwrap());
        assert!(!store.verify(&path, &Md5Hash::of(b"other")).await.unwrap());
        assert!(!store
            .verify(&temp_dir.path().join("absent"), &Md5Hash::of(b""))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_hash_events_bracket_progress() {
        let temp_dir = TempDir::new().unwrap();
        let content = vec![7u8; 1000];
        let path = write_file(&temp_dir, "blob.bin", &content).await;

        let events = Arc::new(Mutex::new(Vec::new()));
        let mut bus = ProgressBus::new();
        for kind in [
            EventKind::HashStarted,
            EventKind::HashFinished,
            EventKind::Progress,
        ] {
            let sink = Arc::clone(&events);
            bus.subscribe(kind, move |event| sink.lock().unwrap().push(event.clone()));
        }

        let policy = ChecksumPolicy::default().with_block_size(100);
        let store = ChecksumStore::new(policy, Arc::new(bus));
        store.compute_digest(&path).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 12);
        assert!(matches!(events[0], ProgressEvent::HashStarted { total_bytes: 1000, .. }));
        assert_eq!(events[1], ProgressEvent::Progress { percent: 10 });
        assert_eq!(events[10], ProgressEvent::Progress { percent: 100 });
        assert!(matches!(events[11], ProgressEvent::HashFinished { .. }));
    }
}
