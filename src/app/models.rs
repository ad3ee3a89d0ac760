//! Data models shared by the verification and transfer components
//!
//! [`RemoteFileDescriptor`] is the immutable description of one catalog file.
//! [`LocalFileState`] is a point-in-time read of the filesystem and is never
//! cached between planning and fetching. [`PlatformSelection`] decides which
//! catalog platforms take part in a run.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::app::hash::Md5Hash;
use crate::constants::platforms;

/// One downloadable file as described by the catalog
///
/// Descriptors are created once per catalog entry and never mutated; a
/// refreshed download URL produces a new descriptor via [`with_url`].
///
/// [`with_url`]: RemoteFileDescriptor::with_url
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileDescriptor {
    /// Order the file belongs to, used to refresh expiring URLs
    pub order_key: String,
    /// Authoritative download location (may expire)
    pub url: String,
    /// Authoritative size in bytes
    pub expected_size: u64,
    /// Authoritative MD5 digest
    pub expected_checksum: Md5Hash,
    /// `<product>/<platform>/<file name>` relative to the download root
    pub logical_path: PathBuf,
    /// Catalog platform (windows, ebook, audio, ...)
    pub platform: String,
    /// Human readable product name for reports
    pub product_name: String,
    /// Human readable size as shown by the catalog
    pub human_size: String,
}

impl RemoteFileDescriptor {
    /// Location of the local copy under `download_root`
    pub fn local_path(&self, download_root: &Path) -> PathBuf {
        download_root.join(&self.logical_path)
    }

    /// Base name of the content file
    pub fn file_name(&self) -> String {
        self.logical_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Copy of this descriptor pointing at a re-issued URL
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for RemoteFileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes, md5 {})",
            self.logical_path.display(),
            self.expected_size,
            self.expected_checksum
        )
    }
}

/// Snapshot of a local content file
///
/// The digest is not part of the snapshot; it is computed lazily by the
/// checksum store only when the size check passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalFileState {
    pub exists: bool,
    pub size_on_disk: u64,
}

impl LocalFileState {
    /// Stat `path` now
    ///
    /// A missing file is reported as `exists == false`; any other I/O error is
    /// returned to the caller.
    pub async fn inspect(path: &Path) -> io::Result<Self> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(Self {
                exists: true,
                size_on_disk: metadata.len(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

/// Which catalog platforms are downloaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformSelection {
    enabled: BTreeMap<String, bool>,
}

impl Default for PlatformSelection {
    fn default() -> Self {
        Self {
            enabled: platforms::DEFAULTS
                .iter()
                .map(|(name, on)| (name.to_string(), *on))
                .collect(),
        }
    }
}

impl PlatformSelection {
    /// Build from explicit `(platform, enabled)` pairs
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        Self {
            enabled: pairs
                .into_iter()
                .map(|(name, on)| (name.into().to_lowercase(), on))
                .collect(),
        }
    }

    /// Enable exactly `selected` and disable every other known platform
    pub fn only<S: AsRef<str>>(&self, selected: &[S]) -> Self {
        let mut enabled: BTreeMap<String, bool> =
            self.enabled.keys().map(|name| (name.clone(), false)).collect();
        for name in selected {
            enabled.insert(name.as_ref().to_lowercase(), true);
        }
        Self { enabled }
    }

    /// Whether files for `platform` should be considered
    ///
    /// Platforms that are not listed at all are skipped.
    pub fn is_enabled(&self, platform: &str) -> bool {
        self.enabled
            .get(&platform.to_lowercase())
            .copied()
            .unwrap_or(false)
    }

    /// Names of enabled platforms, sorted
    pub fn enabled_platforms(&self) -> Vec<&str> {
        self.enabled
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor() -> RemoteFileDescriptor {
        RemoteFileDescriptor {
            order_key: "ABC123".to_string(),
            url: "https://dl.example.com/game.zip?t=1".to_string(),
            expected_size: 1024,
            expected_checksum: Md5Hash::of(b"content"),
            logical_path: PathBuf::from("game/windows/game.zip"),
            platform: "windows".to_string(),
            product_name: "Game".to_string(),
            human_size: "1 KB".to_string(),
        }
    }

    #[test]
    fn test_descriptor_paths() {
        let descriptor = descriptor();
        assert_eq!(
            descriptor.local_path(Path::new("/data")),
            PathBuf::from("/data/game/windows/game.zip")
        );
        assert_eq!(descriptor.file_name(), "game.zip");
    }

    #[test]
    fn test_with_url_keeps_everything_else() {
        let original = descriptor();
        let refreshed = original.with_url("https://dl.example.com/game.zip?t=2");
        assert_eq!(refreshed.url, "https://dl.example.com/game.zip?t=2");
        assert_eq!(refreshed.expected_checksum, original.expected_checksum);
        assert_eq!(refreshed.logical_path, original.logical_path);
        assert_ne!(refreshed, original);
    }

    #[tokio::test]
    async fn test_inspect_missing_and_present() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file.bin");

        let state = LocalFileState::inspect(&path).await.unwrap();
        assert!(!state.exists);
        assert_eq!(state.size_on_disk, 0);

        fs::write(&path, b"12345").await.unwrap();
        let state = LocalFileState::inspect(&path).await.unwrap();
        assert!(state.exists);
        assert_eq!(state.size_on_disk, 5);
    }

    #[test]
    fn test_default_platforms() {
        let selection = PlatformSelection::default();
        assert!(selection.is_enabled("windows"));
        assert!(selection.is_enabled("EBOOK"));
        assert!(!selection.is_enabled("asmjs"));
        assert!(!selection.is_enabled("unknown"));
    }

    #[test]
    fn test_only_disables_other_platforms() {
        let selection = PlatformSelection::default().only(&["linux", "asmjs"]);
        assert!(selection.is_enabled("linux"));
        assert!(selection.is_enabled("asmjs"));
        assert!(!selection.is_enabled("windows"));
        assert!(!selection.is_enabled("ebook"));
        assert_eq!(selection.enabled_platforms(), vec!["asmjs", "linux"]);
    }
}
