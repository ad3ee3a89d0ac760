//! Checksum policy flags
//!
//! These flags replace process-wide mutable settings: every [`ChecksumStore`]
//! receives its own copy at construction.
//!
//! [`ChecksumStore`]: super::ChecksumStore

use serde::{Deserialize, Serialize};

use crate::constants::checksum;

/// Policy flags consumed by the checksum store and integrity checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumPolicy {
    /// Trust an existing sidecar instead of reading file content
    pub read_cache: bool,
    /// Persist freshly computed digests to a sidecar
    pub write_cache: bool,
    /// Always hash file content, even when a trusted sidecar exists
    pub force_recompute: bool,
    /// Accept a file on size alone
    pub ignore_checksum: bool,
    /// Read size used while hashing
    pub block_size: usize,
}

impl Default for ChecksumPolicy {
    fn default() -> Self {
        Self {
            read_cache: true,
            write_cache: true,
            force_recompute: false,
            ignore_checksum: false,
            block_size: checksum::DEFAULT_BLOCK_SIZE,
        }
    }
}

impl ChecksumPolicy {
    /// Set the hashing block size; zero falls back to the default
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = if block_size == 0 {
            checksum::DEFAULT_BLOCK_SIZE
        } else {
            block_size
        };
        self
    }

    pub fn with_ignore_checksum(mut self, ignore: bool) -> Self {
        self.ignore_checksum = ignore;
        self
    }

    pub fn with_force_recompute(mut self, force: bool) -> Self {
        self.force_recompute = force;
        self
    }

    /// Enable or disable both sidecar reads and writes
    pub fn with_cache(mut self, read: bool, write: bool) -> Self {
        self.read_cache = read;
        self.write_cache = write;
        self
    }

    /// Whether a sidecar may short-circuit hashing
    pub fn uses_cached_digest(&self) -> bool {
        self.read_cache && !self.force_recompute
    }
}
