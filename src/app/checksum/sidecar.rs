//! Sidecar checksum file format
//!
//! A sidecar lives at `<content path>.md5` and holds a single line in the
//! format written by `md5sum --binary`:
//!
//! ```text
//! d41d8cd98f00b204e9800998ecf8427e *empty.bin
//! ```
//!
//! Text-mode lines (`<digest>  <name>`) written by other tools are accepted
//! when reading. A record is only trusted when the name it references is the
//! content file's current base name.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::app::hash::Md5Hash;
use crate::constants::checksum::SIDECAR_EXTENSION;
use crate::errors::{ChecksumError, ChecksumResult};

/// One parsed sidecar line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub digest: Md5Hash,
    pub referenced_filename: String,
}

impl ChecksumRecord {
    /// Record for the content file at `path`
    ///
    /// # Errors
    ///
    /// Returns `ChecksumError::InvalidPath` if `path` has no file name.
    pub fn for_file(digest: Md5Hash, path: &Path) -> ChecksumResult<Self> {
        Ok(Self {
            digest,
            referenced_filename: base_name(path)?,
        })
    }

    /// Render the sidecar line, including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{} *{}\n", self.digest, self.referenced_filename)
    }

    /// Parse one line; returns `None` for anything malformed
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (hex, rest) = line.split_once(' ')?;
        let digest = Md5Hash::from_hex(hex).ok()?;

        // '*' marks binary mode, a second space marks text mode
        let name = rest.strip_prefix('*').or_else(|| rest.strip_prefix(' '))?;
        if name.is_empty() {
            return None;
        }

        Some(Self {
            digest,
            referenced_filename: name.to_string(),
        })
    }

    /// Whether this record describes a file called `file_name`
    pub fn refers_to(&self, file_name: &str) -> bool {
        self.referenced_filename == file_name
    }
}

/// Path of the sidecar belonging to `path`
///
/// # Errors
///
/// An empty path, or one without a file name component, is a caller bug and
/// yields `ChecksumError::InvalidPath`.
pub fn sidecar_path(path: &Path) -> ChecksumResult<PathBuf> {
    base_name(path)?;
    let mut sidecar = OsString::from(path.as_os_str());
    sidecar.push(".");
    sidecar.push(SIDECAR_EXTENSION);
    Ok(PathBuf::from(sidecar))
}

/// Base name of `path` as used inside sidecar records
pub fn base_name(path: &Path) -> ChecksumResult<String> {
    if path.as_os_str().is_empty() {
        return Err(ChecksumError::InvalidPath {
            path: path.to_path_buf(),
        });
    }
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ChecksumError::InvalidPath {
            path: path.to_path_buf(),
        })
}

/// First record in `contents` that refers to `file_name`
pub fn find_trusted(contents: &str, file_name: &str) -> Option<Md5Hash> {
    contents
        .lines()
        .filter_map(ChecksumRecord::parse_line)
        .find(|record| record.refers_to(file_name))
        .map(|record| record.digest)
}
