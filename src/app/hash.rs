//! Compact MD5 digest type
//!
//! Digests arrive as hex strings (catalog JSON, sidecar files) and are compared
//! many times during a run. `Md5Hash` keeps them as 16 raw bytes and converts
//! back to lowercase hex for display, serialization and sidecar output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::checksum::HEX_DIGEST_LENGTH;
use crate::errors::{ChecksumError, ChecksumResult};

/// MD5 digest stored as its raw 16-byte representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Hash([u8; 16]);

impl Md5Hash {
    /// Parse a digest from a hex string
    ///
    /// # Arguments
    ///
    /// * `hex` - 32-character hexadecimal string (case insensitive)
    ///
    /// # Errors
    ///
    /// Returns `ChecksumError::InvalidDigest` if the string has the wrong length
    /// or contains a non-hex character.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hb_fetcher::app::Md5Hash;
    ///
    /// let hash = Md5Hash::from_hex("D41D8CD98F00B204E9800998ECF8427E")?;
    /// assert_eq!(hash.to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
    /// # Ok::<(), hb_fetcher::errors::ChecksumError>(())
    /// ```
    pub fn from_hex(hex: &str) -> ChecksumResult<Self> {
        let invalid = || ChecksumError::InvalidDigest {
            digest: hex.to_string(),
        };

        if hex.len() != HEX_DIGEST_LENGTH || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut bytes = [0u8; 16];
        for (i, pair) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }

        Ok(Md5Hash(bytes))
    }

    /// Lowercase 32-character hex representation
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        self.0.iter().fold(String::with_capacity(32), |mut acc, b| {
            let _ = write!(&mut acc, "{:02x}", b);
            acc
        })
    }

    /// Digest of an in-memory buffer
    pub fn of(data: impl AsRef<[u8]>) -> Self {
        Self::from(md5::compute(data))
    }

    /// Raw byte representation
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Md5Hash(bytes)
    }
}

impl From<md5::Digest> for Md5Hash {
    fn from(digest: md5::Digest) -> Self {
        Md5Hash(digest.0)
    }
}

impl fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Md5Hash {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Serialize as hex so catalog JSON and config stay human-readable
impl Serialize for Md5Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Md5Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_string = String::deserialize(deserializer)?;
        Self::from_hex(&hex_string).map_err(serde::de::Error::custom)
    }
}
