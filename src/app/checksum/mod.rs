//! Content checksums with a sidecar cache
//!
//! Hashing a multi-gigabyte download takes far longer than stat'ing it, so
//! every digest computed here is stored in a `<file>.md5` sidecar compatible
//! with `md5sum`. Later runs reuse the sidecar while its recorded name still
//! matches the content file.
//!
//! # Module Organization
//!
//! - [`config`] - Policy flags (cache read/write, forced recompute, block size)
//! - [`sidecar`] - Sidecar naming and line format
//! - [`store`] - The [`ChecksumStore`] itself

pub mod config;
pub mod sidecar;
pub mod store;

pub use config::ChecksumPolicy;
pub use sidecar::{sidecar_path, ChecksumRecord};
pub use store::ChecksumStore;
