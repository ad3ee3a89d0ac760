//! Prelude module for HB Fetcher Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use hb_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hb_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bus = Arc::new(ProgressBus::new());
//!     let store = Arc::new(ChecksumStore::new(ChecksumPolicy::default(), bus));
//!     let checker = IntegrityChecker::new(store);
//!
//!     // Continue with catalog and fetcher setup...
//!     # let _ = checker;
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Engine components
pub use crate::app::{
    Catalog, ChecksumPolicy, ChecksumStore, ClientConfig, DownloadPlanner, FetchReason,
    HttpHandler, HumbleCatalog, IntegrityChecker, ItemOutcome, Md5Hash, PlannerConfig,
    PlatformSelection, ProgressBus, ProgressEvent, RemoteFileDescriptor, ResumableFetcher,
    RunSummary, TransferPolicy, Verdict, create_shutdown_channel,
};

// Configuration and authentication
pub use crate::auth::resolve_session_cookie;
pub use crate::config::AppConfig;

// Commonly used constants
pub use crate::constants::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_ATTEMPTS, ENV_SESSION_COOKIE};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        let _policy = ChecksumPolicy::default();
        let _transfer = TransferPolicy::default();
        let _client_config = ClientConfig::default();
        let _config = AppConfig::default();

        assert_eq!(DEFAULT_BLOCK_SIZE, 8_192_000);
        assert_eq!(ENV_SESSION_COOKIE, "HB_SESSION_COOKIE");
    }

    #[tokio::test]
    async fn test_prelude_integration_pattern() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let bus = Arc::new(ProgressBus::new());
        let store = Arc::new(ChecksumStore::new(ChecksumPolicy::default(), bus));
        let checker = IntegrityChecker::new(store);

        let descriptor = RemoteFileDescriptor {
            order_key: "KEY".to_string(),
            url: "https://dl.example/file.bin".to_string(),
            expected_size: 4,
            expected_checksum: Md5Hash::of(b"data"),
            logical_path: PathBuf::from("game/linux/file.bin"),
            platform: "linux".to_string(),
            product_name: "Game".to_string(),
            human_size: "4 B".to_string(),
        };
        let destination = descriptor.local_path(temp_dir.path());

        let verdict = checker.classify(&descriptor, &destination).await.unwrap();
        assert_eq!(verdict, Verdict::NeedsFetch(FetchReason::Missing));
    }
}
