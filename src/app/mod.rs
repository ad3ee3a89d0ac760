//! Core application logic for HB Fetcher
//!
//! This module contains the download engine: catalog access, the checksum
//! cache, integrity classification, resumable transfers and the planner that
//! drives them.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hb_fetcher::app::{
//!     ChecksumPolicy, ChecksumStore, ClientConfig, DownloadPlanner, HttpHandler,
//!     HumbleCatalog, IntegrityChecker, PlannerConfig, ProgressBus, ResumableFetcher,
//!     TransferPolicy,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client_config = ClientConfig::default();
//! let transfer = TransferPolicy::default();
//! let bus = Arc::new(ProgressBus::new());
//!
//! let catalog = HumbleCatalog::new(&client_config, &transfer, "session-cookie")?;
//! let store = Arc::new(ChecksumStore::new(ChecksumPolicy::default(), bus.clone()));
//! let http = HttpHandler::new(
//!     client_config.build_http_client()?,
//!     transfer.max_attempts,
//!     transfer.retry_base_delay,
//! );
//! let fetcher = ResumableFetcher::new(http, store.clone(), bus.clone(), transfer);
//!
//! let planner = DownloadPlanner::new(
//!     catalog,
//!     IntegrityChecker::new(store),
//!     fetcher,
//!     bus,
//!     PlannerConfig::new("/data/humble"),
//! );
//! let summary = planner.run().await?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod checksum;
pub mod client;
pub mod events;
pub mod hash;
pub mod integrity;
pub mod models;
pub mod planner;

// Re-export main public API
pub use catalog::{Catalog, CatalogEntry, HumbleCatalog, Order};
pub use checksum::{ChecksumPolicy, ChecksumRecord, ChecksumStore};
pub use client::{
    ClientConfig, FetchOutcome, HttpHandler, ResumableFetcher, ShutdownSignal, ShutdownTrigger,
    SignalHandler, TransferPolicy, create_shutdown_channel,
};
pub use events::{DecileThrottle, EventKind, ProgressBus, ProgressEvent};
pub use hash::Md5Hash;
pub use integrity::{FetchReason, IntegrityChecker, Verdict};
pub use models::{LocalFileState, PlatformSelection, RemoteFileDescriptor};
pub use planner::{DownloadPlanner, ItemOutcome, ItemReport, Plan, PlannerConfig, RunSummary};
