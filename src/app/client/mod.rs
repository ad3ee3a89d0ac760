//! HTTP transport and resumable file transfers
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: GET requests with rate limiting, retries and backoff
//! - `fetcher`: resumable streaming of catalog files to disk
//! - `signals`: Ctrl+C / SIGTERM handling for cancelling transfers

pub mod config;
pub mod fetcher;
pub mod http;
pub mod signals;

pub use config::ClientConfig;
pub use fetcher::{FetchOutcome, ResumableFetcher, TransferPolicy, TransferState};
pub use http::{backoff_delay, backoff_with_jitter, HttpHandler};
pub use signals::{create_shutdown_channel, ShutdownSignal, ShutdownTrigger, SignalHandler};
