//! Command-line interface components
//!
//! This module contains CLI-specific code for the HB Fetcher application,
//! including argument parsing, progress display, and the command handlers.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    AuthAction, AuthArgs, Cli, Commands, DownloadArgs, GlobalArgs, ItemType, ListArgs, VerifyArgs,
};
pub use commands::{format_order_listing, handle_auth, handle_download, handle_list, handle_verify};
pub use progress::{ConsoleReporter, ProgressConfig};
