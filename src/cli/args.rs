//! Command-line argument parsing for HB Fetcher
//!
//! This module defines the CLI structure using clap derive macros. Running
//! without a subcommand downloads everything the configuration selects.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;
use crate::constants::platforms;

/// HB Fetcher - Download and verify a Humble Bundle library
#[derive(Parser, Debug)]
#[command(
    name = "hb_fetcher",
    version,
    about = "Download a Humble Bundle library with checksum caching and resumable transfers",
    long_about = "Mirrors the files of a Humble Bundle account into a local directory.
Files already on disk are verified by size and MD5 (cached in .md5 sidecar files),
partial files are resumed with HTTP range requests."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands (defaults to downloading)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the local library
    #[arg(long, global = true, value_name = "DIR")]
    pub download_location: Option<PathBuf>,

    /// Block size used when hashing files
    #[arg(long, global = true, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Value of the _simpleauth_sess cookie
    #[arg(long, global = true, value_name = "VALUE")]
    pub cookie: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Download missing or damaged files
    Download(DownloadArgs),

    /// Print the library as a tab-separated tree
    List(ListArgs),

    /// Check local files without downloading
    Verify(VerifyArgs),

    /// Manage the session cookie
    Auth(AuthArgs),
}

/// Kind of library item to restrict a command to
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    /// Games, optionally restricted to some platforms
    Games {
        /// Platforms to include
        #[arg(long, num_args = 1.., value_parser = ["linux", "mac", "windows", "android", "asmjs"])]
        platform: Vec<String>,
    },
    /// Ebooks
    Ebooks,
    /// Audio (soundtracks and audiobooks)
    Audio,
}

impl ItemType {
    /// Platforms enabled by this selection; every other platform is disabled
    pub fn platforms(&self) -> Vec<String> {
        let names: &[&str] = match self {
            ItemType::Games { platform } if !platform.is_empty() => {
                return platform.clone();
            }
            ItemType::Games { .. } => platforms::GAMES,
            ItemType::Ebooks => platforms::EBOOKS,
            ItemType::Audio => platforms::AUDIO,
        };
        names.iter().map(|name| name.to_string()).collect()
    }
}

/// Arguments for the download command
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Restrict the run to one kind of item
    #[command(subcommand)]
    pub item_type: Option<ItemType>,

    /// Show what would be downloaded without downloading
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Only process these order keys
    #[arg(long, global = true, num_args = 1.., value_name = "KEY")]
    pub keys: Vec<String>,

    /// Trust sizes and skip MD5 verification
    #[arg(long, global = true)]
    pub ignore_checksum: bool,

    /// Hash every file even when a sidecar exists
    #[arg(long, global = true)]
    pub force_recompute: bool,

    /// Restart partial files from scratch
    #[arg(long, global = true)]
    pub no_resume: bool,
}

/// Arguments for the list command
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Restrict the listing to one kind of item
    #[command(subcommand)]
    pub item_type: Option<ItemType>,

    /// Print download URLs (they expire after a while)
    #[arg(short = 'u', long, global = true)]
    pub print_url: bool,

    /// Only list these order keys
    #[arg(long, global = true, num_args = 1.., value_name = "KEY")]
    pub keys: Vec<String>,
}

/// Arguments for the verify command
#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Only verify these order keys
    #[arg(long, num_args = 1.., value_name = "KEY")]
    pub keys: Vec<String>,

    /// Hash every file even when a sidecar exists
    #[arg(long)]
    pub force_recompute: bool,
}

/// Arguments for authentication management
#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub action: AuthAction,
}

/// Authentication actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// Store the session cookie in .env
    Setup,

    /// Show where the session cookie comes from and test it
    Status,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Explicit log level from the verbosity flags, if any was given
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}

impl GlobalArgs {
    /// Config overrides carried by the global flags
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            download_location: self.download_location.clone(),
            block_size: self.chunk_size,
            session_cookie: self.cookie.clone(),
            platforms: None,
        }
    }
}

/// Keys filter: `None` means the whole library
pub fn key_filter(keys: &[String]) -> Option<Vec<String>> {
    (!keys.is_empty()).then(|| keys.to_vec())
}
