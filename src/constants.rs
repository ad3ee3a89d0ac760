//! Application constants for hb_fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Environment variable holding the `_simpleauth_sess` cookie value
    pub const SESSION_COOKIE: &str = "HB_SESSION_COOKIE";
}

/// Authentication and credential-related constants
pub mod auth {
    /// Name of the Humble Bundle session cookie
    pub const SESSION_COOKIE_NAME: &str = "_simpleauth_sess";

    /// Minimum plausible cookie length
    pub const MIN_COOKIE_LENGTH: usize = 16;

    /// File permissions for .env file (Unix only) - owner read/write only
    #[cfg(unix)]
    pub const ENV_FILE_PERMISSIONS: u32 = 0o600;
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for file downloads
    pub const USER_AGENT: &str = concat!("hb_fetcher/", env!("CARGO_PKG_VERSION"));

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// TCP keep-alive interval
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default rate limit for catalog requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 5;

    /// Default number of attempts per file transfer
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    /// Maximum backoff delay (seconds)
    pub const MAX_BACKOFF_SECS: u64 = 60;

    /// Upper bound on random jitter added to each backoff (milliseconds)
    pub const MAX_JITTER_MS: u64 = 250;
}

/// Humble Bundle catalog endpoints and request defaults
pub mod catalog {
    use super::Duration;

    /// Catalog base URL
    pub const BASE_URL: &str = "https://www.humblebundle.com";

    /// Path listing every order key owned by the account
    pub const ORDER_LIST_PATH: &str = "/api/v1/user/order";

    /// Path prefix of a single order; the key is appended
    pub const ORDER_PATH_PREFIX: &str = "/api/v1/order/";

    /// Per-request deadline for catalog calls
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// User agent the catalog API expects
    pub const USER_AGENT: &str = "Apache-HttpClient/UNAVAILABLE (java 1.4)";

    /// Value of the X-Requested-By header
    pub const REQUESTED_BY: &str = "hb_android_app";

    /// `error_id` value signalling an expired or missing session
    pub const LOGIN_REQUIRED_ERROR: &str = "login_required";
}

/// Checksum and sidecar constants
pub mod checksum {
    /// Default block size used when hashing files (~8 MB)
    pub const DEFAULT_BLOCK_SIZE: usize = 8_192_000;

    /// Extension appended to a content file to name its sidecar
    pub const SIDECAR_EXTENSION: &str = "md5";

    /// Length of a hex-encoded MD5 digest
    pub const HEX_DIGEST_LENGTH: usize = 32;
}

/// Platform names used by the catalog
pub mod platforms {
    /// Platforms selected by the `games` item type
    pub const GAMES: &[&str] = &["android", "asmjs", "linux", "mac", "windows"];

    /// Platforms selected by the `ebooks` item type
    pub const EBOOKS: &[&str] = &["ebook"];

    /// Platforms selected by the `audio` item type
    pub const AUDIO: &[&str] = &["audio"];

    /// Default platform selection (name, enabled)
    pub const DEFAULTS: &[(&str, bool)] = &[
        ("audio", true),
        ("ebook", true),
        ("windows", true),
        ("mac", true),
        ("linux", true),
        ("android", true),
        ("asmjs", false),
    ];
}

/// Progress reporting constants
pub mod progress {
    /// Width of one throttling band, in percent
    pub const DECILE_STEP: u8 = 10;

    /// Spinner/bar refresh rate for the console reporter
    pub const TICK_INTERVAL_MS: u64 = 120;
}

/// Configuration file locations
pub mod config {
    /// Project-local configuration file
    pub const LOCAL_CONFIG_FILE: &str = "hb-fetcher.toml";

    /// Directory under the user config dir
    pub const APP_CONFIG_DIR: &str = "hb-fetcher";

    /// File name inside the user config dir
    pub const APP_CONFIG_FILE: &str = "config.toml";
}

/// Logging and debugging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

// Re-export commonly used constants for convenience
pub use catalog::BASE_URL as CATALOG_BASE_URL;
pub use checksum::DEFAULT_BLOCK_SIZE;
pub use env::SESSION_COOKIE as ENV_SESSION_COOKIE;
pub use http::USER_AGENT;
pub use limits::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_RPS, RETRY_BASE_DELAY_MS};
