//! Error types for hb_fetcher
//!
//! This module defines the error types for every component of the application.
//! Errors are designed to be actionable: each variant carries enough context
//! (paths, sizes, digests, HTTP status) to diagnose a failure from the log alone.

use std::path::PathBuf;
use thiserror::Error;

/// Session cookie and credential errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// No session cookie could be found in any source
    #[error(
        "Missing Humble Bundle session cookie. Pass --cookie, set session_cookie in the config, set HB_SESSION_COOKIE or run 'auth setup'"
    )]
    MissingSessionCookie,

    /// Cookie value failed validation
    #[error("Invalid session cookie: {reason}")]
    InvalidCookie { reason: String },

    /// File I/O error during credential storage
    #[error("Failed to save credentials to file")]
    CredentialStorage(#[from] std::io::Error),

    /// Permission error on credential file
    #[error("Permission denied accessing credential file: {path}")]
    PermissionDenied { path: PathBuf },
}

/// Catalog (order metadata) errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The session is missing or no longer accepted by the server
    #[error("Authentication required: {message}")]
    AuthenticationRequired { message: String },

    /// The order key is unknown to the server
    #[error("Order not found: {key}")]
    OrderNotFound { key: String },

    /// HTTP transport failure talking to the catalog
    #[error("Catalog HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// The response body was not the JSON we expected
    #[error("Catalog response could not be parsed")]
    Parse(#[from] serde_json::Error),

    /// The server reported an error in an otherwise well-formed response
    #[error("Catalog rejected the request: {message}")]
    Response { message: String },

    /// Server returned an unexpected status
    #[error("Catalog server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Invalid URL built for a catalog endpoint
    #[error("Invalid catalog URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Rate limiter could not be configured
    #[error("Invalid catalog rate limit: {reason}")]
    RateLimit { reason: String },
}

/// Checksum computation and sidecar errors
#[derive(Error, Debug)]
pub enum ChecksumError {
    /// Empty or otherwise unusable path passed to sidecar naming
    #[error("Invalid path for checksum sidecar: '{path}'")]
    InvalidPath { path: PathBuf },

    /// String is not a 32-character hex MD5 digest
    #[error("Invalid digest: '{digest}'. Expected MD5 hex string")]
    InvalidDigest { digest: String },

    /// I/O failure reading content or reading/writing a sidecar
    #[error("Checksum I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Download and HTTP transfer errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request error (connect, TLS, body stream)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Destination directory could not be created
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Server returned error status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Server overloaded
    #[error("Server overloaded. Server responded with HTTP 503")]
    ServerOverloaded,

    /// Server answered a ranged request with a range we did not ask for
    #[error("Unexpected range response: requested offset {requested}, got '{content_range}'")]
    RangeMismatch {
        requested: u64,
        content_range: String,
    },

    /// File size mismatch
    #[error("File size mismatch. Expected: {expected} bytes, got: {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Transfer ended before the expected size was reached
    #[error("Incomplete download: received {received} bytes, expected {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// Fetched bytes do not hash to the catalog digest
    #[error("File hash mismatch. Expected: {expected}, got: {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Maximum retries exceeded
    #[error("Maximum retry attempts ({max_retries}) exceeded for download")]
    MaxRetriesExceeded { max_retries: u32 },

    /// Transfer stopped by a shutdown request
    #[error("Download cancelled")]
    Cancelled,

    /// Checksum store failure during a transfer
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

impl DownloadError {
    /// Whether another attempt at the same item may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Http(e) => !e.is_builder() && !e.is_redirect(),
            DownloadError::Io(_)
            | DownloadError::RateLimitExceeded
            | DownloadError::ServerOverloaded
            | DownloadError::IncompleteDownload { .. }
            | DownloadError::RangeMismatch { .. } => true,
            DownloadError::ServerError { status } => *status >= 500,
            _ => false,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Configuration could not be serialized")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<String> },
}

/// Progress reporting errors
#[derive(Error, Debug)]
pub enum ProgressError {
    /// Progress bar template rejected by indicatif
    #[error("Invalid progress template: {reason}")]
    Template { reason: String },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Catalog error
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Checksum error
    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Progress error
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(e) => e.is_retryable(),
            AppError::Catalog(CatalogError::Http(_))
            | AppError::Catalog(CatalogError::ServerError { .. }) => true,

            AppError::Auth(_)
            | AppError::Catalog(CatalogError::AuthenticationRequired { .. })
            | AppError::Checksum(ChecksumError::InvalidPath { .. })
            | AppError::Config(_) => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "authentication",
            AppError::Catalog(_) => "catalog",
            AppError::Checksum(_) => "checksum",
            AppError::Download(_) => "download",
            AppError::Config(_) => "config",
            AppError::Progress(_) => "progress",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Catalog result type alias
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Checksum result type alias
pub type ChecksumResult<T> = std::result::Result<T, ChecksumError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Progress display result type alias
pub type ProgressResult<T> = std::result::Result<T, ProgressError>;
