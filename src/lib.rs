//! HB Fetcher Library
//!
//! A Rust library for mirroring a Humble Bundle library to local storage.
//! Existing files are verified by size and MD5, with digests cached in
//! `.md5` sidecar files, and partial files are resumed with range requests.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_MAX_ATTEMPTS, 3);
        assert_eq!(ENV_SESSION_COOKIE, "HB_SESSION_COOKIE");
        assert!(USER_AGENT.starts_with("hb_fetcher/"));
    }

    #[test]
    fn test_error_types() {
        let auth_error = errors::AuthError::MissingSessionCookie;
        let app_error = AppError::Auth(auth_error);

        assert_eq!(app_error.category(), "authentication");
        assert!(!app_error.is_recoverable());
    }
}
