//! Authentication management for the Humble Bundle session cookie
//!
//! This module resolves the session cookie from its sources, stores it in a
//! `.env` file and checks whether the catalog accepts it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hb_fetcher::auth::resolve_session_cookie;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (cookie, source) = resolve_session_cookie(None, None)?;
//! println!("Using cookie from {} ({} chars)", source, cookie.len());
//! # Ok(())
//! # }
//! ```

pub mod credentials;

// Re-export main public API
pub use credentials::{
    AuthStatus, CookieSource, get_auth_status, prompt_session_cookie, resolve_session_cookie,
    save_session_cookie, setup_session_cookie, show_auth_status, validate_cookie,
    verify_session_cookie,
};
