//! Session cookie management for Humble Bundle authentication
//!
//! The catalog API authenticates with the `_simpleauth_sess` cookie copied
//! from a logged-in browser session. The cookie is resolved from the command
//! line, the config file or the environment (in that order) and can be stored
//! in a `.env` file with owner-only permissions.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use tracing::debug;

use crate::app::catalog::{Catalog, HumbleCatalog};
use crate::app::client::{ClientConfig, TransferPolicy};
use crate::constants::{auth, env as env_constants};
use crate::errors::{AuthError, AuthResult, CatalogError};

/// Where a session cookie was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieSource {
    CommandLine,
    ConfigFile,
    Environment,
}

impl std::fmt::Display for CookieSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CookieSource::CommandLine => write!(f, "--cookie argument"),
            CookieSource::ConfigFile => write!(f, "config file"),
            CookieSource::Environment => write!(f, "{} environment variable", env_constants::SESSION_COOKIE),
        }
    }
}

/// Authentication status information
#[derive(Debug, Clone)]
pub struct AuthStatus {
    /// Source of the cookie that would be used, if any
    pub source: Option<CookieSource>,
    /// Whether .env file exists in current directory
    pub dotenv_file_exists: bool,
    /// Whether the catalog accepted the cookie (None = not tested)
    pub cookie_valid: Option<bool>,
}

impl AuthStatus {
    pub fn has_cookie(&self) -> bool {
        self.source.is_some()
    }

    /// Get descriptive status message for display
    pub fn status_message(&self) -> String {
        match (self.has_cookie(), self.cookie_valid) {
            (false, _) => "Missing session cookie - run 'auth setup' to configure".to_string(),
            (true, None) => "Session cookie configured but not verified".to_string(),
            (true, Some(true)) => "Session cookie configured and verified".to_string(),
            (true, Some(false)) => "Session cookie configured but rejected".to_string(),
        }
    }
}

/// Pick the session cookie by precedence
///
/// Empty values are treated as absent so a blank `--cookie ""` or config
/// entry falls through to the next source.
pub fn resolve_session_cookie(
    cli_cookie: Option<&str>,
    config_cookie: Option<&str>,
) -> AuthResult<(String, CookieSource)> {
    let env_cookie = env::var(env_constants::SESSION_COOKIE).ok();
    let candidates = [
        (cli_cookie.map(str::to_string), CookieSource::CommandLine),
        (config_cookie.map(str::to_string), CookieSource::ConfigFile),
        (env_cookie, CookieSource::Environment),
    ];

    for (value, source) in candidates {
        if let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            debug!("Using session cookie from {}", source);
            validate_cookie(&value)?;
            return Ok((value, source));
        }
    }

    Err(AuthError::MissingSessionCookie)
}

/// Reject values that cannot be a session cookie
pub fn validate_cookie(cookie: &str) -> AuthResult<()> {
    if cookie.len() < auth::MIN_COOKIE_LENGTH {
        return Err(AuthError::InvalidCookie {
            reason: format!(
                "expected at least {} characters, got {}",
                auth::MIN_COOKIE_LENGTH,
                cookie.len()
            ),
        });
    }

    if cookie
        .chars()
        .any(|c| c.is_whitespace() || c == ';' || c.is_control())
    {
        return Err(AuthError::InvalidCookie {
            reason: "cookie value must not contain whitespace or ';'".to_string(),
        });
    }

    Ok(())
}

/// Check current authentication status without contacting the server
pub fn get_auth_status(cli_cookie: Option<&str>, config_cookie: Option<&str>) -> AuthStatus {
    AuthStatus {
        source: resolve_session_cookie(cli_cookie, config_cookie)
            .ok()
            .map(|(_, source)| source),
        dotenv_file_exists: Path::new(".env").exists(),
        cookie_valid: None,
    }
}

/// Prompt user for the session cookie without echoing it
pub fn prompt_session_cookie() -> AuthResult<String> {
    println!(
        "Copy the value of the '{}' cookie from a logged-in browser session.",
        auth::SESSION_COOKIE_NAME
    );
    let cookie = rpassword::prompt_password("Session cookie: ")
        .map_err(AuthError::CredentialStorage)?
        .trim()
        .to_string();

    validate_cookie(&cookie)?;
    Ok(cookie)
}

/// Save the cookie to `env_path` with secure permissions
///
/// Other lines of an existing file are preserved.
pub fn save_session_cookie(cookie: &str, env_path: &Path) -> AuthResult<()> {
    let mut lines = Vec::new();
    let mut cookie_found = false;
    let entry = format!("{}={}", env_constants::SESSION_COOKIE, cookie);

    if env_path.exists() {
        let file = File::open(env_path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line
                .trim()
                .starts_with(&format!("{}=", env_constants::SESSION_COOKIE))
            {
                lines.push(entry.clone());
                cookie_found = true;
            } else {
                lines.push(line);
            }
        }
    }

    if !cookie_found {
        lines.push(entry);
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(env_path)?;

    for line in lines {
        writeln!(file, "{}", line)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(auth::ENV_FILE_PERMISSIONS);
        file.set_permissions(perms).map_err(|_| AuthError::PermissionDenied {
            path: env_path.to_path_buf(),
        })?;
    }

    Ok(())
}

/// Ask the catalog whether it accepts `cookie`
///
/// Returns `Ok(false)` when the server rejects the session; other failures
/// (network, server errors) are passed through.
pub async fn verify_session_cookie(
    cookie: &str,
    client: &ClientConfig,
    transfer: &TransferPolicy,
) -> Result<bool, CatalogError> {
    let catalog = HumbleCatalog::new(client, transfer, cookie)?;
    match catalog.order_keys().await {
        Ok(keys) => {
            debug!("Session cookie accepted, {} orders visible", keys.len());
            Ok(true)
        }
        Err(CatalogError::AuthenticationRequired { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Interactive cookie setup workflow
pub async fn setup_session_cookie(client: &ClientConfig, transfer: &TransferPolicy) -> AuthResult<()> {
    println!("Humble Bundle Authentication Setup");
    println!("==================================");
    println!();
    println!("The session cookie will be stored in a .env file in the current directory.");
    println!();

    if get_auth_status(None, None).has_cookie() {
        print!("A session cookie is already configured. Replace it? [y/N]: ");
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().read_line(&mut response)?;
        if !response.trim().to_lowercase().starts_with('y') {
            println!("Setup cancelled.");
            return Ok(());
        }
        println!();
    }

    let cookie = prompt_session_cookie()?;
    save_session_cookie(&cookie, Path::new(".env"))?;
    env::set_var(env_constants::SESSION_COOKIE, &cookie);

    #[cfg(unix)]
    println!("Session cookie saved to .env (permissions 600)");
    #[cfg(not(unix))]
    println!("Session cookie saved to .env. Please ensure the file is protected.");

    println!("Verifying session cookie...");
    match verify_session_cookie(&cookie, client, transfer).await {
        Ok(true) => println!("Setup complete! The session cookie was accepted."),
        Ok(false) => println!("The server rejected this cookie. Log in again and re-run 'auth setup'."),
        Err(e) => println!("Could not verify the cookie: {}", e),
    }

    Ok(())
}

/// Show where the cookie comes from and whether the server accepts it
pub async fn show_auth_status(
    cli_cookie: Option<&str>,
    config_cookie: Option<&str>,
    client: &ClientConfig,
    transfer: &TransferPolicy,
) -> AuthResult<()> {
    let mut status = get_auth_status(cli_cookie, config_cookie);

    println!("Humble Bundle Authentication Status");
    println!("===================================");
    println!();
    match status.source {
        Some(source) => println!("Session cookie: set ({})", source),
        None => println!("Session cookie: not set"),
    }
    println!(
        ".env file: {}",
        if status.dotenv_file_exists {
            "Exists"
        } else {
            "Not found"
        }
    );
    println!();

    if let Ok((cookie, _)) = resolve_session_cookie(cli_cookie, config_cookie) {
        println!("Testing session cookie...");
        match verify_session_cookie(&cookie, client, transfer).await {
            Ok(valid) => status.cookie_valid = Some(valid),
            Err(e) => println!("Could not reach the catalog: {}", e),
        }
        println!();
    }

    println!("Status: {}", status.status_message());
    if !status.has_cookie() || status.cookie_valid == Some(false) {
        println!();
        println!("To configure the session cookie, run: hb_fetcher auth setup");
    }

    Ok(())
}
