//! Remote catalog access
//!
//! The [`Catalog`] trait is the boundary between the download engine and the
//! service that knows which files an account owns. [`HumbleCatalog`] talks to
//! the Humble Bundle order API with a session cookie; tests substitute an
//! in-memory implementation.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hb_fetcher::app::catalog::{Catalog, HumbleCatalog};
//! use hb_fetcher::app::client::{ClientConfig, TransferPolicy};
//! use hb_fetcher::app::models::PlatformSelection;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = HumbleCatalog::new(
//!     &ClientConfig::default(),
//!     &TransferPolicy::default(),
//!     "session-cookie-value",
//! )?;
//!
//! for key in catalog.order_keys().await? {
//!     let order = catalog.order(&key).await?;
//!     for descriptor in order.descriptors(&PlatformSelection::default()) {
//!         println!("{}", descriptor);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod types;

use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::app::client::{ClientConfig, HttpHandler, TransferPolicy};
use crate::constants::{auth, catalog};
use crate::errors::{CatalogError, CatalogResult, DownloadError};

pub use types::{CatalogEntry, Order, OrderKey};

/// Source of order metadata
#[allow(async_fn_in_trait)]
pub trait Catalog {
    /// Keys of every order owned by the account
    async fn order_keys(&self) -> CatalogResult<Vec<String>>;

    /// Full metadata of one order
    ///
    /// Download URLs in the result may expire; call again to refresh them.
    async fn order(&self, key: &str) -> CatalogResult<Order>;
}

/// Humble Bundle order API client
#[derive(Debug)]
pub struct HumbleCatalog {
    http: HttpHandler,
    base_url: Url,
}

impl HumbleCatalog {
    /// Create a client authenticated with `session_cookie`
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::InvalidUrl` for a bad base URL,
    /// `CatalogError::RateLimit` for a zero request rate and
    /// `CatalogError::Http` if the HTTP client cannot be built.
    pub fn new(
        config: &ClientConfig,
        transfer: &TransferPolicy,
        session_cookie: &str,
    ) -> CatalogResult<Self> {
        let base_url =
            Url::parse(&config.catalog_base_url).map_err(|e| CatalogError::InvalidUrl {
                url: config.catalog_base_url.clone(),
                error: e.to_string(),
            })?;

        let jar = Arc::new(Jar::default());
        jar.add_cookie_str(
            &format!("{}={}", auth::SESSION_COOKIE_NAME, session_cookie),
            &base_url,
        );

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-requested-by",
            HeaderValue::from_static(catalog::REQUESTED_BY),
        );

        let client = config
            .base_builder()
            .cookie_provider(jar)
            .default_headers(headers)
            .user_agent(catalog::USER_AGENT)
            .timeout(config.catalog_timeout)
            .build()?;

        let http = HttpHandler::new(client, transfer.max_attempts, transfer.retry_base_delay)
            .with_rate_limit(config.rate_limit_rps)
            .ok_or_else(|| CatalogError::RateLimit {
                reason: "rate limit must be non-zero".to_string(),
            })?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str, key: Option<&str>) -> CatalogResult<Url> {
        let invalid = |error: String| CatalogError::InvalidUrl {
            url: format!("{}{}", self.base_url, path),
            error,
        };

        let mut url = self.base_url.join(path).map_err(|e| invalid(e.to_string()))?;
        if let Some(key) = key {
            url.path_segments_mut()
                .map_err(|_| invalid("base URL cannot hold a path".to_string()))?
                .pop_if_empty()
                .push(key);
        }
        url.query_pairs_mut().append_pair("ajax", "true");
        Ok(url)
    }

    async fn get_json(&self, url: &Url, key: Option<&str>) -> CatalogResult<Value> {
        debug!("Catalog request: {}", url.path());
        let response = self
            .http
            .get_response(url, None)
            .await
            .map_err(|e| transport_error(e, key))?;

        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        check_response(&value)?;
        Ok(value)
    }
}

impl Catalog for HumbleCatalog {
    async fn order_keys(&self) -> CatalogResult<Vec<String>> {
        let url = self.endpoint(catalog::ORDER_LIST_PATH, None)?;
        let value = self.get_json(&url, None).await?;
        let keys: Vec<OrderKey> = serde_json::from_value(value)?;
        debug!("Catalog lists {} orders", keys.len());
        Ok(keys.into_iter().map(|k| k.gamekey).collect())
    }

    async fn order(&self, key: &str) -> CatalogResult<Order> {
        let url = self.endpoint(catalog::ORDER_PATH_PREFIX, Some(key))?;
        let value = self.get_json(&url, Some(key)).await?;
        let mut order: Order = serde_json::from_value(value)?;
        if order.gamekey.is_empty() {
            order.gamekey = key.to_string();
        }
        Ok(order)
    }
}

fn transport_error(error: DownloadError, key: Option<&str>) -> CatalogError {
    match error {
        DownloadError::ServerError { status: 401 | 403 } => CatalogError::AuthenticationRequired {
            message: "session cookie rejected".to_string(),
        },
        DownloadError::ServerError { status: 404 } => match key {
            Some(key) => CatalogError::OrderNotFound {
                key: key.to_string(),
            },
            None => CatalogError::ServerError { status: 404 },
        },
        DownloadError::ServerError { status } => CatalogError::ServerError { status },
        DownloadError::Http(e) => CatalogError::Http(e),
        other => CatalogError::Response {
            message: other.to_string(),
        },
    }
}

/// Reject bodies that carry an API-level error
fn check_response(value: &Value) -> CatalogResult<()> {
    let Some(object) = value.as_object() else {
        return Ok(());
    };

    let success = object.get("success").and_then(Value::as_bool);
    if success == Some(true) {
        return Ok(());
    }

    let error_id = object.get("error_id").and_then(Value::as_str);
    let errors = object.get("errors").filter(|errors| !errors.is_null());
    let message = errors
        .map(error_messages)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| "Unspecified error".to_string());

    if error_id == Some(catalog::LOGIN_REQUIRED_ERROR) {
        return Err(CatalogError::AuthenticationRequired { message });
    }

    if success == Some(false) || errors.is_some() || error_id.is_some() {
        return Err(CatalogError::Response { message });
    }

    Ok(())
}

fn error_messages(errors: &Value) -> String {
    let mut messages = Vec::new();
    match errors {
        Value::Object(map) => {
            for value in map.values() {
                collect_strings(value, &mut messages);
            }
        }
        other => collect_strings(other, &mut messages),
    }
    messages.join(", ")
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}
