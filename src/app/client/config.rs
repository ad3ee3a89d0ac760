//! HTTP client configuration and building logic
//!
//! Downloads and catalog requests share transport settings but differ in
//! deadlines: a catalog call gets a whole-request timeout, while a download
//! only bounds connection establishment so large files can stream for as long
//! as they need.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};

use crate::constants::{catalog, http, limits};
use crate::errors::DownloadResult;

/// Transport settings for downloads and catalog access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Deadline for establishing a connection
    pub connect_timeout: Duration,
    /// Whole-request deadline for catalog calls
    pub catalog_timeout: Duration,
    /// Catalog request rate (requests per second)
    pub rate_limit_rps: u32,
    /// Scheme and host of the catalog API
    pub catalog_base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tcp_keepalive: Some(http::TCP_KEEPALIVE),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            connect_timeout: http::CONNECT_TIMEOUT,
            catalog_timeout: catalog::REQUEST_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            catalog_base_url: catalog::BASE_URL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Builder carrying the settings common to every client
    pub fn base_builder(&self) -> ClientBuilder {
        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(self.tcp_nodelay)
            .redirect(reqwest::redirect::Policy::limited(http::MAX_REDIRECTS));

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle_timeout);
        }

        builder
    }

    /// Builds the client used for file transfers
    ///
    /// No overall request timeout is set; streaming may legitimately take
    /// hours for large files.
    pub fn build_http_client(&self) -> DownloadResult<Client> {
        Ok(self.base_builder().user_agent(http::USER_AGENT).build()?)
    }
}
