//! Core HTTP operations with rate limiting and retry logic
//!
//! [`HttpHandler`] issues GET requests (optionally ranged), backs off on
//! connection failures and on HTTP 429/503, and hands the raw response back
//! for streaming. Status interpretation beyond that is left to the caller.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Jitter, Quota, RateLimiter,
};
use reqwest::header::RANGE;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, error, warn};
use url::Url;

use crate::constants::limits;
use crate::errors::{DownloadError, DownloadResult};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Exponential backoff for the given 1-based attempt number, without jitter
///
/// The delay doubles with each attempt and is capped at
/// `limits::MAX_BACKOFF_SECS`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
        .min(Duration::from_secs(limits::MAX_BACKOFF_SECS))
}

/// Backoff delay with a small random jitter added
pub fn backoff_with_jitter(base: Duration, attempt: u32) -> Duration {
    let jitter = if base.is_zero() {
        0
    } else {
        fastrand::u64(0..=limits::MAX_JITTER_MS)
    };
    backoff_delay(base, attempt) + Duration::from_millis(jitter)
}

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: Option<DirectRateLimiter>,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl HttpHandler {
    /// Creates a handler without rate limiting
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client to use for requests
    /// * `max_attempts` - Attempts per request before giving up (at least 1)
    /// * `retry_base_delay` - First backoff delay; doubled on each retry
    pub fn new(client: Client, max_attempts: u32, retry_base_delay: Duration) -> Self {
        Self {
            client,
            rate_limiter: None,
            max_attempts: max_attempts.max(1),
            retry_base_delay,
        }
    }

    /// Limit outgoing requests to `rate_limit_rps` per second
    ///
    /// Returns `None` if the rate is zero.
    pub fn with_rate_limit(mut self, rate_limit_rps: u32) -> Option<Self> {
        self.rate_limiter = Some(Self::build_rate_limiter(rate_limit_rps)?);
        Some(self)
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> Option<DirectRateLimiter> {
        let quota = Quota::per_second(NonZeroU32::new(rate_limit_rps)?);
        Some(RateLimiter::direct(quota))
    }

    /// Sends a GET request and returns the response for streaming
    ///
    /// With `range_start` set, a `Range: bytes=<offset>-` header is added.
    /// Successful responses and `416 Range Not Satisfiable` are returned as
    /// is so the caller can decide how to continue.
    ///
    /// # Errors
    ///
    /// - `DownloadError::RateLimitExceeded` / `ServerOverloaded` when 429/503
    ///   persists through every attempt
    /// - `DownloadError::MaxRetriesExceeded` when connecting keeps failing
    /// - `DownloadError::ServerError` for any other non-success status
    /// - `DownloadError::Http` for non-transient request errors
    pub async fn get_response(
        &self,
        url: &Url,
        range_start: Option<u64>,
    ) -> DownloadResult<Response> {
        if let Some(rate_limiter) = &self.rate_limiter {
            rate_limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;
        }

        let mut attempt = 1;
        loop {
            let mut request = self.client.get(url.clone());
            if let Some(offset) = range_start {
                request = request.header(RANGE, format!("bytes={}-", offset));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE
                    {
                        if attempt < self.max_attempts {
                            let delay = backoff_with_jitter(self.retry_base_delay, attempt);
                            warn!(
                                "Server answered {} for {}. Backing off for {}ms",
                                status,
                                url,
                                delay.as_millis()
                            );
                            attempt += 1;
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                            DownloadError::RateLimitExceeded
                        } else {
                            DownloadError::ServerOverloaded
                        });
                    }

                    if status.is_success() || status == StatusCode::RANGE_NOT_SATISFIABLE {
                        debug!("GET {} -> {}", url, status);
                        return Ok(response);
                    }

                    return Err(DownloadError::ServerError {
                        status: status.as_u16(),
                    });
                }
                Err(e) if is_transient(&e) && attempt < self.max_attempts => {
                    let delay = backoff_with_jitter(self.retry_base_delay, attempt);
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) if is_transient(&e) => {
                    error!(
                        "Request failed after {} attempts: {}",
                        self.max_attempts, e
                    );
                    return Err(DownloadError::MaxRetriesExceeded {
                        max_retries: self.max_attempts,
                    });
                }
                Err(e) => return Err(DownloadError::Http(e)),
            }
        }
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}
