//! Resumable single-stream file transfers
//!
//! [`ResumableFetcher`] streams a catalog file to disk chunk by chunk. When
//! the integrity check found a shorter local copy it asks the server for the
//! remaining bytes only and appends them; otherwise it starts from an empty
//! file. A ranged answer is accepted only if its `Content-Range` lines up
//! exactly with the bytes already on disk, anything else falls back to a full
//! transfer.
//!
//! Interrupted transfers keep whatever was written so the next attempt (or
//! the next run) can resume.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use super::http::HttpHandler;
use super::signals::ShutdownSignal;
use crate::app::checksum::ChecksumStore;
use crate::app::events::{DecileThrottle, ProgressBus, ProgressEvent};
use crate::app::integrity::Verdict;
use crate::app::models::{LocalFileState, RemoteFileDescriptor};
use crate::constants::limits;
use crate::errors::{DownloadError, DownloadResult};

/// Transfer policy flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferPolicy {
    /// Continue partial files with ranged requests
    pub resume: bool,
    /// Attempts per file (and per HTTP request) before giving up
    pub max_attempts: u32,
    /// First retry delay; doubled on every further attempt
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            resume: true,
            max_attempts: limits::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
        }
    }
}

/// Progress of one in-flight transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferState {
    pub offset_bytes: u64,
    pub total_bytes: u64,
    throttle: DecileThrottle,
}

impl TransferState {
    pub fn new(offset_bytes: u64, total_bytes: u64) -> Self {
        Self {
            offset_bytes,
            total_bytes,
            throttle: DecileThrottle::starting_at(offset_bytes, total_bytes),
        }
    }

    /// Account for `bytes` more written bytes
    ///
    /// Returns the newly crossed progress band, if any.
    pub fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.offset_bytes = (self.offset_bytes + bytes).min(self.total_bytes);
        self.throttle.observe(self.offset_bytes, self.total_bytes)
    }

    /// Last progress band reported for this transfer
    pub fn last_reported_decile(&self) -> u8 {
        self.throttle.last_reported()
    }
}

/// Result of a completed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Bytes received during this transfer
    pub bytes_written: u64,
    /// Size of the file on disk afterwards
    pub final_size: u64,
    /// Whether existing bytes were kept and appended to
    pub resumed: bool,
}

/// How the server answered a ranged request
enum RangeAnswer {
    /// Exactly the requested remainder
    Partial(Response),
    /// Range ignored, full body follows
    Full(Response),
    /// Unusable answer; the reason is logged before starting over
    Rejected(DownloadError),
}

/// Streams remote files to disk with optional resume
#[derive(Debug)]
pub struct ResumableFetcher {
    http: HttpHandler,
    store: Arc<ChecksumStore>,
    bus: Arc<ProgressBus>,
    policy: TransferPolicy,
    shutdown: Option<ShutdownSignal>,
}

impl ResumableFetcher {
    pub fn new(
        http: HttpHandler,
        store: Arc<ChecksumStore>,
        bus: Arc<ProgressBus>,
        policy: TransferPolicy,
    ) -> Self {
        Self {
            http,
            store,
            bus,
            policy,
            shutdown: None,
        }
    }

    /// Stop streaming as soon as `signal` fires
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }

    /// Fetch `descriptor` into `destination`
    ///
    /// `verdict` is the integrity check that led to this fetch; only a
    /// partial verdict allows resuming. The sidecar of `destination` is
    /// always removed and is not rewritten afterwards, so the next integrity
    /// check hashes the new bytes.
    ///
    /// # Errors
    ///
    /// - `DownloadError::DirectoryCreation` if the parent directory cannot be created
    /// - `DownloadError::IncompleteDownload` if the body ended early (partial kept)
    /// - `DownloadError::SizeMismatch` if the server sent more than expected
    /// - `DownloadError::Cancelled` if shutdown was requested mid-transfer
    /// - transport errors from [`HttpHandler::get_response`]
    pub async fn fetch(
        &self,
        descriptor: &RemoteFileDescriptor,
        destination: &Path,
        verdict: &Verdict,
    ) -> DownloadResult<FetchOutcome> {
        let url = Url::parse(&descriptor.url).map_err(|e| DownloadError::InvalidUrl {
            url: descriptor.url.clone(),
            error: e.to_string(),
        })?;
        let total = descriptor.expected_size;

        ensure_parent_dir(destination).await?;
        if self.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        self.store.remove_record(destination).await?;

        let local = LocalFileState::inspect(destination).await?;
        let resume_offset = if self.policy.resume && verdict.is_partial() {
            verdict
                .resume_offset()
                .filter(|offset| local.exists && *offset == local.size_on_disk)
        } else {
            None
        };

        let (response, start_offset) = match resume_offset {
            Some(offset) => {
                info!(
                    "Resuming {} from byte {} of {}",
                    destination.display(),
                    offset,
                    total
                );
                match self.request_range(&url, offset, total).await? {
                    RangeAnswer::Partial(response) => (response, offset),
                    RangeAnswer::Full(response) => {
                        warn!(
                            "Server ignored the range request for {}; rewriting from the start",
                            destination.display()
                        );
                        (full_length_checked(response, total)?, 0)
                    }
                    RangeAnswer::Rejected(reason) => {
                        warn!(
                            "Cannot resume {}: {}. Starting over",
                            destination.display(),
                            reason
                        );
                        discard(destination).await?;
                        (self.request_full(&url, total).await?, 0)
                    }
                }
            }
            None => {
                discard(destination).await?;
                (self.request_full(&url, total).await?, 0)
            }
        };

        let final_size = self
            .stream_to_file(response, destination, start_offset, total)
            .await?;

        let outcome = FetchOutcome {
            bytes_written: final_size - start_offset,
            final_size,
            resumed: start_offset > 0,
        };
        info!(
            "Fetched {} ({} bytes written{})",
            destination.display(),
            outcome.bytes_written,
            if outcome.resumed { ", resumed" } else { "" }
        );
        Ok(outcome)
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map_or(false, ShutdownSignal::is_triggered)
    }

    async fn request_full(&self, url: &Url, total: u64) -> DownloadResult<Response> {
        let response = self.http.get_response(url, None).await?;
        if response.status() != StatusCode::OK {
            return Err(DownloadError::ServerError {
                status: response.status().as_u16(),
            });
        }

        full_length_checked(response, total)
    }

    async fn request_range(&self, url: &Url, offset: u64, total: u64) -> DownloadResult<RangeAnswer> {
        let response = self.http.get_response(url, Some(offset)).await?;

        match response.status() {
            StatusCode::OK => Ok(RangeAnswer::Full(response)),
            StatusCode::PARTIAL_CONTENT => {
                let content_range = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();

                if !content_range_matches(&content_range, offset, total) {
                    return Ok(RangeAnswer::Rejected(DownloadError::RangeMismatch {
                        requested: offset,
                        content_range,
                    }));
                }

                if let Some(length) = header_u64(&response, CONTENT_LENGTH.as_str()) {
                    if length != total - offset {
                        return Ok(RangeAnswer::Rejected(DownloadError::SizeMismatch {
                            expected: total - offset,
                            actual: length,
                        }));
                    }
                }

                Ok(RangeAnswer::Partial(response))
            }
            status => Ok(RangeAnswer::Rejected(DownloadError::ServerError {
                status: status.as_u16(),
            })),
        }
    }

    async fn stream_to_file(
        &self,
        response: Response,
        destination: &Path,
        start_offset: u64,
        total: u64,
    ) -> DownloadResult<u64> {
        let mut file = if start_offset > 0 {
            OpenOptions::new().append(true).open(destination).await?
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(destination)
                .await?
        };

        let mut state = TransferState::new(start_offset, total);
        self.bus.publish(&ProgressEvent::DownloadStarted {
            path: destination.to_path_buf(),
            offset_bytes: start_offset,
            total_bytes: total,
        });

        let streamed = self.pump(response, &mut file, &mut state).await;
        let flushed = file.flush().await;

        self.bus.publish(&ProgressEvent::DownloadFinished {
            path: destination.to_path_buf(),
            success: streamed.is_ok() && flushed.is_ok(),
        });

        streamed?;
        flushed?;
        Ok(state.offset_bytes)
    }

    async fn pump(
        &self,
        response: Response,
        file: &mut File,
        state: &mut TransferState,
    ) -> DownloadResult<()> {
        let mut stream = response.bytes_stream();
        let mut shutdown = self.shutdown.clone();

        loop {
            let next = match shutdown.as_mut() {
                Some(signal) => tokio::select! {
                    biased;
                    _ = signal.triggered() => {
                        info!("Transfer interrupted at byte {}", state.offset_bytes);
                        return Err(DownloadError::Cancelled);
                    }
                    chunk = stream.next() => chunk,
                },
                None => stream.next().await,
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            let length = chunk.len() as u64;

            if state.offset_bytes + length > state.total_bytes {
                return Err(DownloadError::SizeMismatch {
                    expected: state.total_bytes,
                    actual: state.offset_bytes + length,
                });
            }

            file.write_all(&chunk).await?;
            if let Some(percent) = state.advance(length) {
                self.bus.publish(&ProgressEvent::Progress { percent });
            }
        }

        if state.offset_bytes < state.total_bytes {
            return Err(DownloadError::IncompleteDownload {
                received: state.offset_bytes,
                expected: state.total_bytes,
            });
        }

        debug!("Stream complete at {} bytes", state.offset_bytes);
        Ok(())
    }
}

/// Whether `bytes <start>-<end>/<total>` describes exactly the remainder
/// from `offset` of a `total`-byte file
fn content_range_matches(content_range: &str, offset: u64, total: u64) -> bool {
    let Some(byte_range) = content_range.trim().strip_prefix("bytes ") else {
        return false;
    };
    let Some((range, complete)) = byte_range.split_once('/') else {
        return false;
    };
    let Some((start, end)) = range.split_once('-') else {
        return false;
    };

    let (Ok(start), Ok(end)) = (start.trim().parse::<u64>(), end.trim().parse::<u64>()) else {
        return false;
    };

    let total_matches = match complete.trim() {
        "*" => true,
        value => value.parse::<u64>().map_or(false, |value| value == total),
    };

    start == offset && end.checked_add(1) == Some(total) && total_matches
}

/// Reject a whole-file answer whose advertised length is not `total`
fn full_length_checked(response: Response, total: u64) -> DownloadResult<Response> {
    match header_u64(&response, CONTENT_LENGTH.as_str()) {
        Some(length) if length != total => Err(DownloadError::SizeMismatch {
            expected: total,
            actual: length,
        }),
        _ => Ok(response),
    }
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

async fn ensure_parent_dir(destination: &Path) -> DownloadResult<()> {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|source| DownloadError::DirectoryCreation {
                path: parent.to_path_buf(),
                source,
            }),
        _ => Ok(()),
    }
}

/// Remove stale content before a from-scratch transfer
async fn discard(destination: &Path) -> DownloadResult<()> {
    match fs::remove_file(destination).await {
        Ok(()) => {
            debug!("Removed stale {}", destination.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
