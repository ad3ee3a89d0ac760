//! Download planning and orchestration
//!
//! A run has three phases, executed strictly one item at a time:
//!
//! 1. **Enumerate** - read every order from the catalog and turn its files
//!    into candidates, recording invalid metadata and unselected platforms
//! 2. **Verify** - classify each candidate against the local filesystem
//! 3. **Fetch** - transfer what is missing or wrong, refreshing download
//!    URLs per order first since they expire, then re-verify the result
//!
//! Failures of a single order or item are recorded and the run continues.
//!
//! # Module Organization
//!
//! - [`stats`] - Run counters, per-item reports and size formatting

pub mod stats;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::app::catalog::{Catalog, CatalogEntry};
use crate::app::client::{backoff_with_jitter, FetchOutcome, ResumableFetcher, ShutdownSignal};
use crate::app::events::{ProgressBus, ProgressEvent};
use crate::app::hash::Md5Hash;
use crate::app::integrity::{FetchReason, IntegrityChecker, Verdict};
use crate::app::models::{PlatformSelection, RemoteFileDescriptor};
use crate::errors::{CatalogResult, DownloadError};

pub use stats::{format_filesize, progress_line, ItemOutcome, ItemReport, RunSummary};

/// What a run covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Root under which logical paths are resolved
    pub download_location: PathBuf,
    /// Platforms taking part in the run
    pub platforms: PlatformSelection,
    /// Restrict the run to these order keys instead of the whole library
    pub order_keys: Option<Vec<String>>,
    /// Stop after verification
    pub dry_run: bool,
}

impl PlannerConfig {
    pub fn new(download_location: impl Into<PathBuf>) -> Self {
        Self {
            download_location: download_location.into(),
            platforms: PlatformSelection::default(),
            order_keys: None,
            dry_run: false,
        }
    }
}

/// A candidate file and where it lives locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedItem {
    pub descriptor: RemoteFileDescriptor,
    pub destination: PathBuf,
    pub verdict: Verdict,
}

impl PlannedItem {
    fn label(&self) -> String {
        self.descriptor.logical_path.display().to_string()
    }
}

/// Result of the enumerate and verify phases
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Every valid candidate, in catalog order
    pub candidates: Vec<PlannedItem>,
    /// Candidates that need fetching, in catalog order
    pub to_fetch: Vec<PlannedItem>,
    /// Sum of expected sizes over `candidates`
    pub bytes_total: u64,
    /// Sum of expected sizes over `to_fetch`
    pub bytes_to_fetch: u64,
}

/// Drives the checker and fetcher over a catalog
pub struct DownloadPlanner<C> {
    catalog: C,
    checker: IntegrityChecker,
    fetcher: ResumableFetcher,
    bus: Arc<ProgressBus>,
    config: PlannerConfig,
    shutdown: Option<ShutdownSignal>,
}

impl<C: Catalog> DownloadPlanner<C> {
    pub fn new(
        catalog: C,
        checker: IntegrityChecker,
        fetcher: ResumableFetcher,
        bus: Arc<ProgressBus>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            catalog,
            checker,
            fetcher,
            bus,
            config,
            shutdown: None,
        }
    }

    /// Stop between items (and mid-transfer, via the fetcher) on shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Run all phases (or the first two for a dry run)
    ///
    /// # Errors
    ///
    /// Only a failure to list the account's orders aborts the run; every
    /// other problem is recorded in the returned summary.
    pub async fn run(&self) -> CatalogResult<RunSummary> {
        let mut summary = RunSummary::new();
        let plan = self.plan(&mut summary).await?;

        if self.config.dry_run {
            for item in &plan.to_fetch {
                let reason = match item.verdict {
                    Verdict::NeedsFetch(reason) => reason.to_string(),
                    Verdict::Satisfied { .. } => String::new(),
                };
                summary.record(report(&item.descriptor, ItemOutcome::WouldFetch { reason }, 0));
            }
            info!(
                "Dry run: {} of {} files need fetching ({})",
                plan.to_fetch.len(),
                plan.candidates.len(),
                format_filesize(plan.bytes_to_fetch)
            );
        } else {
            self.fetch_all(&plan, &mut summary).await;
        }

        summary.finish();
        info!("{}", summary);
        Ok(summary)
    }

    /// Enumerate and verify phases
    pub async fn plan(&self, summary: &mut RunSummary) -> CatalogResult<Plan> {
        let descriptors = self.enumerate(summary).await?;
        let plan = self.verify(descriptors, summary).await;

        summary.bytes_total = plan.bytes_total;
        summary.bytes_planned = plan.bytes_to_fetch;
        info!(
            "{} candidates ({}), {} need fetching ({})",
            plan.candidates.len(),
            format_filesize(plan.bytes_total),
            plan.to_fetch.len(),
            format_filesize(plan.bytes_to_fetch)
        );
        Ok(plan)
    }

    async fn enumerate(&self, summary: &mut RunSummary) -> CatalogResult<Vec<RemoteFileDescriptor>> {
        let keys = match &self.config.order_keys {
            Some(keys) => keys.clone(),
            None => self.catalog.order_keys().await?,
        };
        info!("Reading {} orders", keys.len());

        let mut descriptors = Vec::new();
        for key in keys {
            let order = match self.catalog.order(&key).await {
                Ok(order) => order,
                Err(e) => {
                    warn!("Skipping order {}: {}", key, e);
                    summary.orders_skipped += 1;
                    continue;
                }
            };
            debug!("Order {} ({})", key, order.display_name());

            for entry in order.entries(&self.config.platforms) {
                match entry {
                    CatalogEntry::Valid(descriptor) => descriptors.push(descriptor),
                    CatalogEntry::Invalid {
                        order_key,
                        label,
                        reason,
                    } => {
                        warn!("Skipping {}: {}", label, reason);
                        summary.record(ItemReport {
                            order_key,
                            label,
                            outcome: ItemOutcome::Invalid { reason },
                            attempts: 0,
                        });
                    }
                    CatalogEntry::PlatformSkipped {
                        order_key,
                        label,
                        platform,
                    } => {
                        debug!("Skipping {}: platform {} not selected", label, platform);
                        summary.record(ItemReport {
                            order_key,
                            label,
                            outcome: ItemOutcome::PlatformSkipped,
                            attempts: 0,
                        });
                    }
                }
            }
        }

        Ok(descriptors)
    }

    async fn verify(&self, descriptors: Vec<RemoteFileDescriptor>, summary: &mut RunSummary) -> Plan {
        let mut plan = Plan::default();

        for descriptor in descriptors {
            let destination = descriptor.local_path(&self.config.download_location);
            let verdict = match self.checker.classify(&descriptor, &destination).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    error!("Cannot check {}: {}", destination.display(), e);
                    summary.record(report(
                        &descriptor,
                        ItemOutcome::Failed {
                            error: e.to_string(),
                        },
                        0,
                    ));
                    continue;
                }
            };
            self.publish_classification(&destination, &verdict);

            let item = PlannedItem {
                descriptor,
                destination,
                verdict,
            };
            plan.bytes_total += item.descriptor.expected_size;

            if verdict.needs_fetch() {
                plan.bytes_to_fetch += item.descriptor.expected_size;
                plan.to_fetch.push(item.clone());
            } else {
                summary.record(report(&item.descriptor, ItemOutcome::AlreadySatisfied, 0));
            }
            plan.candidates.push(item);
        }

        plan
    }

    async fn fetch_all(&self, plan: &Plan, summary: &mut RunSummary) {
        let total_items = plan.to_fetch.len();
        let mut refreshed: HashMap<String, HashMap<Md5Hash, String>> = HashMap::new();
        let mut bytes_done = 0u64;

        for (index, item) in plan.to_fetch.iter().enumerate() {
            if self.is_cancelled() {
                summary.record(report(&item.descriptor, ItemOutcome::Cancelled, 0));
                continue;
            }

            if !refreshed.contains_key(&item.descriptor.order_key) {
                let urls = self.refresh_urls(&item.descriptor.order_key).await;
                refreshed.insert(item.descriptor.order_key.clone(), urls);
            }

            let descriptor = match refreshed
                .get(&item.descriptor.order_key)
                .and_then(|urls| urls.get(&item.descriptor.expected_checksum))
            {
                Some(url) if *url != item.descriptor.url => item.descriptor.with_url(url.clone()),
                _ => item.descriptor.clone(),
            };

            let (outcome, attempts) = self.fetch_item(&descriptor, item).await;
            match &outcome {
                ItemOutcome::Failed { error } => {
                    error!("{}: {}", item.label(), error);
                }
                other => info!("{}: {}", item.label(), other),
            }
            summary.record(report(&descriptor, outcome, attempts));

            bytes_done += item.descriptor.expected_size;
            info!(
                "{}",
                progress_line(index + 1, total_items, bytes_done, plan.bytes_to_fetch)
            );
        }
    }

    /// Latest URLs of an order's selected files keyed by digest, or an empty
    /// map if the catalog cannot be read
    async fn refresh_urls(&self, order_key: &str) -> HashMap<Md5Hash, String> {
        match self.catalog.order(order_key).await {
            Ok(order) => {
                debug!("Refreshed download URLs of order {}", order_key);
                order
                    .descriptors(&self.config.platforms)
                    .into_iter()
                    .map(|descriptor| (descriptor.expected_checksum, descriptor.url))
                    .collect()
            }
            Err(e) => {
                warn!(
                    "Could not refresh URLs for order {}: {}. Using planned URLs",
                    order_key, e
                );
                HashMap::new()
            }
        }
    }

    /// Fetch one item with retries and post-fetch verification
    async fn fetch_item(&self, descriptor: &RemoteFileDescriptor, item: &PlannedItem) -> (ItemOutcome, u32) {
        let policy = self.fetcher.policy();
        let max_attempts = policy.max_attempts.max(1);
        let mut verdict = item.verdict;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self
                .fetcher
                .fetch(descriptor, &item.destination, &verdict)
                .await
            {
                Ok(outcome) => return (self.confirm(descriptor, item, outcome).await, attempt),
                Err(DownloadError::Cancelled) => return (ItemOutcome::Cancelled, attempt),
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= max_attempts || self.is_cancelled() {
                return (
                    ItemOutcome::Failed {
                        error: error.to_string(),
                    },
                    attempt,
                );
            }

            let delay = backoff_with_jitter(policy.retry_base_delay, attempt);
            warn!(
                "{} (attempt {}/{}): {}. Retrying in {}ms",
                item.label(),
                attempt,
                max_attempts,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;

            verdict = match self.checker.classify(descriptor, &item.destination).await {
                Ok(Verdict::Satisfied { .. }) => {
                    return (
                        ItemOutcome::Fetched {
                            bytes: 0,
                            resumed: false,
                        },
                        attempt,
                    )
                }
                Ok(verdict) => verdict,
                Err(e) => {
                    return (
                        ItemOutcome::Failed {
                            error: e.to_string(),
                        },
                        attempt,
                    )
                }
            };
        }
    }

    /// Re-classify a freshly fetched file
    async fn confirm(
        &self,
        descriptor: &RemoteFileDescriptor,
        item: &PlannedItem,
        outcome: FetchOutcome,
    ) -> ItemOutcome {
        match self.checker.classify(descriptor, &item.destination).await {
            Ok(verdict @ Verdict::Satisfied { .. }) => {
                self.publish_classification(&item.destination, &verdict);
                ItemOutcome::Fetched {
                    bytes: outcome.bytes_written,
                    resumed: outcome.resumed,
                }
            }
            Ok(verdict) => {
                self.publish_classification(&item.destination, &verdict);
                let error = match verdict {
                    Verdict::NeedsFetch(FetchReason::ChecksumMismatch { expected, actual }) => {
                        DownloadError::HashMismatch {
                            expected: expected.to_hex(),
                            actual: actual.map_or_else(|| "nothing".to_string(), |a| a.to_hex()),
                        }
                    }
                    Verdict::NeedsFetch(FetchReason::SizeMismatch { expected, actual }) => {
                        DownloadError::SizeMismatch { expected, actual }
                    }
                    _ => DownloadError::IncompleteDownload {
                        received: 0,
                        expected: descriptor.expected_size,
                    },
                };
                ItemOutcome::Failed {
                    error: format!("verification after fetch failed: {}", error),
                }
            }
            Err(e) => ItemOutcome::Failed {
                error: format!("verification after fetch failed: {}", e),
            },
        }
    }

    fn publish_classification(&self, path: &std::path::Path, verdict: &Verdict) {
        self.bus.publish(&ProgressEvent::Classified {
            path: path.to_path_buf(),
            summary: verdict.to_string(),
            needs_fetch: verdict.needs_fetch(),
        });
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map_or(false, ShutdownSignal::is_triggered)
    }
}

fn report(descriptor: &RemoteFileDescriptor, outcome: ItemOutcome, attempts: u32) -> ItemReport {
    ItemReport {
        order_key: descriptor.order_key.clone(),
        label: descriptor.logical_path.display().to_string(),
        outcome,
        attempts,
    }
}
