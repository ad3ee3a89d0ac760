//! Run statistics and per-item reports
//!
//! [`RunSummary`] keeps separate counters for every way an item can end a
//! run, so "already on disk" and "platform not selected" never collapse into
//! the same number.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How one catalog item ended the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Local copy verified, nothing fetched
    AlreadySatisfied,
    /// Platform not selected for this run
    PlatformSkipped,
    /// Catalog metadata unusable
    Invalid { reason: String },
    /// Needs fetching; reported by dry runs and verification
    WouldFetch { reason: String },
    /// Transferred and verified
    Fetched { bytes: u64, resumed: bool },
    /// Gave up on this item
    Failed { error: String },
    /// Stopped by a shutdown request
    Cancelled,
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemOutcome::AlreadySatisfied => write!(f, "already downloaded"),
            ItemOutcome::PlatformSkipped => write!(f, "platform not selected"),
            ItemOutcome::Invalid { reason } => write!(f, "invalid metadata: {}", reason),
            ItemOutcome::WouldFetch { reason } => write!(f, "would fetch: {}", reason),
            ItemOutcome::Fetched {
                bytes,
                resumed: true,
            } => write!(f, "resumed, {} fetched", format_filesize(*bytes)),
            ItemOutcome::Fetched {
                bytes,
                resumed: false,
            } => write!(f, "fetched {}", format_filesize(*bytes)),
            ItemOutcome::Failed { error } => write!(f, "failed: {}", error),
            ItemOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one catalog item with enough context to act on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub order_key: String,
    /// Logical path (or best available label) of the item
    pub label: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
    /// Transfer attempts made (0 when nothing was fetched)
    pub attempts: u32,
}

/// Counters and reports for one planner run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub satisfied: usize,
    pub platform_skipped: usize,
    pub invalid: usize,
    pub pending: usize,
    pub fetched: usize,
    pub resumed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Orders that could not be read from the catalog
    pub orders_skipped: usize,
    /// Bytes of every candidate file (valid and selected)
    pub bytes_total: u64,
    /// Bytes of the files that needed fetching
    pub bytes_planned: u64,
    /// Bytes actually received
    pub bytes_fetched: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub reports: Vec<ItemReport>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            satisfied: 0,
            platform_skipped: 0,
            invalid: 0,
            pending: 0,
            fetched: 0,
            resumed: 0,
            failed: 0,
            cancelled: 0,
            orders_skipped: 0,
            bytes_total: 0,
            bytes_planned: 0,
            bytes_fetched: 0,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            reports: Vec::new(),
        }
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a report and bump the matching counter
    pub fn record(&mut self, report: ItemReport) {
        match &report.outcome {
            ItemOutcome::AlreadySatisfied => self.satisfied += 1,
            ItemOutcome::PlatformSkipped => self.platform_skipped += 1,
            ItemOutcome::Invalid { .. } => self.invalid += 1,
            ItemOutcome::WouldFetch { .. } => self.pending += 1,
            ItemOutcome::Fetched { bytes, resumed } => {
                self.fetched += 1;
                self.bytes_fetched += bytes;
                if *resumed {
                    self.resumed += 1;
                }
            }
            ItemOutcome::Failed { .. } => self.failed += 1,
            ItemOutcome::Cancelled => self.cancelled += 1,
        }
        self.reports.push(report);
    }

    /// Number of items that reached any outcome
    pub fn items(&self) -> usize {
        self.reports.len()
    }

    /// True when nothing failed, was cancelled or could not be planned
    pub fn is_successful(&self) -> bool {
        self.failed == 0 && self.cancelled == 0 && self.invalid == 0 && self.orders_skipped == 0
    }

    /// Stamp the run duration from `started_at`
    pub fn finish(&mut self) {
        self.duration = Utc::now()
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }

    /// Reports matching `predicate`
    pub fn reports_where<F>(&self, predicate: F) -> impl Iterator<Item = &ItemReport>
    where
        F: Fn(&ItemOutcome) -> bool,
    {
        self.reports.iter().filter(move |r| predicate(&r.outcome))
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetched ({} resumed, {}), {} already downloaded, {} failed, {} cancelled, \
             {} platform skipped, {} invalid, {} pending, {} orders skipped in {:.1}s",
            self.fetched,
            self.resumed,
            format_filesize(self.bytes_fetched),
            self.satisfied,
            self.failed,
            self.cancelled,
            self.platform_skipped,
            self.invalid,
            self.pending,
            self.orders_skipped,
            self.duration.as_secs_f64()
        )
    }
}

/// Running progress line: `n/N DL: <done>/<total> (<pct>%)`
pub fn progress_line(item: usize, items: usize, bytes_done: u64, bytes_total: u64) -> String {
    let percent = if bytes_total == 0 {
        100.0
    } else {
        bytes_done as f64 / bytes_total as f64 * 100.0
    };
    format!(
        "{}/{} DL: {}/{} ({:.2}%)",
        item,
        items,
        format_filesize(bytes_done),
        format_filesize(bytes_total),
        percent
    )
}

/// Format a byte count with binary units
pub fn format_filesize(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    const THRESHOLD: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: ItemOutcome) -> ItemReport {
        ItemReport {
            order_key: "KEY".to_string(),
            label: "game/linux/game.tgz".to_string(),
            outcome,
            attempts: 0,
        }
    }

    #[test]
    fn test_format_filesize() {
        assert_eq!(format_filesize(0), "0 B");
        assert_eq!(format_filesize(1023), "1023 B");
        assert_eq!(format_filesize(1024), "1.00 KiB");
        assert_eq!(format_filesize(1_048_576), "1.00 MiB");
        assert_eq!(format_filesize(3 * 1024 * 1024 * 1024), "3.00 GiB");
        assert_eq!(format_filesize(5 * 1024u64.pow(5)), "5120.00 TiB");
    }

    #[test]
    fn test_progress_line() {
        assert_eq!(
            progress_line(2, 4, 512, 1024),
            "2/4 DL: 512 B/1.00 KiB (50.00%)"
        );
        assert_eq!(progress_line(0, 0, 0, 0), "0/0 DL: 0 B/0 B (100.00%)");
    }

    #[test]
    fn test_counters_are_distinct() {
        let mut summary = RunSummary::new();
        summary.record(report(ItemOutcome::AlreadySatisfied));
        summary.record(report(ItemOutcome::PlatformSkipped));
        summary.record(report(ItemOutcome::Fetched {
            bytes: 100,
            resumed: true,
        }));
        summary.record(report(ItemOutcome::Fetched {
            bytes: 50,
            resumed: false,
        }));

        assert_eq!(summary.satisfied, 1);
        assert_eq!(summary.platform_skipped, 1);
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.resumed, 1);
        assert_eq!(summary.bytes_fetched, 150);
        assert_eq!(summary.items(), 4);
        assert!(summary.is_successful());

        summary.record(report(ItemOutcome::Failed {
            error: "boom".to_string(),
        }));
        assert!(!summary.is_successful());
        assert_eq!(
            summary
                .reports_where(|o| matches!(o, ItemOutcome::Failed { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ItemOutcome::PlatformSkipped.to_string(), "platform not selected");
        assert_eq!(ItemOutcome::AlreadySatisfied.to_string(), "already downloaded");
        assert_eq!(
            ItemOutcome::Fetched {
                bytes: 2048,
                resumed: true
            }
            .to_string(),
            "resumed, 2.00 KiB fetched"
        );
    }
}
