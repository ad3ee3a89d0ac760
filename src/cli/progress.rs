//! Console progress display for hashing and downloading
//!
//! [`ConsoleReporter`] subscribes to the [`ProgressBus`] and drives one
//! indicatif bar at a time, since the engine hashes or transfers a single
//! file at any moment. When stderr is not a terminal the bar is replaced by
//! decile log lines.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hb_fetcher::app::ProgressBus;
//! use hb_fetcher::cli::{ConsoleReporter, ProgressConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let reporter = ConsoleReporter::new(ProgressConfig::default())?;
//! let mut bus = ProgressBus::new();
//! reporter.attach(&mut bus);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::app::events::{EventKind, ProgressBus, ProgressEvent};
use crate::constants::progress;
use crate::errors::{ProgressError, ProgressResult};

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Enable visual progress bars
    pub enable_progress_bars: bool,
    /// Maximum width for file names in display
    pub max_filename_width: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            max_filename_width: 40,
        }
    }
}

/// Bar or log output for bus events
#[derive(Clone)]
pub struct ConsoleReporter {
    config: ProgressConfig,
    style: ProgressStyle,
    current: Arc<Mutex<Option<ProgressBar>>>,
    is_terminal: bool,
}

impl ConsoleReporter {
    /// Create a reporter; bars are used only when stderr is a terminal
    pub fn new(config: ProgressConfig) -> ProgressResult<Self> {
        let style = ProgressStyle::default_bar()
            .template("{prefix:>11} {msg:40} [{bar:30.cyan/blue}] {pos:>3}%")
            .map_err(|e| ProgressError::Template {
                reason: e.to_string(),
            })?
            .progress_chars("##-");

        Ok(Self {
            config,
            style,
            current: Arc::new(Mutex::new(None)),
            is_terminal: atty::is(atty::Stream::Stderr),
        })
    }

    fn uses_bars(&self) -> bool {
        self.config.enable_progress_bars && self.is_terminal
    }

    /// Subscribe to hashing and download events on `bus`
    pub fn attach(&self, bus: &mut ProgressBus) {
        for kind in [
            EventKind::HashStarted,
            EventKind::HashFinished,
            EventKind::DownloadStarted,
            EventKind::DownloadFinished,
            EventKind::Progress,
        ] {
            let reporter = self.clone();
            bus.subscribe(kind, move |event| reporter.handle(event));
        }
    }

    /// Apply one event to the display
    pub fn handle(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::HashStarted { path, .. } => self.start("Hashing", path, 0),
            ProgressEvent::DownloadStarted {
                path,
                offset_bytes,
                total_bytes,
            } => {
                let start = if *total_bytes == 0 {
                    0
                } else {
                    (u128::from(*offset_bytes) * 100 / u128::from(*total_bytes)).min(100) as u64
                };
                self.start("Downloading", path, start);
            }
            ProgressEvent::Progress { percent } => {
                if let Some(bar) = self.bar() {
                    bar.set_position(u64::from(*percent));
                } else if !self.uses_bars() {
                    info!("{}%", percent);
                }
            }
            ProgressEvent::HashFinished { .. } => self.finish(event, true),
            ProgressEvent::DownloadFinished { success, .. } => self.finish(event, *success),
            ProgressEvent::Classified { .. } => {}
        }
    }

    fn start(&self, action: &str, path: &Path, position: u64) {
        let name = self.display_name(path);
        if !self.uses_bars() {
            info!("{} {}", action, name);
            return;
        }

        let bar = ProgressBar::new(100);
        bar.set_style(self.style.clone());
        bar.set_prefix(action.to_string());
        bar.set_message(name);
        bar.set_position(position);
        bar.enable_steady_tick(Duration::from_millis(progress::TICK_INTERVAL_MS));

        if let Some(previous) = self.replace(Some(bar)) {
            previous.finish_and_clear();
        }
    }

    fn finish(&self, event: &ProgressEvent, success: bool) {
        if let Some(bar) = self.replace(None) {
            if success {
                bar.finish_and_clear();
            } else {
                bar.abandon();
            }
        } else if !success {
            if let Some(path) = event.path() {
                warn!("Stopped {}", self.display_name(path));
            }
        }
    }

    fn bar(&self) -> Option<ProgressBar> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    fn replace(&self, bar: Option<ProgressBar>) -> Option<ProgressBar> {
        match self.current.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, bar),
            Err(_) => None,
        }
    }

    /// File name truncated to the configured width
    fn display_name(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        truncate_name(&name, self.config.max_filename_width)
    }
}

fn truncate_name(name: &str, width: usize) -> String {
    if name.chars().count() <= width || width < 4 {
        return name.to_string();
    }
    let keep: String = name.chars().take(width - 3).collect();
    format!("{}...", keep)
}
