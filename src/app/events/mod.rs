//! In-process progress notifications
//!
//! The [`ProgressBus`] maps an [`EventKind`] to an ordered list of synchronous
//! subscriber callbacks. Components that hash or transfer data publish
//! [`ProgressEvent`]s on it; the CLI subscribes a console reporter.
//!
//! # Module Organization
//!
//! - [`throttle`] - Decile throttling shared by hashing and downloading
//!
//! # Examples
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use hb_fetcher::app::events::{EventKind, ProgressBus, ProgressEvent};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//!
//! let mut bus = ProgressBus::new();
//! bus.subscribe(EventKind::Progress, move |event| {
//!     if let ProgressEvent::Progress { percent } = event {
//!         sink.lock().unwrap().push(*percent);
//!     }
//! });
//!
//! bus.publish(&ProgressEvent::Progress { percent: 10 });
//! assert_eq!(*seen.lock().unwrap(), vec![10]);
//! ```

pub mod throttle;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use throttle::DecileThrottle;

/// Kinds of events a subscriber can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Hashing of a file started
    HashStarted,
    /// Hashing of a file finished
    HashFinished,
    /// A transfer started
    DownloadStarted,
    /// A transfer ended (successfully or not)
    DownloadFinished,
    /// Cumulative progress crossed a new 10% band
    Progress,
    /// A file was classified against its remote expectations
    Classified,
}

/// Event payloads published on the bus
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    HashStarted {
        path: PathBuf,
        total_bytes: u64,
    },
    HashFinished {
        path: PathBuf,
    },
    DownloadStarted {
        path: PathBuf,
        offset_bytes: u64,
        total_bytes: u64,
    },
    DownloadFinished {
        path: PathBuf,
        success: bool,
    },
    Progress {
        percent: u8,
    },
    Classified {
        path: PathBuf,
        summary: String,
        needs_fetch: bool,
    },
}

impl ProgressEvent {
    /// Kind under which this event is delivered
    pub fn kind(&self) -> EventKind {
        match self {
            ProgressEvent::HashStarted { .. } => EventKind::HashStarted,
            ProgressEvent::HashFinished { .. } => EventKind::HashFinished,
            ProgressEvent::DownloadStarted { .. } => EventKind::DownloadStarted,
            ProgressEvent::DownloadFinished { .. } => EventKind::DownloadFinished,
            ProgressEvent::Progress { .. } => EventKind::Progress,
            ProgressEvent::Classified { .. } => EventKind::Classified,
        }
    }

    /// File the event refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ProgressEvent::HashStarted { path, .. }
            | ProgressEvent::HashFinished { path }
            | ProgressEvent::DownloadStarted { path, .. }
            | ProgressEvent::DownloadFinished { path, .. }
            | ProgressEvent::Classified { path, .. } => Some(path),
            ProgressEvent::Progress { .. } => None,
        }
    }
}

type Callback = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Synchronous publish/subscribe registry
///
/// Subscribers are registered through `&mut self` during start-up; once the
/// bus is shared (typically in an `Arc`) the table is read-only. Publishing
/// runs every callback for the event's kind on the calling thread, in
/// registration order, so callbacks must stay cheap.
#[derive(Default)]
pub struct ProgressBus {
    subscribers: HashMap<EventKind, Vec<Callback>>,
}

impl ProgressBus {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event kind
    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F)
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .entry(kind)
            .or_default()
            .push(Box::new(callback));
    }

    /// Deliver an event to every subscriber of its kind
    ///
    /// Publishing a kind nobody subscribed to is a no-op.
    pub fn publish(&self, event: &ProgressEvent) {
        if let Some(callbacks) = self.subscribers.get(&event.kind()) {
            for callback in callbacks {
                callback(event);
            }
        }
    }

    /// Feed a progress sample through `throttle` and publish if a new band was crossed
    pub fn report_progress(&self, throttle: &mut DecileThrottle, current: u64, total: u64) {
        if let Some(percent) = throttle.observe(current, total) {
            self.publish(&ProgressEvent::Progress { percent });
        }
    }

    /// Number of callbacks registered for `kind`
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for ProgressBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&EventKind, usize> = self
            .subscribers
            .iter()
            .map(|(kind, callbacks)| (kind, callbacks.len()))
            .collect();
        f.debug_struct("ProgressBus")
            .field("subscribers", &counts)
            .finish()
    }
}
