//! Signal handling for cancelling transfers
//!
//! A `watch` channel carries a single "stop" flag. [`SignalHandler`] flips it
//! on Ctrl+C or SIGTERM; [`ShutdownSignal`] is the receiving side handed to
//! the fetcher and planner.

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Receiving side of the shutdown flag
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether shutdown has already been requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested
    ///
    /// If every sender is dropped without requesting shutdown, this never
    /// resolves.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Sending side of the shutdown flag
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Create a connected trigger/signal pair
pub fn create_shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Turns Ctrl+C / SIGTERM into a shutdown request
pub struct SignalHandler {
    trigger: ShutdownTrigger,
}

impl SignalHandler {
    pub fn new(trigger: ShutdownTrigger) -> Self {
        Self { trigger }
    }

    /// Spawn the background task that waits for a signal
    pub fn setup(&self) -> JoinHandle<()> {
        let trigger = self.trigger.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Failed to install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received Ctrl+C, stopping after the current write");
                },
                _ = terminate => {
                    info!("Received terminate signal, stopping after the current write");
                },
            }

            trigger.trigger();
        })
    }
}
