//! Observable sync status with delayed return to idle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// User-visible state of the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error(String),
}

impl SyncStatus {
    /// Success and error are shown briefly, then revert to idle.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error(_))
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Syncing => write!(f, "syncing"),
            Self::Success => write!(f, "success"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Publishes status transitions `idle -> syncing -> success|error -> idle`.
#[derive(Clone)]
pub struct SyncStatusPublisher {
    sender: Arc<watch::Sender<SyncStatus>>,
    // Bumped on every terminal transition so a stale revert timer is a no-op
    generation: Arc<AtomicU64>,
    display_delay: Duration,
}

impl SyncStatusPublisher {
    pub fn new(display_delay: Duration) -> Self {
        let (sender, _) = watch::channel(SyncStatus::Idle);
        Self {
            sender: Arc::new(sender),
            generation: Arc::new(AtomicU64::new(0)),
            display_delay,
        }
    }

    pub fn current(&self) -> SyncStatus {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.sender.subscribe()
    }

    /// Enter `Syncing`, passing through `Idle` when a terminal status is
    /// still displayed. Returns false if a sync is already shown as running.
    pub fn begin(&self) -> bool {
        if self.current().is_terminal() {
            self.reset();
        }
        self.sender.send_if_modified(|status| {
            if *status == SyncStatus::Idle {
                *status = SyncStatus::Syncing;
                true
            } else {
                false
            }
        })
    }

    pub fn succeed(&self) {
        self.finish(SyncStatus::Success);
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.finish(SyncStatus::Error(message.into()));
    }

    /// Return to idle from a terminal status.
    pub fn reset(&self) {
        self.sender.send_if_modified(|status| {
            if status.is_terminal() {
                *status = SyncStatus::Idle;
                true
            } else {
                false
            }
        });
    }

    fn finish(&self, terminal: SyncStatus) {
        let finished = self.sender.send_if_modified(|status| {
            if *status == SyncStatus::Syncing {
                *status = terminal;
                true
            } else {
                false
            }
        });
        if !finished {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self.display_delay.is_zero() {
            self.reset();
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime for status revert; staying terminal until next sync");
            return;
        };
        let publisher = self.clone();
        runtime.spawn(async move {
            tokio::time::sleep(publisher.display_delay).await;
            if publisher.generation.load(Ordering::SeqCst) == generation {
                publisher.reset();
            }
        });
    }
}
