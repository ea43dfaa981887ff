use std::sync::atomic::{AtomicU8, Ordering};

use crate::broadcast::ItemProgressTracker;
use crate::db::{item_repo, Database};
use crate::item::ItemState;

/// Events emitted by the pipeline while an item moves through its stages.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Advanced {
        state: ItemState,
        percent: u8,
        message: String,
    },
    Completed {
        state: ItemState,
    },
    Failed {
        percent: u8,
        error: String,
    },
}

impl ProgressEvent {
    pub fn advanced(state: ItemState, percent: u8, message: impl Into<String>) -> Self {
        ProgressEvent::Advanced {
            state,
            percent,
            message: message.into(),
        }
    }

    pub fn percent(&self) -> u8 {
        match self {
            ProgressEvent::Advanced { percent, .. } | ProgressEvent::Failed { percent, .. } => {
                *percent
            }
            ProgressEvent::Completed { state } => state.progress_floor(),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events to the item progress broadcast channel.
pub struct BroadcastProgress {
    tracker: ItemProgressTracker,
}

impl BroadcastProgress {
    pub fn new(tracker: ItemProgressTracker) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Advanced {
                state,
                percent,
                message,
            } => self.tracker.update(state, percent, &message),
            ProgressEvent::Completed { state } => {
                self.tracker
                    .update(state, state.progress_floor(), &format!("Item {}", state))
            }
            ProgressEvent::Failed { percent, error } => self.tracker.failed(percent, &error),
        }
    }
}

/// Clamps every reported percent to the highest seen so far, persists it on
/// the item row, then forwards the event.
pub struct MonotoneProgress<'a> {
    inner: &'a dyn ProgressReporter,
    db: Database,
    item_id: String,
    high_water: AtomicU8,
}

impl<'a> MonotoneProgress<'a> {
    pub fn new(inner: &'a dyn ProgressReporter, db: Database, item_id: &str, start: u8) -> Self {
        Self {
            inner,
            db,
            item_id: item_id.to_string(),
            high_water: AtomicU8::new(start.min(100)),
        }
    }

    pub fn current(&self) -> u8 {
        self.high_water.load(Ordering::SeqCst)
    }

    fn clamp(&self, percent: u8) -> u8 {
        let percent = percent.min(100);
        let previous = self.high_water.fetch_max(percent, Ordering::SeqCst);
        previous.max(percent)
    }
}

impl ProgressReporter for MonotoneProgress<'_> {
    fn report(&self, event: ProgressEvent) {
        let event = match event {
            ProgressEvent::Advanced {
                state,
                percent,
                message,
            } => {
                let percent = self.clamp(percent);
                if let Err(e) = item_repo::update_progress(&self.db, &self.item_id, percent, &message)
                {
                    log::warn!("Failed to persist progress for item {}: {}", self.item_id, e);
                }
                ProgressEvent::Advanced {
                    state,
                    percent,
                    message,
                }
            }
            ProgressEvent::Completed { state } => {
                self.clamp(state.progress_floor());
                ProgressEvent::Completed { state }
            }
            ProgressEvent::Failed { percent, error } => ProgressEvent::Failed {
                percent: self.clamp(percent),
                error,
            },
        };
        self.inner.report(event);
    }
}
