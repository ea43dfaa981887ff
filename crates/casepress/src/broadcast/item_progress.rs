//! Item progress broadcaster for real-time pipeline status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::item::ItemState;

/// Overall status of an item's current run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Processing,
    Completed,
    Failed,
}

/// Progress event for one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemProgressEvent {
    /// Work item identifier.
    pub item_id: String,
    /// Owning batch, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Item state at the time of the event.
    pub state: ItemState,
    pub status: RunStatus,
    /// Overall progress, 0 to 100.
    pub percent: u8,
    /// Human-readable stage text.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemProgressEvent {
    pub fn new(
        item_id: &str,
        batch_id: Option<&str>,
        state: ItemState,
        percent: u8,
        message: &str,
    ) -> Self {
        let status = match state {
            ItemState::Generated | ItemState::Published => RunStatus::Completed,
            ItemState::Failed => RunStatus::Failed,
            _ => RunStatus::Processing,
        };
        Self {
            item_id: item_id.to_string(),
            batch_id: batch_id.map(str::to_string),
            state,
            status,
            percent,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failed(item_id: &str, batch_id: Option<&str>, percent: u8, error: &str) -> Self {
        let mut event = Self::new(
            item_id,
            batch_id,
            ItemState::Failed,
            percent,
            "Processing failed",
        );
        event.error = Some(error.to_string());
        event
    }
}

/// Broadcasts item progress events to any number of subscribers.
#[derive(Clone)]
pub struct ItemProgressBroadcaster {
    sender: Arc<broadcast::Sender<ItemProgressEvent>>,
}

impl ItemProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: ItemProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ItemProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker bound to one item.
    pub fn track(&self, item_id: &str, batch_id: Option<&str>) -> ItemProgressTracker {
        ItemProgressTracker::new(item_id, batch_id, Arc::clone(&self.sender))
    }
}

impl Default for ItemProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Sends events for a single item.
pub struct ItemProgressTracker {
    item_id: String,
    batch_id: Option<String>,
    sender: Arc<broadcast::Sender<ItemProgressEvent>>,
}

impl ItemProgressTracker {
    pub fn new(
        item_id: &str,
        batch_id: Option<&str>,
        sender: Arc<broadcast::Sender<ItemProgressEvent>>,
    ) -> Self {
        Self {
            item_id: item_id.to_string(),
            batch_id: batch_id.map(str::to_string),
            sender,
        }
    }

    pub fn update(&self, state: ItemState, percent: u8, message: &str) {
        let event = ItemProgressEvent::new(
            &self.item_id,
            self.batch_id.as_deref(),
            state,
            percent,
            message,
        );
        let _ = self.sender.send(event);
    }

    pub fn failed(&self, percent: u8, error: &str) {
        let event =
            ItemProgressEvent::failed(&self.item_id, self.batch_id.as_deref(), percent, error);
        let _ = self.sender.send(event);
    }
}
