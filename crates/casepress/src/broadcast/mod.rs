//! Broadcasting for real-time event streaming.

pub mod item_progress;

pub use item_progress::{
    ItemProgressBroadcaster, ItemProgressEvent, ItemProgressTracker, RunStatus,
};
