use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Tracks which items currently have an active pipeline run.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `item_id` for one pipeline run. Returns `None` if another run
    /// already holds it.
    pub fn acquire(&self, item_id: &str) -> Option<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(item_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            item_id: item_id.to_string(),
            registry: self.clone(),
        })
    }

    pub fn is_active(&self, item_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(item_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release(&self, item_id: &str) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(item_id);
    }
}

/// Exclusive claim on one item. Released on drop.
pub struct InFlightGuard {
    item_id: String,
    registry: InFlightRegistry,
}

impl InFlightGuard {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(&self.item_id);
    }
}

impl std::fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("item_id", &self.item_id)
            .finish()
    }
}
