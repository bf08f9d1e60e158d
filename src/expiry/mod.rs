use crate::region::RegionCoordinate;
use crate::store::RecordStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Schedules cleared records for removal at their exact amnesty boundary.
///
/// One independent one-shot timer per coordinate, not a poll on the control
/// tick, so expiry is wall-clock-accurate even when no further scans happen.
/// Must be used from within the host tokio runtime.
pub struct ExpiryScheduler {
    store: Arc<RecordStore>,
    pending: Arc<DashMap<RegionCoordinate, JoinHandle<()>>>,
}

impl ExpiryScheduler {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Schedule removal of `coord` after `delay`. A prior timer for the same
    /// coordinate is replaced.
    pub fn schedule_removal(&self, coord: RegionCoordinate, delay: Duration) {
        if let Some((_, prior)) = self.pending.remove(&coord) {
            prior.abort();
        }

        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let key = coord.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            store.remove(&key);
            pending.remove(&key);
            info!(region = %key, "Cleared record expired and was removed");
        });

        self.pending.insert(coord, handle);
    }

    /// Drop the pending timer for a coordinate, leaving the record in place.
    pub fn cancel(&self, coord: &RegionCoordinate) {
        if let Some((_, handle)) = self.pending.remove(coord) {
            handle.abort();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        for entry in self.pending.iter() {
            entry.value().abort();
        }
    }
}
