use crate::region::RegionCoordinate;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// Backpressure-bounded scan work queue.
///
/// Refilled only when empty, so pending work is never duplicated; drained a
/// fixed budget per control tick, so per-tick cost is bounded regardless of
/// world size. A full sweep of a large world spans many ticks by design.
pub struct ScanQueue {
    queue: Mutex<VecDeque<RegionCoordinate>>,
    regions_per_tick: usize,
}

impl ScanQueue {
    pub fn new(regions_per_tick: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            regions_per_tick,
        }
    }

    /// Enqueue `regions` only when the queue is drained. Returns true when a
    /// refill happened.
    pub fn refill_if_empty(&self, regions: Vec<RegionCoordinate>) -> bool {
        let mut queue = self.queue.lock().unwrap();
        if !queue.is_empty() {
            return false;
        }
        queue.extend(regions);
        debug!(pending = queue.len(), "Scan queue refilled");
        true
    }

    /// Dequeue up to the per-tick budget.
    pub fn drain_budget(&self) -> Vec<RegionCoordinate> {
        let mut queue = self.queue.lock().unwrap();
        let take = self.regions_per_tick.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Discard all pending work. Partial progress is abandoned, not resumed.
    pub fn clear(&self) {
        let mut queue = self.queue.lock().unwrap();
        if !queue.is_empty() {
            debug!(dropped = queue.len(), "Scan queue discarded");
            queue.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}
