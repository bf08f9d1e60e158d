use crate::region::{RegionCoordinate, RegionRecord};
use dashmap::DashMap;
use std::sync::Arc;


/// Density thresholds above which a region is flagged.
#[derive(Clone, Copy, Debug)]
pub struct FlagThresholds {
    pub max_automation: u32,
    pub max_entities: u32,
}

/// Concurrent mapping from region coordinate to its activity record.
///
/// Records are `Arc`-shared so the scanner can update counters while the
/// presentation layer holds read references; structural insert/remove never
/// holds a lock across a scan.
pub struct RecordStore {
    records: DashMap<RegionCoordinate, Arc<RegionRecord>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn get(&self, coord: &RegionCoordinate) -> Option<Arc<RegionRecord>> {
        self.records.get(coord).map(|r| Arc::clone(r.value()))
    }

    /// Fetch the record for a region, creating a zeroed one if absent.
    pub fn get_or_create(&self, coord: &RegionCoordinate, now_ms: i64) -> Arc<RegionRecord> {
        let entry = self
            .records
            .entry(coord.clone())
            .or_insert_with(|| Arc::new(RegionRecord::new(now_ms)));
        Arc::clone(entry.value())
    }

    pub fn remove(&self, coord: &RegionCoordinate) -> Option<Arc<RegionRecord>> {
        self.records.remove(coord).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of every record, in arbitrary order.
    pub fn export_all(&self) -> Vec<(RegionCoordinate, Arc<RegionRecord>)> {
        self.records
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Regions in `world` whose density exceeds either threshold.
    ///
    /// Cleared records are excluded regardless of density; records whose last
    /// scan fell out of the retention window are excluded as stale. Ordering
    /// is ascending by x then z so pagination is deterministic.
    pub fn list_flagged(
        &self,
        world: &str,
        thresholds: FlagThresholds,
        retention_ms: i64,
        now_ms: i64,
    ) -> Vec<(RegionCoordinate, Arc<RegionRecord>)> {
        let mut flagged: Vec<(RegionCoordinate, Arc<RegionRecord>)> = self
            .records
            .iter()
            .filter(|e| {
                let coord = e.key();
                let record = e.value();
                coord.world == world
                    && !record.is_cleared()
                    && now_ms - record.last_scanned_ms() < retention_ms
                    && (record.automation() > thresholds.max_automation
                        || record.entities() > thresholds.max_entities)
            })
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        flagged.sort_by_key(|(coord, _)| (coord.x, coord.z));
        flagged
    }

    /// Drop every expired record. Returns the removed coordinates.
    pub fn prune_expired(&self, now_ms: i64, retention_ms: i64) -> Vec<RegionCoordinate> {
        let expired: Vec<RegionCoordinate> = self
            .records
            .iter()
            .filter(|e| e.value().is_expired(now_ms, retention_ms))
            .map(|e| e.key().clone())
            .collect();

        for coord in &expired {
            self.records.remove(coord);
        }
        expired
    }

    /// Replace the entire store contents (startup load path).
    pub fn replace_all(&self, entries: Vec<(RegionCoordinate, RegionRecord)>) {
        self.records.clear();
        for (coord, record) in entries {
            self.records.insert(coord, Arc::new(record));
        }
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
