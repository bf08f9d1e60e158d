use crate::region::RegionCoordinate;
use crate::store::RecordStore;
use crate::world::{Material, WorldProvider, REGION_SPAN};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;


/// Fixed classification set of automation-capable device kinds.
///
/// Built once at startup from configuration; not reloadable mid-run, so the
/// hot scan path is a plain set lookup.
pub struct MaterialClassifier {
    kinds: HashSet<Material>,
}

impl MaterialClassifier {
    pub fn new<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = Material>,
    {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn is_automation(&self, kind: &Material) -> bool {
        self.kinds.contains(kind)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Per-coordinate mutual exclusion between a scan and a manual removal of
/// the same region. Operations on different regions never contend.
pub struct RegionLocks {
    locks: DashMap<RegionCoordinate, Arc<Mutex<()>>>,
}

impl RegionLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub fn for_coord(&self, coord: &RegionCoordinate) -> Arc<Mutex<()>> {
        let entry = self
            .locks
            .entry(coord.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }
}

impl Default for RegionLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one region scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanOutcome {
    pub automation: u32,
    pub entities: u32,
}

/// Computes density statistics for one region.
///
/// The scan is the expensive O(volume) primitive; the scheduler amortizes it
/// across control ticks.
pub struct RegionScanner {
    world: Arc<dyn WorldProvider>,
    store: Arc<RecordStore>,
    classifier: Arc<MaterialClassifier>,
    locks: Arc<RegionLocks>,
}

impl RegionScanner {
    pub fn new(
        world: Arc<dyn WorldProvider>,
        store: Arc<RecordStore>,
        classifier: Arc<MaterialClassifier>,
        locks: Arc<RegionLocks>,
    ) -> Self {
        Self {
            world,
            store,
            classifier,
            locks,
        }
    }

    /// Scan one region's full volume and entity list, writing the counts and
    /// `last_scanned` into its record. Returns `None` when the region is
    /// skipped because an operator cleared it; cleared regions are never
    /// re-populated automatically.
    pub fn scan(&self, region: &RegionCoordinate, now_ms: i64) -> Option<ScanOutcome> {
        let lock = self.locks.for_coord(region);
        let _guard = lock.lock().unwrap();

        let record = self.store.get_or_create(region, now_ms);
        if record.is_cleared() {
            return None;
        }

        let bounds = self.world.vertical_bounds(&region.world);
        let mut automation: u32 = 0;

        for y in bounds.min_y..bounds.max_y {
            for local_x in 0..REGION_SPAN {
                for local_z in 0..REGION_SPAN {
                    if let Some(kind) = self.world.material_at(region, local_x, y, local_z) {
                        if self.classifier.is_automation(&kind) {
                            automation += 1;
                        }
                    }
                }
            }
        }

        let entities = self
            .world
            .entities_in(region)
            .iter()
            .filter(|e| !e.operator)
            .count() as u32;

        record.record_scan(automation, entities, now_ms);
        debug!(
            region = %region,
            automation,
            entities,
            "Region scanned"
        );

        Some(ScanOutcome {
            automation,
            entities,
        })
    }
}
