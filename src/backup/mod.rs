use crate::region::RegionCoordinate;
use crate::world::{BlockPos, Material};
use dashmap::DashMap;
use std::collections::HashMap;

/// Snapshot of the automation devices removed from one region.
///
/// Created atomically with the removal that produced it; consumed exactly
/// once by restore.
#[derive(Clone, Debug)]
pub struct AutomationBackup {
    /// Absolute position -> device kind that stood there before removal.
    pub positions: HashMap<BlockPos, Material>,
    pub created_at: i64,
}

impl AutomationBackup {
    pub fn new(created_at: i64) -> Self {
        Self {
            positions: HashMap::new(),
            created_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }
}

/// Per-region backups of removed automation devices.
pub struct BackupStore {
    backups: DashMap<RegionCoordinate, AutomationBackup>,
}

impl BackupStore {
    pub fn new() -> Self {
        Self {
            backups: DashMap::new(),
        }
    }

    /// Store a backup, overwriting any prior one for the coordinate.
    pub fn insert(&self, coord: RegionCoordinate, backup: AutomationBackup) {
        self.backups.insert(coord, backup);
    }

    /// Consume the backup for a coordinate. Subsequent calls return `None`.
    pub fn take(&self, coord: &RegionCoordinate) -> Option<AutomationBackup> {
        self.backups.remove(coord).map(|(_, backup)| backup)
    }

    pub fn contains(&self, coord: &RegionCoordinate) -> bool {
        self.backups.contains_key(coord)
    }

    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }
}

impl Default for BackupStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backup_with(positions: &[(i32, i32, i32)]) -> AutomationBackup {
        let mut backup = AutomationBackup::new(1_000);
        for &(x, y, z) in positions {
            backup
                .positions
                .insert(BlockPos { x, y, z }, Material::new("relay"));
        }
        backup
    }

    #[test]
    fn test_take_consumes_exactly_once() {
        let store = BackupStore::new();
        let coord = RegionCoordinate::new("overworld", 0, 0);
        store.insert(coord.clone(), backup_with(&[(0, 64, 0)]));

        assert!(store.take(&coord).is_some());
        assert!(store.take(&coord).is_none());
    }

    #[test]
    fn test_insert_overwrites_prior_backup() {
        let store = BackupStore::new();
        let coord = RegionCoordinate::new("overworld", 0, 0);
        store.insert(coord.clone(), backup_with(&[(0, 64, 0)]));
        store.insert(coord.clone(), backup_with(&[(1, 64, 1), (2, 64, 2)]));

        let taken = store.take(&coord).unwrap();
        assert_eq!(taken.len(), 2);
        assert!(!taken.positions.contains_key(&BlockPos { x: 0, y: 64, z: 0 }));
    }

    #[test]
    fn test_backups_are_per_coordinate() {
        let store = BackupStore::new();
        let a = RegionCoordinate::new("overworld", 0, 0);
        let b = RegionCoordinate::new("overworld", 0, 1);
        store.insert(a.clone(), backup_with(&[(0, 64, 0)]));

        assert!(store.contains(&a));
        assert!(!store.contains(&b));
        assert!(store.take(&b).is_none());
        assert!(store.take(&a).is_some());
    }
}
