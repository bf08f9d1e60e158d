//! In-memory world provider.
//!
//! Backs the binary's standalone mode and the test suites. Regions hold a
//! sparse block map, so volume iteration cost is paid by the scanner exactly
//! as it would be against a real host.

use super::{Material, VerticalBounds, WorldEntity, WorldProvider};
use crate::region::RegionCoordinate;
use anyhow::{anyhow, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct RegionVolume {
    /// Sparse (local_x, y, local_z) -> occupant.
    blocks: HashMap<(i32, i32, i32), Material>,
    entities: Vec<WorldEntity>,
}

/// DashMap-backed `WorldProvider` with an adjustable performance signal.
pub struct MemoryWorld {
    regions: DashMap<RegionCoordinate, RegionVolume>,
    bounds: DashMap<String, VerticalBounds>,
    signal: Mutex<f64>,
    fail_next_signal: AtomicBool,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self {
            regions: DashMap::new(),
            bounds: DashMap::new(),
            signal: Mutex::new(20.0),
            fail_next_signal: AtomicBool::new(false),
        }
    }

    /// Mark a region as loaded (empty volume if new).
    pub fn load_region(&self, coord: RegionCoordinate) {
        self.regions.entry(coord).or_default();
    }

    pub fn unload_region(&self, coord: &RegionCoordinate) {
        self.regions.remove(coord);
    }

    /// Place a block, loading the region if needed.
    pub fn place(&self, coord: &RegionCoordinate, local_x: i32, y: i32, local_z: i32, kind: Material) {
        self.regions
            .entry(coord.clone())
            .or_default()
            .blocks
            .insert((local_x, y, local_z), kind);
    }

    /// Spawn an entity into a region, loading it if needed.
    pub fn spawn(&self, coord: &RegionCoordinate, entity: WorldEntity) {
        self.regions
            .entry(coord.clone())
            .or_default()
            .entities
            .push(entity);
    }

    pub fn set_vertical_bounds(&self, world: impl Into<String>, bounds: VerticalBounds) {
        self.bounds.insert(world.into(), bounds);
    }

    pub fn set_signal(&self, value: f64) {
        *self.signal.lock().unwrap() = value;
    }

    /// Make the next `performance_signal` read fail, then recover.
    pub fn fail_next_signal(&self) {
        self.fail_next_signal.store(true, Ordering::SeqCst);
    }
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldProvider for MemoryWorld {
    fn loaded_regions(&self) -> Vec<RegionCoordinate> {
        let mut regions: Vec<RegionCoordinate> =
            self.regions.iter().map(|r| r.key().clone()).collect();
        // DashMap iteration order is arbitrary; keep enumeration stable.
        regions.sort();
        regions
    }

    fn is_loaded(&self, region: &RegionCoordinate) -> bool {
        self.regions.contains_key(region)
    }

    fn vertical_bounds(&self, world: &str) -> VerticalBounds {
        self.bounds
            .get(world)
            .map(|b| *b.value())
            .unwrap_or_default()
    }

    fn material_at(
        &self,
        region: &RegionCoordinate,
        local_x: i32,
        y: i32,
        local_z: i32,
    ) -> Option<Material> {
        self.regions
            .get(region)
            .and_then(|r| r.blocks.get(&(local_x, y, local_z)).cloned())
    }

    fn set_material(
        &self,
        region: &RegionCoordinate,
        local_x: i32,
        y: i32,
        local_z: i32,
        kind: Option<Material>,
    ) {
        if let Some(mut volume) = self.regions.get_mut(region) {
            match kind {
                Some(kind) => {
                    volume.blocks.insert((local_x, y, local_z), kind);
                }
                None => {
                    volume.blocks.remove(&(local_x, y, local_z));
                }
            }
        }
    }

    fn entities_in(&self, region: &RegionCoordinate) -> Vec<WorldEntity> {
        self.regions
            .get(region)
            .map(|r| r.entities.clone())
            .unwrap_or_default()
    }

    fn performance_signal(&self) -> Result<f64> {
        if self.fail_next_signal.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("signal source unavailable"));
        }
        Ok(*self.signal.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_and_read_back() {
        let world = MemoryWorld::new();
        let coord = RegionCoordinate::new("overworld", 0, 0);
        world.place(&coord, 3, 64, 5, Material::new("relay"));

        assert_eq!(
            world.material_at(&coord, 3, 64, 5),
            Some(Material::new("relay"))
        );
        assert_eq!(world.material_at(&coord, 3, 65, 5), None);
    }

    #[test]
    fn test_clear_position() {
        let world = MemoryWorld::new();
        let coord = RegionCoordinate::new("overworld", 0, 0);
        world.place(&coord, 0, 0, 0, Material::new("piston"));
        world.set_material(&coord, 0, 0, 0, None);
        assert_eq!(world.material_at(&coord, 0, 0, 0), None);
    }

    #[test]
    fn test_loaded_regions_sorted() {
        let world = MemoryWorld::new();
        world.load_region(RegionCoordinate::new("overworld", 5, 0));
        world.load_region(RegionCoordinate::new("overworld", -1, 2));
        world.load_region(RegionCoordinate::new("mining", 0, 0));

        let loaded = world.loaded_regions();
        assert_eq!(loaded.len(), 3);
        let mut sorted = loaded.clone();
        sorted.sort();
        assert_eq!(loaded, sorted);
    }

    #[test]
    fn test_signal_failure_recovers() {
        let world = MemoryWorld::new();
        world.set_signal(17.5);
        world.fail_next_signal();

        assert!(world.performance_signal().is_err());
        assert_eq!(world.performance_signal().unwrap(), 17.5);
    }
}
