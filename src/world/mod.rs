use crate::region::RegionCoordinate;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod memory;

pub use memory::MemoryWorld;

/// Horizontal footprint of a region, in positions per axis.
pub const REGION_SPAN: i32 = 16;

/// A block/fixture kind. Kinds are host-defined strings; the monitor only
/// ever compares them against its configured automation set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Material(pub String);

impl Material {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Absolute block position within a world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    /// Absolute position of a local offset inside a region.
    pub fn from_local(region: &RegionCoordinate, local_x: i32, y: i32, local_z: i32) -> Self {
        Self {
            x: region.x * REGION_SPAN + local_x,
            y,
            z: region.z * REGION_SPAN + local_z,
        }
    }

    /// Local offset of this position inside its region.
    pub fn to_local(&self) -> (i32, i32, i32) {
        (
            self.x.rem_euclid(REGION_SPAN),
            self.y,
            self.z.rem_euclid(REGION_SPAN),
        )
    }
}

/// A non-block actor present in a region.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldEntity {
    pub id: String,
    /// Operator-controlled actors are excluded from density counts.
    pub operator: bool,
}

impl WorldEntity {
    pub fn npc(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operator: false,
        }
    }

    pub fn operator(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operator: true,
        }
    }
}

/// Vertical extent of a world. `max_y` is exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerticalBounds {
    pub min_y: i32,
    pub max_y: i32,
}

impl Default for VerticalBounds {
    fn default() -> Self {
        Self {
            min_y: -64,
            max_y: 320,
        }
    }
}

/// Access to the host simulation's world state.
///
/// The monitor consumes this boundary; it never implements world mechanics
/// itself. `material_at` returns `None` for empty positions; `set_material`
/// with `None` clears a position.
pub trait WorldProvider: Send + Sync {
    /// Every currently loaded region across every world.
    fn loaded_regions(&self) -> Vec<RegionCoordinate>;

    fn is_loaded(&self, region: &RegionCoordinate) -> bool;

    fn vertical_bounds(&self, world: &str) -> VerticalBounds;

    fn material_at(
        &self,
        region: &RegionCoordinate,
        local_x: i32,
        y: i32,
        local_z: i32,
    ) -> Option<Material>;

    fn set_material(
        &self,
        region: &RegionCoordinate,
        local_x: i32,
        y: i32,
        local_z: i32,
        kind: Option<Material>,
    );

    fn entities_in(&self, region: &RegionCoordinate) -> Vec<WorldEntity>;

    /// Scalar health metric of the host's update rate; higher is healthier.
    /// Reads can fail transiently; callers fall back to the last healthy
    /// value for that tick.
    fn performance_signal(&self) -> Result<f64>;
}
