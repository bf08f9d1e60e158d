use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};


/// Grace period after an admin-clear before the region's record is removed (ms).
pub const AMNESTY_WINDOW_MS: i64 = 600_000;

/// Identity of one region: world id plus two horizontal grid coordinates.
///
/// Renders as `"{world};{x};{z}"`; `FromStr` is the exact inverse. Parsing
/// splits from the right so a world name containing the delimiter still
/// round-trips.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoordinate {
    pub world: String,
    pub x: i32,
    pub z: i32,
}

impl RegionCoordinate {
    pub fn new(world: impl Into<String>, x: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            z,
        }
    }

    /// Short form without the world id, for operator-facing output.
    pub fn display_short(&self) -> String {
        format!("[{}, {}]", self.x, self.z)
    }
}

impl fmt::Display for RegionCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.world, self.x, self.z)
    }
}

/// Errors parsing a region coordinate key.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordParseError {
    MissingFields(String),
    InvalidNumber(String),
}

impl fmt::Display for CoordParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordParseError::MissingFields(s) => {
                write!(f, "coordinate key '{}' needs world;x;z", s)
            }
            CoordParseError::InvalidNumber(s) => {
                write!(f, "coordinate key '{}' has a non-numeric grid field", s)
            }
        }
    }
}

impl std::error::Error for CoordParseError {}

impl FromStr for RegionCoordinate {
    type Err = CoordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The last two fields are always z and x; everything left of them is
        // the world id, delimiters included.
        let mut parts = s.rsplitn(3, ';');
        let z = parts
            .next()
            .ok_or_else(|| CoordParseError::MissingFields(s.to_string()))?;
        let x = parts
            .next()
            .ok_or_else(|| CoordParseError::MissingFields(s.to_string()))?;
        let world = parts
            .next()
            .ok_or_else(|| CoordParseError::MissingFields(s.to_string()))?;

        let x: i32 = x
            .parse()
            .map_err(|_| CoordParseError::InvalidNumber(s.to_string()))?;
        let z: i32 = z
            .parse()
            .map_err(|_| CoordParseError::InvalidNumber(s.to_string()))?;

        Ok(RegionCoordinate::new(world, x, z))
    }
}

/// Mutable density statistics for one region.
///
/// Counters are independently atomic so the scanner can write while readers
/// iterate the store without a record-wide lock. `first_seen` is set once at
/// creation and never mutated.
pub struct RegionRecord {
    pub automation_count: AtomicU32,
    pub entity_count: AtomicU32,
    pub first_seen: i64,
    pub last_scanned: AtomicI64,
    cleared_by_admin: AtomicBool,
    cleared_at: AtomicI64,
}

impl RegionRecord {
    pub fn new(now_ms: i64) -> Self {
        Self {
            automation_count: AtomicU32::new(0),
            entity_count: AtomicU32::new(0),
            first_seen: now_ms,
            last_scanned: AtomicI64::new(now_ms),
            cleared_by_admin: AtomicBool::new(false),
            cleared_at: AtomicI64::new(0),
        }
    }

    /// Write the results of a completed scan.
    pub fn record_scan(&self, automation: u32, entities: u32, now_ms: i64) {
        self.automation_count.store(automation, Ordering::Relaxed);
        self.entity_count.store(entities, Ordering::Relaxed);
        self.last_scanned.store(now_ms, Ordering::SeqCst);
    }

    pub fn automation(&self) -> u32 {
        self.automation_count.load(Ordering::Relaxed)
    }

    pub fn entities(&self) -> u32 {
        self.entity_count.load(Ordering::Relaxed)
    }

    pub fn last_scanned_ms(&self) -> i64 {
        self.last_scanned.load(Ordering::SeqCst)
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared_by_admin.load(Ordering::SeqCst)
    }

    pub fn cleared_at_ms(&self) -> i64 {
        self.cleared_at.load(Ordering::SeqCst)
    }

    /// Flag the record as cleared by an operator. The timestamp is written
    /// before the flag so readers observing `cleared` always see a valid
    /// `cleared_at`.
    pub fn mark_cleared(&self, now_ms: i64) {
        self.cleared_at.store(now_ms, Ordering::SeqCst);
        self.cleared_by_admin.store(true, Ordering::SeqCst);
    }

    /// Retention check: stale uncleared records expire after the retention
    /// window, cleared records after the amnesty window.
    pub fn is_expired(&self, now_ms: i64, retention_ms: i64) -> bool {
        if self.is_cleared() {
            now_ms - self.cleared_at_ms() > AMNESTY_WINDOW_MS
        } else {
            now_ms - self.last_scanned_ms() > retention_ms
        }
    }

    /// Remaining time until a cleared record's amnesty expires. `None` when
    /// the record is not cleared; zero when already past the boundary.
    pub fn amnesty_remaining_ms(&self, now_ms: i64) -> Option<i64> {
        if !self.is_cleared() {
            return None;
        }
        let elapsed = now_ms - self.cleared_at_ms();
        Some((AMNESTY_WINDOW_MS - elapsed).max(0))
    }

    pub fn to_persisted(&self) -> PersistedRecord {
        PersistedRecord {
            automation: self.automation(),
            entities: self.entities(),
            first_detected: self.first_seen,
            last_scanned: self.last_scanned_ms(),
            cleared: self.is_cleared(),
            cleared_time: self.cleared_at_ms(),
        }
    }

    pub fn from_persisted(p: &PersistedRecord) -> Self {
        Self {
            automation_count: AtomicU32::new(p.automation),
            entity_count: AtomicU32::new(p.entities),
            first_seen: p.first_detected,
            last_scanned: AtomicI64::new(p.last_scanned),
            cleared_by_admin: AtomicBool::new(p.cleared),
            cleared_at: AtomicI64::new(p.cleared_time),
        }
    }
}

/// Serde mirror of a region record with the on-disk field names.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PersistedRecord {
    pub automation: u32,
    pub entities: u32,
    #[serde(rename = "firstDetected")]
    pub first_detected: i64,
    #[serde(rename = "lastScanned")]
    pub last_scanned: i64,
    #[serde(default)]
    pub cleared: bool,
    #[serde(rename = "clearedTime")]
    #[serde(default)]
    pub cleared_time: i64,
}
