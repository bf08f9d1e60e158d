use crate::backup::{AutomationBackup, BackupStore};
use crate::config::WardenConfig;
use crate::expiry::ExpiryScheduler;
use crate::monitor::{Decision, FreezeState, PerfMonitor};
use crate::persist::RecordArchive;
use crate::region::{RegionCoordinate, RegionRecord, AMNESTY_WINDOW_MS};
use crate::scanner::{MaterialClassifier, RegionLocks, RegionScanner};
use crate::scheduler::ScanQueue;
use crate::store::{FlagThresholds, RecordStore};
use crate::world::{BlockPos, Material, WorldProvider, REGION_SPAN};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::fs;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

#[cfg(test)]
mod tests;

/// Control tick period (ms). The monitor's own sampling gate decides how
/// often the signal is actually read.
pub const CONTROL_TICK_MS: u64 = 50;

/// Flagged-region page size for the presentation layer.
pub const ITEMS_PER_PAGE: usize = 45;

/// Failures of operator-invoked operations, surfaced to the caller rather
/// than aborting it.
#[derive(Debug, Clone, PartialEq)]
pub enum OpError {
    RegionUnavailable(RegionCoordinate),
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::RegionUnavailable(coord) => {
                write!(f, "region {} is not loaded", coord)
            }
        }
    }
}

impl std::error::Error for OpError {}

/// Result of an operator-invoked automation removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: usize,
}

/// Result of an operator-invoked automation restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub restored: usize,
    /// Positions left alone because unrelated activity filled them.
    pub skipped: usize,
}

/// One page of flagged regions, ordered ascending by x then z.
pub struct FlaggedPage {
    pub entries: Vec<(RegionCoordinate, Arc<RegionRecord>)>,
    pub page: usize,
    pub total_pages: usize,
    pub total_flagged: usize,
}

/// Load-adaptive region monitor.
///
/// Owns every core component and interprets the performance monitor's
/// decisions on each control tick. The host drives `run` (or `control_tick`
/// directly) and consults `should_suppress` from its event layer; operator
/// commands land on the public operations below.
pub struct MonitorEngine {
    config: WardenConfig,
    world: Arc<dyn WorldProvider>,
    store: Arc<RecordStore>,
    backups: BackupStore,
    scanner: RegionScanner,
    classifier: Arc<MaterialClassifier>,
    locks: Arc<RegionLocks>,
    freeze: Arc<FreezeState>,
    monitor: Mutex<PerfMonitor>,
    queue: ScanQueue,
    expiry: ExpiryScheduler,
    last_saved_at: AtomicI64,
}

impl MonitorEngine {
    pub fn new(config: WardenConfig, world: Arc<dyn WorldProvider>) -> Self {
        let store = Arc::new(RecordStore::new());
        let classifier = Arc::new(MaterialClassifier::new(
            config.scan.automation_materials.iter().cloned().map(Material),
        ));
        let locks = Arc::new(RegionLocks::new());
        let scanner = RegionScanner::new(
            Arc::clone(&world),
            Arc::clone(&store),
            Arc::clone(&classifier),
            Arc::clone(&locks),
        );
        let monitor = PerfMonitor::new(
            config.monitor.critical_performance_threshold,
            config.monitor.min_freeze_ms(),
            config.monitor.notification_cooldown_ms(),
        );
        let queue = ScanQueue::new(config.scan.regions_per_tick);
        let expiry = ExpiryScheduler::new(Arc::clone(&store));

        Self {
            world,
            backups: BackupStore::new(),
            scanner,
            classifier,
            locks,
            freeze: Arc::new(FreezeState::new()),
            monitor: Mutex::new(monitor),
            queue,
            expiry,
            store,
            last_saved_at: AtomicI64::new(Utc::now().timestamp_millis()),
            config,
        }
    }

    fn thresholds(&self) -> FlagThresholds {
        FlagThresholds {
            max_automation: self.config.scan.max_automation_threshold,
            max_entities: self.config.scan.max_entity_threshold,
        }
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ── Control tick ─────────────────────────────────────────────────────

    /// Run the control loop until the task is cancelled.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(tick_ms = CONTROL_TICK_MS, "Starting control loop");
        let mut timer = interval(Duration::from_millis(CONTROL_TICK_MS));
        loop {
            timer.tick().await;
            self.control_tick();
        }
    }

    pub fn control_tick(&self) {
        self.control_tick_at(Self::now_ms());
    }

    /// One cooperative control tick: sample the performance signal, apply
    /// the freeze state machine's decision, drain the scan queue budget, and
    /// run the autosave check.
    pub fn control_tick_at(&self, now_ms: i64) {
        let signal = match self.world.performance_signal() {
            Ok(value) => value,
            Err(e) => {
                let fallback = self.monitor.lock().unwrap().fallback_signal();
                warn!(
                    error = %e,
                    fallback,
                    "Performance signal unavailable, using last healthy value"
                );
                fallback
            }
        };

        let decision = self
            .monitor
            .lock()
            .unwrap()
            .observe(signal, now_ms, &self.freeze);

        match decision {
            Decision::Skipped | Decision::Normal | Decision::HoldFrozen => {}
            Decision::Critical { full_scan, warn } => {
                if let Some(value) = warn {
                    tracing::warn!(signal = value, "Performance signal critical");
                }
                if full_scan {
                    info!(signal, "Critical state entered, scanning all loaded regions");
                    self.scan_all_loaded(now_ms);
                }
                self.engage_freeze(now_ms, "system");

                if self.queue.is_empty() {
                    self.queue.refill_if_empty(self.world.loaded_regions());
                }
                for region in self.queue.drain_budget() {
                    if self.world.is_loaded(&region) {
                        self.scanner.scan(&region, now_ms);
                    }
                }
            }
            Decision::Recover => {
                self.queue.clear();
                if self.freeze.disengage() {
                    info!(signal, "Performance recovered, automation unfrozen");
                }
            }
        }

        let autosave_ms = self.config.persistence.autosave_interval_ms();
        if now_ms - self.last_saved_at.load(Ordering::SeqCst) >= autosave_ms {
            self.last_saved_at.store(now_ms, Ordering::SeqCst);
            if let Err(e) = self.save_records_at(now_ms) {
                // Retried on the next autosave cycle.
                error!(error = %e, "Autosave failed");
            }
        }
    }

    fn scan_all_loaded(&self, now_ms: i64) {
        for region in self.world.loaded_regions() {
            self.scanner.scan(&region, now_ms);
        }
    }

    fn engage_freeze(&self, now_ms: i64, initiator: &str) {
        if self.freeze.engage(now_ms) {
            warn!(initiator, "Automation frozen");
            self.settle_active_automation();
        }
    }

    /// Best-effort, non-retried sweep forcing every loaded automation device
    /// to settle. Rewriting a device's own kind in place resets its state.
    fn settle_active_automation(&self) {
        let mut settled: usize = 0;
        for region in self.world.loaded_regions() {
            let bounds = self.world.vertical_bounds(&region.world);
            for y in bounds.min_y..bounds.max_y {
                for local_x in 0..REGION_SPAN {
                    for local_z in 0..REGION_SPAN {
                        if let Some(kind) = self.world.material_at(&region, local_x, y, local_z)
                        {
                            if self.classifier.is_automation(&kind) {
                                self.world
                                    .set_material(&region, local_x, y, local_z, Some(kind));
                                settled += 1;
                            }
                        }
                    }
                }
            }
        }
        info!(settled, "Cancelled in-flight automation");
    }

    // ── Operator-invoked operations ──────────────────────────────────────

    /// Scan every loaded region synchronously, ignoring freeze and critical
    /// state.
    pub fn force_full_scan(&self) {
        let now_ms = Self::now_ms();
        info!("Forced scan of all loaded regions");
        self.scan_all_loaded(now_ms);
    }

    /// Explicit freeze override. System-initiated engagement goes through
    /// the same path with `initiator = "system"`.
    pub fn set_freeze(&self, frozen: bool, initiator: &str) {
        self.set_freeze_at(frozen, initiator, Self::now_ms());
    }

    pub fn set_freeze_at(&self, frozen: bool, initiator: &str, now_ms: i64) {
        if frozen {
            self.engage_freeze(now_ms, initiator);
        } else {
            if self.freeze.disengage() {
                warn!(initiator, "Automation unfrozen");
            }
            // An operator unfreeze always re-arms monitoring after a halt.
            self.monitor.lock().unwrap().set_enabled(true);
        }
    }

    /// Emergency stop: freeze and disable monitoring until an operator
    /// unfreeze re-enables it.
    pub fn halt(&self, initiator: &str) {
        let now_ms = Self::now_ms();
        self.engage_freeze(now_ms, initiator);
        self.monitor.lock().unwrap().set_enabled(false);
        warn!(initiator, "Automation halted, monitoring disabled");
    }

    pub fn remove_automation(
        &self,
        coord: &RegionCoordinate,
        initiator: &str,
    ) -> Result<RemoveOutcome, OpError> {
        self.remove_automation_at(coord, initiator, Self::now_ms())
    }

    /// Capture every automation device in the region into a fresh backup,
    /// clear the positions, mark the record cleared, and schedule its
    /// removal at the amnesty boundary. No-op when zero devices are found.
    pub fn remove_automation_at(
        &self,
        coord: &RegionCoordinate,
        initiator: &str,
        now_ms: i64,
    ) -> Result<RemoveOutcome, OpError> {
        if !self.world.is_loaded(coord) {
            return Err(OpError::RegionUnavailable(coord.clone()));
        }

        let lock = self.locks.for_coord(coord);
        let _guard = lock.lock().unwrap();

        let bounds = self.world.vertical_bounds(&coord.world);
        let mut backup = AutomationBackup::new(now_ms);

        for y in bounds.min_y..bounds.max_y {
            for local_x in 0..REGION_SPAN {
                for local_z in 0..REGION_SPAN {
                    if let Some(kind) = self.world.material_at(coord, local_x, y, local_z) {
                        if self.classifier.is_automation(&kind) {
                            backup
                                .positions
                                .insert(BlockPos::from_local(coord, local_x, y, local_z), kind);
                            self.world.set_material(coord, local_x, y, local_z, None);
                        }
                    }
                }
            }
        }

        if backup.is_empty() {
            return Ok(RemoveOutcome { removed: 0 });
        }

        let removed = backup.len();
        self.backups.insert(coord.clone(), backup);

        let record = self.store.get_or_create(coord, now_ms);
        record.mark_cleared(now_ms);
        self.expiry
            .schedule_removal(coord.clone(), Duration::from_millis(AMNESTY_WINDOW_MS as u64));

        info!(region = %coord, initiator, removed, "Automation removed");
        Ok(RemoveOutcome { removed })
    }

    pub fn restore_automation(
        &self,
        coord: &RegionCoordinate,
        initiator: &str,
    ) -> Result<RestoreOutcome, OpError> {
        if !self.world.is_loaded(coord) {
            return Err(OpError::RegionUnavailable(coord.clone()));
        }

        let lock = self.locks.for_coord(coord);
        let _guard = lock.lock().unwrap();

        // Consumed exactly once, regardless of how many positions were
        // still restorable.
        let backup = match self.backups.take(coord) {
            Some(backup) => backup,
            None => {
                return Ok(RestoreOutcome {
                    restored: 0,
                    skipped: 0,
                })
            }
        };

        let mut restored = 0;
        let mut skipped = 0;
        for (pos, kind) in backup.positions {
            let (local_x, y, local_z) = pos.to_local();
            if self.world.material_at(coord, local_x, y, local_z).is_none() {
                self.world.set_material(coord, local_x, y, local_z, Some(kind));
                restored += 1;
            } else {
                skipped += 1;
            }
        }

        info!(region = %coord, initiator, restored, skipped, "Automation restored");
        Ok(RestoreOutcome { restored, skipped })
    }

    // ── Read surface for the presentation layer ──────────────────────────

    pub fn list_flagged(&self, world: &str, page: usize) -> FlaggedPage {
        self.list_flagged_at(world, page, Self::now_ms())
    }

    pub fn list_flagged_at(&self, world: &str, page: usize, now_ms: i64) -> FlaggedPage {
        let flagged = self.store.list_flagged(
            world,
            self.thresholds(),
            self.config.retention.retention_ms(),
            now_ms,
        );
        let total_flagged = flagged.len();
        let total_pages = total_flagged.div_ceil(ITEMS_PER_PAGE);
        let entries = flagged
            .into_iter()
            .skip(page * ITEMS_PER_PAGE)
            .take(ITEMS_PER_PAGE)
            .collect();

        FlaggedPage {
            entries,
            page,
            total_pages,
            total_flagged,
        }
    }

    pub fn get_record(&self, coord: &RegionCoordinate) -> Option<Arc<RegionRecord>> {
        self.store.get(coord)
    }

    pub fn is_frozen(&self) -> bool {
        self.freeze.is_frozen()
    }

    /// Shared freeze state for the host's event-suppression boundary.
    pub fn freeze_state(&self) -> Arc<FreezeState> {
        Arc::clone(&self.freeze)
    }

    /// Gate consulted on every world-mutation attempt: suppress mutations of
    /// automation devices while frozen.
    pub fn should_suppress(&self, kind: &Material) -> bool {
        self.freeze.is_frozen() && self.classifier.is_automation(kind)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitor.lock().unwrap().is_enabled()
    }

    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    /// Regions queued for incremental scanning but not yet drained.
    pub fn pending_scans(&self) -> usize {
        self.queue.len()
    }

    // ── Persistence cycle ────────────────────────────────────────────────

    /// Write the full record archive. The archive is rewritten from the
    /// in-memory store on every save.
    pub fn save_records(&self) -> Result<()> {
        self.save_records_at(Self::now_ms())
    }

    pub fn save_records_at(&self, now_ms: i64) -> Result<()> {
        let path = &self.config.persistence.path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create archive directory")?;
        }

        let archive =
            RecordArchive::from_store(&self.store, now_ms, self.config.retention.retention_ms());
        archive.save_to_file(path)?;

        info!(
            records = archive.record_count(),
            path = %path.display(),
            "Record archive saved"
        );
        Ok(())
    }

    /// Startup load: restore the archive, prune expired entries (re-saving
    /// immediately when any were dropped), and schedule amnesty expiries for
    /// cleared records still inside their window.
    pub fn load_records(&self) -> Result<()> {
        let path = &self.config.persistence.path;
        if !path.exists() {
            info!(path = %path.display(), "No record archive found, starting empty");
            return Ok(());
        }

        let now_ms = Self::now_ms();
        let archive = match RecordArchive::load_from_file(path) {
            Ok(archive) => archive,
            Err(e) => {
                error!(error = %e, path = %path.display(), "Unreadable record archive, starting empty");
                return Ok(());
            }
        };

        let outcome =
            archive.restore_into(&self.store, now_ms, self.config.retention.retention_ms());
        info!(
            loaded = outcome.loaded,
            dropped = outcome.dropped,
            malformed = outcome.malformed,
            "Record archive loaded"
        );

        for (coord, remaining_ms) in &outcome.amnesty {
            self.expiry
                .schedule_removal(coord.clone(), Duration::from_millis(*remaining_ms as u64));
        }

        if outcome.dropped > 0 {
            self.save_records_at(now_ms)?;
        }
        Ok(())
    }
}
