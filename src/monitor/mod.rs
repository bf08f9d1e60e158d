use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};


/// Minimum spacing between performance samples (ms). The control tick fires
/// far more often than the signal is worth reading.
pub const SAMPLE_INTERVAL_MS: i64 = 1_000;

/// A new warning is only surfaced when the signal moved by more than this
/// since the last reported value.
pub const SIGNAL_REPORT_DELTA: f64 = 1.0;

/// Process-wide freeze flag shared between the control loop and the host's
/// event-suppression boundary.
///
/// All transitions go through `engage`/`disengage`; no other code path
/// mutates it.
pub struct FreezeState {
    frozen: AtomicBool,
    frozen_since: AtomicI64,
    last_notified: AtomicI64,
}

impl FreezeState {
    pub fn new() -> Self {
        Self {
            frozen: AtomicBool::new(false),
            frozen_since: AtomicI64::new(0),
            last_notified: AtomicI64::new(0),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Engage the freeze. Returns true only on a fresh engagement;
    /// re-engaging an already-frozen state is a no-op.
    pub fn engage(&self, now_ms: i64) -> bool {
        if self.frozen.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.frozen_since.store(now_ms, Ordering::SeqCst);
        true
    }

    /// Disengage the freeze. Returns true only when it was engaged.
    pub fn disengage(&self) -> bool {
        self.frozen.swap(false, Ordering::SeqCst)
    }

    pub fn frozen_since_ms(&self) -> i64 {
        self.frozen_since.load(Ordering::SeqCst)
    }

    /// Elapsed time since engagement, `None` when not frozen.
    pub fn frozen_for_ms(&self, now_ms: i64) -> Option<i64> {
        if self.is_frozen() {
            Some(now_ms - self.frozen_since_ms())
        } else {
            None
        }
    }

    pub fn last_notified_ms(&self) -> i64 {
        self.last_notified.load(Ordering::SeqCst)
    }

    pub fn note_notified(&self, now_ms: i64) {
        self.last_notified.store(now_ms, Ordering::SeqCst);
    }
}

impl Default for FreezeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one monitor tick. The engine interprets these; the monitor
/// itself performs no side effects beyond its own bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decision {
    /// Sampling gate not due, or monitoring disabled.
    Skipped,
    /// Healthy signal, no critical episode in progress.
    Normal,
    /// Signal below threshold. `full_scan` is set on the first critical
    /// sample of an episode; `warn` carries the signal value when a warning
    /// should be surfaced.
    Critical { full_scan: bool, warn: Option<f64> },
    /// Signal recovered but the minimum freeze duration has not elapsed;
    /// the freeze holds and the episode stays critical.
    HoldFrozen,
    /// Signal recovered past the duration floor: unfreeze, discard the scan
    /// queue, re-arm the full-scan trigger.
    Recover,
}

/// Performance monitor state machine.
///
/// Pure decision logic with an injected clock; only the control tick calls
/// `observe`, so the mutable state needs no internal locking.
pub struct PerfMonitor {
    threshold: f64,
    min_freeze_ms: i64,
    warn_cooldown_ms: i64,
    enabled: bool,
    last_sample_at: i64,
    last_healthy: f64,
    last_reported: f64,
    first_critical: bool,
    critical: bool,
}

impl PerfMonitor {
    pub fn new(threshold: f64, min_freeze_ms: i64, warn_cooldown_ms: i64) -> Self {
        Self {
            threshold,
            min_freeze_ms,
            warn_cooldown_ms,
            enabled: true,
            last_sample_at: i64::MIN / 2,
            // A failed read before any healthy sample is treated as healthy.
            last_healthy: threshold,
            // Infinity so the first critical sample always clears the delta gate.
            last_reported: f64::INFINITY,
            first_critical: true,
            critical: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Last-known-healthy value, the fallback for a failed signal read.
    pub fn fallback_signal(&self) -> f64 {
        self.last_healthy
    }

    pub fn in_critical_episode(&self) -> bool {
        self.critical
    }

    /// Feed one sample. `now_ms` is the control tick's clock; `freeze` is
    /// consulted for the hysteresis floor and warning cooldown.
    pub fn observe(&mut self, signal: f64, now_ms: i64, freeze: &FreezeState) -> Decision {
        if !self.enabled {
            return Decision::Skipped;
        }
        if now_ms - self.last_sample_at < SAMPLE_INTERVAL_MS {
            return Decision::Skipped;
        }
        self.last_sample_at = now_ms;

        if signal < self.threshold {
            self.critical = true;
            let full_scan = self.first_critical;
            self.first_critical = false;
            let warn = self.gate_warning(signal, now_ms, freeze);
            return Decision::Critical { full_scan, warn };
        }

        self.last_healthy = signal;

        if !self.critical {
            return Decision::Normal;
        }

        // Healthy sample during a critical episode: hold the freeze until
        // the duration floor passes, so one good sample can't flap it.
        if let Some(elapsed) = freeze.frozen_for_ms(now_ms) {
            if elapsed < self.min_freeze_ms {
                return Decision::HoldFrozen;
            }
        }

        self.critical = false;
        self.first_critical = true;
        Decision::Recover
    }

    fn gate_warning(&mut self, signal: f64, now_ms: i64, freeze: &FreezeState) -> Option<f64> {
        let moved = (signal - self.last_reported).abs() > SIGNAL_REPORT_DELTA;
        let cooled = now_ms - freeze.last_notified_ms() > self.warn_cooldown_ms;
        if moved && cooled {
            self.last_reported = signal;
            freeze.note_notified(now_ms);
            Some(signal)
        } else {
            None
        }
    }
}
