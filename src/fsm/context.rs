//! Shared mutable context threaded through every FSM handler.
//!
//! `SupervisorContext` is the blackboard the state handlers read from and
//! write to.  The supervisor fills in the health inputs before each tick
//! and reads back the outputs (safe-mode request, pull gate, LED pattern)
//! afterwards.

use crate::config::ControllerConfig;
use crate::drivers::status_led::LedPattern;

// ---------------------------------------------------------------------------
// Health inputs (written by the supervisor before each tick)
// ---------------------------------------------------------------------------

/// Point-in-time view of the controller's health.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSnapshot {
    /// Connectivity collaborator reports the link as up.
    pub link_up: bool,
    /// At least one channel produced a valid reading since boot.
    pub initial_read_ok: bool,
    /// At least one channel currently has a fresh valid reading.
    pub sensors_ok: bool,
    /// Consecutive sync cycles that failed (link down, push or pull error).
    pub sync_failures: u32,
    /// Monotonic time at which every channel was first seen lost, if all
    /// channels are currently lost.
    pub all_lost_since: Option<u64>,
    /// Monotonic time of this tick.
    pub now_ms: u64,
}

// ---------------------------------------------------------------------------
// Outputs (written by state handlers; consumed by the supervisor)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOutputs {
    /// All relays must be held off.
    pub safe_mode: bool,
    /// Remote commands may be pulled this cycle.
    pub pull_enabled: bool,
    pub led: LedPattern,
}

impl Default for SupervisorOutputs {
    fn default() -> Self {
        Self {
            safe_mode: false,
            pull_enabled: true,
            led: LedPattern::FastBlink,
        }
    }
}

// ---------------------------------------------------------------------------
// SupervisorContext
// ---------------------------------------------------------------------------

pub struct SupervisorContext {
    pub health: HealthSnapshot,
    pub outputs: SupervisorOutputs,

    // -- Thresholds (copied from config) --
    pub degrade_after_failures: u32,
    pub safe_mode_after_ms: u64,
}

impl SupervisorContext {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            health: HealthSnapshot::default(),
            outputs: SupervisorOutputs::default(),
            degrade_after_failures: u32::from(config.sync.degrade_after_failures),
            safe_mode_after_ms: config.safety.safe_mode_after_ms,
        }
    }

    /// Every sensor channel has been lost for at least `safe_mode_after_ms`.
    pub fn sustained_sensor_loss(&self) -> bool {
        self.health
            .all_lost_since
            .is_some_and(|since| self.health.now_ms.saturating_sub(since) >= self.safe_mode_after_ms)
    }

    pub fn sync_degraded(&self) -> bool {
        self.health.sync_failures >= self.degrade_after_failures
    }
}
