//! Relay bank: arbitration between control sources and write-through to
//! the relay outputs.
//!
//! Each relay keeps one layer per source and resolves its desired state in
//! a fixed order, highest first:
//!
//! 1. safety override (forced off)
//! 2. safe mode (all relays forced off)
//! 3. whichever of the manual hold and the schedule target changed last,
//!    with the manual hold lapsing at its expiry
//! 4. otherwise the relay keeps its current state
//!
//! Every change is written through immediately.  A write the hardware does
//! not acknowledge leaves the relay pending; [`RelayBank::tick`] retries it
//! and repeated failures are reported through [`RelayBank::take_faults`].

use log::{info, warn};

use crate::app::ports::RelayOutput;
use crate::config::ControllerConfig;
use crate::error::{ConfigInvalid, Error, RelayError, Result};
use crate::model::{RelayId, RelaySource, RelayState};

#[derive(Debug, Clone, Copy)]
struct ManualHold {
    on: bool,
    set_at: u64,
    expires_at: u64,
}

#[derive(Debug, Clone, Copy)]
struct ScheduleTarget {
    on: bool,
    /// When the schedule last changed its mind for this relay.
    changed_at: u64,
}

#[derive(Debug)]
struct RelaySlot {
    state: RelayState,
    override_active: bool,
    manual: Option<ManualHold>,
    schedule: Option<ScheduleTarget>,
    write_pending: bool,
    write_failures: u32,
    fault_reported: bool,
}

/// A relay whose output has failed `write_failures` consecutive writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareFault {
    pub relay_id: RelayId,
    pub write_failures: u32,
}

pub struct RelayBank {
    slots: Vec<RelaySlot>,
    safe_mode: bool,
    manual_expiry_ms: u64,
    fault_after: u32,
    changes: Vec<RelayState>,
    faults: Vec<HardwareFault>,
    dirty: bool,
}

impl RelayBank {
    /// All relays start off with a pending write, so the outputs reach a
    /// known state on the first tick.
    pub fn new(config: &ControllerConfig) -> Self {
        let slots = config
            .relay_ids()
            .map(|relay_id| RelaySlot {
                state: RelayState {
                    relay_id,
                    desired_state: false,
                    actual_state: false,
                    source: RelaySource::Schedule,
                    last_changed_at: 0,
                },
                override_active: false,
                manual: None,
                schedule: None,
                write_pending: true,
                write_failures: 0,
                fault_reported: false,
            })
            .collect();
        Self {
            slots,
            safe_mode: false,
            manual_expiry_ms: config.control.manual_expiry_ms,
            fault_after: u32::from(config.safety.hardware_fault_after),
            changes: Vec::new(),
            faults: Vec::new(),
            dirty: false,
        }
    }

    fn index(&self, relay: RelayId) -> Result<usize> {
        let idx = usize::from(relay).wrapping_sub(1);
        if idx < self.slots.len() {
            Ok(idx)
        } else {
            Err(Error::Config(ConfigInvalid("unknown relay id")))
        }
    }

    /// Request `desired` for `relay` on behalf of `source` and write the
    /// resolved state through.  Returns the acknowledged output state.
    pub fn apply(
        &mut self,
        out: &mut impl RelayOutput,
        relay: RelayId,
        desired: bool,
        source: RelaySource,
        now_ms: u64,
    ) -> Result<bool> {
        let idx = self.index(relay)?;
        let slot = &mut self.slots[idx];

        match source {
            RelaySource::SafetyOverride => {
                if desired {
                    return Err(Error::Config(ConfigInvalid("safety override can only force off")));
                }
                if !slot.override_active {
                    warn!("Relay {relay}: safety override engaged");
                }
                slot.override_active = true;
            }
            RelaySource::Manual => {
                if slot.override_active {
                    return Err(RelayError::OverrideActive(relay).into());
                }
                if self.safe_mode {
                    return Err(RelayError::SafeMode.into());
                }
                slot.manual = Some(ManualHold {
                    on: desired,
                    set_at: now_ms,
                    expires_at: now_ms.saturating_add(self.manual_expiry_ms),
                });
            }
            RelaySource::Schedule => {
                let changed = slot.schedule.is_none_or(|t| t.on != desired);
                if changed {
                    slot.schedule = Some(ScheduleTarget {
                        on: desired,
                        changed_at: now_ms,
                    });
                }
            }
        }

        self.settle(out, idx, now_ms);
        Ok(self.slots[idx].state.actual_state)
    }

    /// Lift the safety override on `relay`.  Control returns to the manual
    /// and schedule layers.
    pub fn clear_override(&mut self, out: &mut impl RelayOutput, relay: RelayId, now_ms: u64) -> Result<bool> {
        let idx = self.index(relay)?;
        if self.slots[idx].override_active {
            info!("Relay {relay}: safety override cleared");
            self.slots[idx].override_active = false;
            self.settle(out, idx, now_ms);
        }
        Ok(self.slots[idx].state.actual_state)
    }

    /// Drop the manual hold on `relay` before its expiry.
    pub fn release_manual(&mut self, out: &mut impl RelayOutput, relay: RelayId, now_ms: u64) -> Result<bool> {
        let idx = self.index(relay)?;
        if self.slots[idx].manual.take().is_some() {
            info!("Relay {relay}: manual hold released");
            self.settle(out, idx, now_ms);
        }
        Ok(self.slots[idx].state.actual_state)
    }

    /// Feed one schedule evaluation.  Relays absent from `targets` lose
    /// their schedule layer and keep their current state.
    pub fn apply_schedule(
        &mut self,
        out: &mut impl RelayOutput,
        targets: &std::collections::BTreeMap<RelayId, bool>,
        now_ms: u64,
    ) {
        for idx in 0..self.slots.len() {
            let relay = self.slots[idx].state.relay_id;
            match targets.get(&relay) {
                Some(&on) => {
                    // Index is in range by construction.
                    let _ = self.apply(out, relay, on, RelaySource::Schedule, now_ms);
                }
                None => {
                    if self.slots[idx].schedule.take().is_some() {
                        self.settle(out, idx, now_ms);
                    }
                }
            }
        }
    }

    /// Enter or leave safe mode.  Entering drops every manual hold and
    /// forces all relays off.
    pub fn set_safe_mode(&mut self, out: &mut impl RelayOutput, on: bool, now_ms: u64) {
        if self.safe_mode == on {
            return;
        }
        self.safe_mode = on;
        self.dirty = true;
        if on {
            warn!("Relays: safe mode, all outputs off");
            for slot in &mut self.slots {
                slot.manual = None;
            }
        } else {
            info!("Relays: safe mode lifted");
        }
        for idx in 0..self.slots.len() {
            self.settle(out, idx, now_ms);
        }
    }

    /// Expire manual holds and retry unacknowledged writes.  Never blocks
    /// beyond one write per pending relay.
    pub fn tick(&mut self, out: &mut impl RelayOutput, now_ms: u64) {
        for idx in 0..self.slots.len() {
            let slot = &mut self.slots[idx];
            if let Some(hold) = slot.manual {
                if now_ms >= hold.expires_at {
                    info!("Relay {}: manual hold expired", slot.state.relay_id);
                    slot.manual = None;
                }
            }
            self.settle(out, idx, now_ms);
        }
    }

    /// Re-seed from persisted state.  After a safe-mode shutdown every
    /// relay starts off; otherwise the persisted desired state is
    /// re-asserted.  Manual holds are not restored.
    pub fn restore(&mut self, persisted: &[RelayState], was_safe_mode: bool) {
        for slot in &mut self.slots {
            let saved = persisted.iter().find(|s| s.relay_id == slot.state.relay_id);
            slot.state.desired_state = match saved {
                Some(s) if !was_safe_mode => s.desired_state,
                _ => false,
            };
            slot.state.source = match saved {
                Some(_) if was_safe_mode => RelaySource::SafetyOverride,
                Some(s) => s.source,
                None => RelaySource::Schedule,
            };
            slot.state.last_changed_at = 0;
            slot.write_pending = true;
        }
        info!(
            "Relays: restored {} states{}",
            persisted.len(),
            if was_safe_mode { " (safe mode, all off)" } else { "" }
        );
    }

    /// Re-engage a safety override carried over from before a restart.
    /// Only the threshold monitor's release lifts it again.
    pub fn hold_override(&mut self, relay: RelayId) {
        if let Ok(idx) = self.index(relay) {
            let slot = &mut self.slots[idx];
            slot.override_active = true;
            slot.write_pending = true;
        }
    }

    /// Resolve the layers of one relay and write through if needed.
    fn settle(&mut self, out: &mut impl RelayOutput, idx: usize, now_ms: u64) {
        let safe_mode = self.safe_mode;
        let slot = &mut self.slots[idx];
        let relay = slot.state.relay_id;

        let manual = slot.manual.filter(|h| now_ms < h.expires_at);
        let (desired, source) = if slot.override_active {
            (false, RelaySource::SafetyOverride)
        } else if safe_mode {
            (false, RelaySource::SafetyOverride)
        } else {
            match (manual, slot.schedule) {
                (Some(m), Some(s)) if s.changed_at > m.set_at => (s.on, RelaySource::Schedule),
                (Some(m), _) => (m.on, RelaySource::Manual),
                (None, Some(s)) => (s.on, RelaySource::Schedule),
                (None, None) => (slot.state.desired_state, slot.state.source),
            }
        };

        if desired != slot.state.desired_state || source != slot.state.source {
            if desired != slot.state.desired_state {
                slot.state.last_changed_at = now_ms;
                slot.write_pending = true;
            }
            slot.state.desired_state = desired;
            slot.state.source = source;
            self.dirty = true;
        }

        if !slot.write_pending && slot.state.actual_state == desired {
            return;
        }

        match out.write_output(relay, desired) {
            Ok(()) => {
                if slot.write_failures > 0 {
                    info!("Relay {relay}: write acknowledged after {} failures", slot.write_failures);
                }
                let changed = slot.state.actual_state != desired;
                slot.state.actual_state = desired;
                slot.write_pending = false;
                slot.write_failures = 0;
                slot.fault_reported = false;
                if changed {
                    info!("Relay {relay}: {} ({:?})", if desired { "ON" } else { "OFF" }, source);
                }
                self.changes.push(slot.state);
                self.dirty = true;
            }
            Err(e) => {
                slot.write_pending = true;
                slot.write_failures = slot.write_failures.saturating_add(1);
                warn!("Relay {relay}: {e} ({} in a row)", slot.write_failures);
                if !slot.fault_reported && slot.write_failures >= self.fault_after {
                    slot.fault_reported = true;
                    self.faults.push(HardwareFault {
                        relay_id: relay,
                        write_failures: slot.write_failures,
                    });
                }
            }
        }
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn state(&self, relay: RelayId) -> Option<RelayState> {
        self.index(relay).ok().map(|i| self.slots[i].state)
    }

    pub fn states(&self) -> impl Iterator<Item = RelayState> + '_ {
        self.slots.iter().map(|s| s.state)
    }

    pub fn is_overridden(&self, relay: RelayId) -> bool {
        self.index(relay).is_ok_and(|i| self.slots[i].override_active)
    }

    pub fn is_safe_mode(&self) -> bool {
        self.safe_mode
    }

    /// Relay states acknowledged since the last call, for upload.
    pub fn take_changes(&mut self) -> Vec<RelayState> {
        core::mem::take(&mut self.changes)
    }

    /// Relays that crossed the hardware-fault threshold since the last call.
    pub fn take_faults(&mut self) -> Vec<HardwareFault> {
        core::mem::take(&mut self.faults)
    }

    /// Returns `true` once after any state change that should be persisted.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }
}
