//! Threshold monitor.
//!
//! Runs **every sensor poll, before schedule evaluation** and keeps a
//! per-channel bitmask of confirmed threshold violations.  A condition is
//! only confirmed (rising edge) or cleared (falling edge) after it has held
//! for `debounce_polls` consecutive valid readings.
//!
//! ## Violation lifecycle
//!
//! 1. A valid reading crosses a limit (e.g. power above `max_power_w`).
//! 2. The streak counter for that condition advances each poll it persists.
//! 3. At the debounce count the bit is set, one [`AlertEvent`] is raised
//!    and, for power/current, a [`SafetyAction::Engage`] is returned for the
//!    channel's relay.  The caller applies it in the same tick.
//! 4. Once the value has been back in range for the debounce count the bit
//!    clears (logged only, no alert).  When neither power nor current is
//!    violated on any channel bound to that relay, [`SafetyAction::Release`]
//!    is returned.
//!
//! Invalid readings neither advance nor reset a streak: a sensor dropout
//! must not clear an override, and must not confirm one either.

use std::collections::BTreeMap;

use log::{error, info};

use crate::config::ControllerConfig;
use crate::model::{AlertEvent, AlertIds, AlertKind, AlertTarget, ChannelId, RelayId, SensorReading};

/// Monitored conditions.  Discriminants are bit positions in the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    OverPower = 0,
    UnderVoltage = 1,
    OverCurrent = 2,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Self::OverPower, Self::UnderVoltage, Self::OverCurrent];

    pub const fn mask(self) -> u8 {
        1 << self as u8
    }

    pub fn alert_kind(self) -> AlertKind {
        match self {
            Self::OverPower => AlertKind::OverPower,
            Self::UnderVoltage => AlertKind::UnderVoltage,
            Self::OverCurrent => AlertKind::OverCurrent,
        }
    }

    /// Power and current violations cut the load; low voltage only alerts.
    pub fn cuts_load(self) -> bool {
        !matches!(self, Self::UnderVoltage)
    }
}

impl core::fmt::Display for Condition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OverPower => write!(f, "over-power"),
            Self::UnderVoltage => write!(f, "under-voltage"),
            Self::OverCurrent => write!(f, "over-current"),
        }
    }
}

/// Relay action demanded by a threshold edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyAction {
    /// Force the relay off with source `SafetyOverride`.
    Engage(RelayId),
    /// The monitored value is back in range; the override may lift.
    Release(RelayId),
}

#[derive(Debug, Default)]
pub struct ThresholdReport {
    pub alerts: Vec<AlertEvent>,
    pub actions: Vec<SafetyAction>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ChannelWatch {
    /// Confirmed violations.
    active: u8,
    /// Consecutive valid polls disagreeing with `active`, per condition.
    streak: [u8; 3],
}

const CUT_LOAD: u8 = Condition::OverPower.mask() | Condition::OverCurrent.mask();

impl ChannelWatch {
    fn cuts_load(&self) -> bool {
        self.active & CUT_LOAD != 0
    }
}

pub struct ThresholdMonitor {
    max_power_w: f32,
    min_voltage_v: f32,
    max_current_a: f32,
    debounce: u8,
    bindings: BTreeMap<ChannelId, RelayId>,
    watches: BTreeMap<ChannelId, ChannelWatch>,
}

impl ThresholdMonitor {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            max_power_w: config.safety.max_power_w,
            min_voltage_v: config.safety.min_voltage_v,
            max_current_a: config.safety.max_current_a,
            debounce: config.safety.debounce_polls,
            bindings: config
                .control
                .bindings
                .iter()
                .map(|b| (b.channel_id, b.relay_id))
                .collect(),
            watches: BTreeMap::new(),
        }
    }

    /// Evaluate one poll's readings.
    pub fn evaluate(
        &mut self,
        readings: &BTreeMap<ChannelId, SensorReading>,
        now_ms: u64,
        ids: &mut AlertIds,
    ) -> ThresholdReport {
        let mut report = ThresholdReport::default();
        let mut released = Vec::new();

        for reading in readings.values().filter(|r| r.valid) {
            let ch = reading.channel_id;
            let watch = self.watches.entry(ch).or_default();
            let was_cutting = watch.cuts_load();

            for cond in Condition::ALL {
                let (value, threshold, violated) = match cond {
                    Condition::OverPower => (reading.power, self.max_power_w, reading.power > self.max_power_w),
                    Condition::UnderVoltage => {
                        (reading.voltage, self.min_voltage_v, reading.voltage < self.min_voltage_v)
                    }
                    Condition::OverCurrent => {
                        (reading.current, self.max_current_a, reading.current > self.max_current_a)
                    }
                };

                let idx = cond as usize;
                let active = watch.active & cond.mask() != 0;
                if violated == active {
                    watch.streak[idx] = 0;
                    continue;
                }
                watch.streak[idx] = watch.streak[idx].saturating_add(1);
                if watch.streak[idx] < self.debounce {
                    continue;
                }
                watch.streak[idx] = 0;

                if violated {
                    watch.active |= cond.mask();
                    let alert = ids.raise(
                        cond.alert_kind(),
                        AlertTarget::Channel(ch),
                        value,
                        threshold,
                        now_ms,
                    );
                    error!(
                        "SAFETY: channel {ch} {cond} ({value:.1} vs {threshold:.1}), alert {}",
                        alert.alert_id
                    );
                    report.alerts.push(alert);
                } else {
                    watch.active &= !cond.mask();
                    info!("SAFETY: channel {ch} {cond} cleared ({value:.1})");
                }
            }

            let Some(&relay) = self.bindings.get(&ch) else {
                continue;
            };
            let cutting = watch.cuts_load();
            if cutting && !was_cutting {
                report.actions.push(SafetyAction::Engage(relay));
            } else if !cutting && was_cutting {
                released.push(relay);
            }
        }

        // A relay shared by several channels lifts only when all are clear.
        for relay in released {
            let still_held = self.bindings.iter().any(|(ch, &r)| {
                r == relay && self.watches.get(ch).is_some_and(ChannelWatch::cuts_load)
            });
            if !still_held {
                report.actions.push(SafetyAction::Release(relay));
            }
        }
        report
    }

    /// Whether `cond` is currently confirmed on `channel`.
    pub fn is_active(&self, channel: ChannelId, cond: Condition) -> bool {
        self.watches
            .get(&channel)
            .is_some_and(|w| w.active & cond.mask() != 0)
    }

    /// True if any channel holds a confirmed violation.
    #[cfg(test)]
    fn any_active(&self) -> bool {
        self.watches.values().any(|w| w.active != 0)
    }

    /// Whether some channel's violations drive `relay`.
    pub fn is_bound(&self, relay: RelayId) -> bool {
        self.bindings.values().any(|&r| r == relay)
    }

    /// Mark the channels bound to `relays` as over limit again after a
    /// restart.  A reading still out of range keeps the override without a
    /// second alert; a debounced recovery releases it as usual.
    pub fn restore_overrides(&mut self, relays: &[RelayId]) {
        for (&ch, relay) in &self.bindings {
            if relays.contains(relay) {
                let watch = self.watches.entry(ch).or_default();
                watch.active |= CUT_LOAD;
                watch.streak = [0; 3];
            }
        }
    }
}
