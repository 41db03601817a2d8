//! Domain records shared by every subsystem.
//!
//! These are plain data: no hardware handles, no clocks.  Timestamps are
//! milliseconds on the monotonic clock of the current boot.

use serde::{Deserialize, Serialize};

use crate::fsm::LinkState;

/// Meter channel number (1-based, matches the meter label on the board).
pub type ChannelId = u8;
/// Relay number (1-based, `relay1` … `relay8`).
pub type RelayId = u8;

// ---------------------------------------------------------------------------
// Sensor readings
// ---------------------------------------------------------------------------

/// One poll result for one metering channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub channel_id: ChannelId,
    /// RMS voltage (V).
    pub voltage: f32,
    /// RMS current (A).
    pub current: f32,
    /// Active power (W).
    pub power: f32,
    /// Energy counter since meter reset (kWh).
    pub energy_kwh: f32,
    /// Line frequency (Hz).
    pub frequency: f32,
    /// Power factor (0.0 – 1.0).
    pub power_factor: f32,
    /// Monotonic time of the poll (ms).
    pub timestamp_ms: u64,
    /// False when the read timed out, was malformed, implausible or stale.
    pub valid: bool,
}

impl SensorReading {
    /// Value written into every measurement field of an invalid reading.
    pub const SENTINEL: f32 = -1.0;

    /// An invalid reading carrying sentinel values.
    pub fn invalid(channel_id: ChannelId, timestamp_ms: u64) -> Self {
        Self {
            channel_id,
            voltage: Self::SENTINEL,
            current: Self::SENTINEL,
            power: Self::SENTINEL,
            energy_kwh: Self::SENTINEL,
            frequency: Self::SENTINEL,
            power_factor: Self::SENTINEL,
            timestamp_ms,
            valid: false,
        }
    }

    /// Age of the reading relative to `now_ms`.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp_ms)
    }
}

// ---------------------------------------------------------------------------
// Relay state
// ---------------------------------------------------------------------------

/// Who decided a relay's desired state.
///
/// Resolution order (highest first): `SafetyOverride`, then whichever of
/// `Manual` / `Schedule` is more recent, with `Manual` lapsing at expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaySource {
    Manual,
    Schedule,
    SafetyOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayState {
    pub relay_id: RelayId,
    pub desired_state: bool,
    /// Last state the output acknowledged.
    pub actual_state: bool,
    pub source: RelaySource,
    pub last_changed_at: u64,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    OverPower,
    UnderVoltage,
    OverCurrent,
    SensorFault,
    ConnectivityLoss,
    HardwareFault,
}

impl AlertKind {
    /// Threshold violations are the alerts that sound the buzzer.
    pub fn is_threshold_violation(self) -> bool {
        matches!(self, Self::OverPower | Self::UnderVoltage | Self::OverCurrent)
    }
}

/// What an alert refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTarget {
    Channel(ChannelId),
    Relay(RelayId),
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: u32,
    pub kind: AlertKind,
    pub target: AlertTarget,
    pub value: f32,
    pub threshold: f32,
    pub raised_at: u64,
    pub acknowledged: bool,
}

/// Allocates alert ids for one boot.  Ids start at 1.
#[derive(Debug, Default)]
pub struct AlertIds {
    last: u32,
}

impl AlertIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after `last`, so ids of alerts still queued from a previous
    /// boot are not reused.
    pub fn resume(last: u32) -> Self {
        Self { last }
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    pub fn raise(
        &mut self,
        kind: AlertKind,
        target: AlertTarget,
        value: f32,
        threshold: f32,
        raised_at: u64,
    ) -> AlertEvent {
        self.last = self.last.wrapping_add(1);
        AlertEvent {
            alert_id: self.last,
            kind,
            target,
            value,
            threshold,
            raised_at,
            acknowledged: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Device status heartbeat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub name: String,
    pub firmware_version: String,
    pub link_state: LinkState,
    pub uptime_ms: u64,
    pub boot_count: u32,
    pub queue_depth: usize,
    /// Acknowledged output state of every relay, in relay order.
    pub relays: Vec<bool>,
}

// ---------------------------------------------------------------------------
// Upload queue entries
// ---------------------------------------------------------------------------

/// Anything the controller sends to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UploadEntry {
    Reading(SensorReading),
    Relay(RelayState),
    Alert(AlertEvent),
    Status(DeviceStatus),
    History(SensorReading),
}

impl UploadEntry {
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::Alert(_))
    }

    /// Monotonic time the entry describes; used in the remote key.
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::Reading(r) | Self::History(r) => r.timestamp_ms,
            Self::Relay(s) => s.last_changed_at,
            Self::Alert(a) => a.raised_at,
            Self::Status(s) => s.uptime_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_reading_uses_sentinels() {
        let r = SensorReading::invalid(2, 500);
        assert!(!r.valid);
        assert_eq!(r.power, SensorReading::SENTINEL);
        assert_eq!(r.voltage, SensorReading::SENTINEL);
        assert_eq!(r.age_ms(1500), 1000);
        assert_eq!(r.age_ms(100), 0);
    }

    #[test]
    fn alert_ids_are_unique_and_start_at_one() {
        let mut ids = AlertIds::new();
        let a = ids.raise(AlertKind::OverPower, AlertTarget::Channel(1), 6000.0, 5000.0, 10);
        let b = ids.raise(AlertKind::SensorFault, AlertTarget::Channel(2), 3.0, 3.0, 20);
        assert_eq!(a.alert_id, 1);
        assert_eq!(b.alert_id, 2);
        assert!(!a.acknowledged);
    }

    #[test]
    fn only_threshold_kinds_are_violations() {
        assert!(AlertKind::OverPower.is_threshold_violation());
        assert!(AlertKind::UnderVoltage.is_threshold_violation());
        assert!(!AlertKind::SensorFault.is_threshold_violation());
        assert!(!AlertKind::ConnectivityLoss.is_threshold_violation());
    }
}
