//! Sensor subsystem: the PZEM frame decoder and the polling [`SensorReader`].
//!
//! The reader owns the live table (latest reading per channel) and the
//! per-channel failure counters.  It never touches relays or the network;
//! consumers get readings and fault alerts back from [`SensorReader::poll`].

pub mod pzem;

use std::collections::BTreeMap;

use log::{info, warn};

use crate::app::ports::SensorBus;
use crate::config::ControllerConfig;
use crate::model::{AlertEvent, AlertIds, AlertKind, AlertTarget, ChannelId, SensorReading};

/// Result of one poll across every channel.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub readings: BTreeMap<ChannelId, SensorReading>,
    /// SensorFault alerts raised by this poll (at most one per episode).
    pub alerts: Vec<AlertEvent>,
}

#[derive(Debug)]
struct ChannelState {
    id: ChannelId,
    latest: SensorReading,
    consecutive_failures: u32,
    /// Set once the fault alert for the current episode has been raised.
    fault_raised: bool,
}

pub struct SensorReader {
    channels: Vec<ChannelState>,
    read_timeout_ms: u64,
    stale_after_ms: u64,
    fault_after: u32,
}

impl SensorReader {
    pub fn new(config: &ControllerConfig) -> Self {
        let channels = config
            .channel_ids()
            .map(|id| ChannelState {
                id,
                latest: SensorReading::invalid(id, 0),
                consecutive_failures: 0,
                fault_raised: false,
            })
            .collect();
        Self {
            channels,
            read_timeout_ms: config.timing.sensor_read_timeout_ms,
            stale_after_ms: config.timing.sensor_interval_ms * 2,
            fault_after: u32::from(config.safety.sensor_fault_after),
        }
    }

    /// Read every channel once.  Each read is bounded by the configured
    /// timeout; a failed read yields an invalid reading with sentinel values.
    pub fn poll(
        &mut self,
        bus: &mut impl SensorBus,
        now_ms: u64,
        ids: &mut AlertIds,
    ) -> PollOutcome {
        let mut out = PollOutcome::default();

        for ch in &mut self.channels {
            let result = bus
                .read_channel(ch.id, self.read_timeout_ms)
                .and_then(|frame| pzem::decode(&frame))
                .and_then(|m| m.check_plausible().map(|()| m));

            let reading = match result {
                Ok(m) => {
                    if ch.consecutive_failures > 0 {
                        info!(
                            "Sensors: channel {} recovered after {} failed reads",
                            ch.id, ch.consecutive_failures
                        );
                    }
                    ch.consecutive_failures = 0;
                    ch.fault_raised = false;
                    SensorReading {
                        channel_id: ch.id,
                        voltage: m.voltage,
                        current: m.current,
                        power: m.power,
                        energy_kwh: m.energy_kwh,
                        frequency: m.frequency,
                        power_factor: m.power_factor,
                        timestamp_ms: now_ms,
                        valid: true,
                    }
                }
                Err(e) => {
                    ch.consecutive_failures = ch.consecutive_failures.saturating_add(1);
                    warn!(
                        "Sensors: channel {} read failed ({}), {} in a row",
                        ch.id, e, ch.consecutive_failures
                    );
                    if !ch.fault_raised && ch.consecutive_failures >= self.fault_after {
                        ch.fault_raised = true;
                        let alert = ids.raise(
                            AlertKind::SensorFault,
                            AlertTarget::Channel(ch.id),
                            ch.consecutive_failures as f32,
                            self.fault_after as f32,
                            now_ms,
                        );
                        warn!("Sensors: channel {} fault (alert {})", ch.id, alert.alert_id);
                        out.alerts.push(alert);
                    }
                    SensorReading::invalid(ch.id, now_ms)
                }
            };

            ch.latest = reading;
            out.readings.insert(ch.id, reading);
        }
        out
    }

    /// Latest reading for `channel`, reported invalid once it is older than
    /// twice the poll interval.
    pub fn latest(&self, channel: ChannelId, now_ms: u64) -> Option<SensorReading> {
        let ch = self.channels.iter().find(|c| c.id == channel)?;
        let r = ch.latest;
        if r.valid && r.age_ms(now_ms) > self.stale_after_ms {
            return Some(SensorReading::invalid(channel, r.timestamp_ms));
        }
        Some(r)
    }

    /// Live table with staleness applied.
    pub fn snapshot(&self, now_ms: u64) -> BTreeMap<ChannelId, SensorReading> {
        self.channels
            .iter()
            .filter_map(|c| self.latest(c.id, now_ms).map(|r| (c.id, r)))
            .collect()
    }

    pub fn consecutive_failures(&self, channel: ChannelId) -> u32 {
        self.channels
            .iter()
            .find(|c| c.id == channel)
            .map_or(0, |c| c.consecutive_failures)
    }

    /// `true` when no channel has a current valid reading.
    pub fn all_lost(&self, now_ms: u64) -> bool {
        self.snapshot(now_ms).values().all(|r| !r.valid)
    }
}
