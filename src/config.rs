//! Controller configuration.
//!
//! One immutable [`ControllerConfig`] is built at startup (defaults, then
//! the NVS override if present) and passed by reference to every
//! subsystem.  `Default` reproduces the factory constants of the board.

use serde::{Deserialize, Serialize};

use crate::error::ConfigInvalid;
use crate::model::{ChannelId, RelayId};
use crate::pins;

/// Top-level configuration, grouped by concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub device: DeviceInfo,
    pub hardware: HardwareConfig,
    pub timing: TimingConfig,
    pub safety: SafetyConfig,
    pub control: ControlConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub name: String,
    pub firmware_version: String,
    pub hardware_version: String,
    /// Offset of local wall time from UTC, in seconds.
    pub tz_offset_secs: i32,
}

/// One PZEM meter on the multiplexed UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterConfig {
    pub channel_id: ChannelId,
    pub rx_gpio: i32,
    pub tx_gpio: i32,
    /// Modbus slave address.
    pub address: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Relay GPIOs in relay order; `relay_gpios[0]` drives `relay1`.
    pub relay_gpios: Vec<i32>,
    pub relay_active_low: bool,
    pub meters: Vec<MeterConfig>,
    pub meter_baud: u32,
    pub status_led_gpio: Option<i32>,
    pub buzzer_gpio: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub sensor_interval_ms: u64,
    pub sync_interval_ms: u64,
    pub connectivity_interval_ms: u64,
    pub schedule_interval_ms: u64,
    pub history_interval_ms: u64,
    /// Upper bound on a single meter read.
    pub sensor_read_timeout_ms: u64,
    /// Minimum spacing of non-urgent persistence writes.
    pub persist_interval_ms: u64,
    /// Task watchdog timeout; the main loop feeds it every iteration.
    pub watchdog_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub max_power_w: f32,
    pub min_voltage_v: f32,
    pub max_current_a: f32,
    /// Consecutive polls a condition must hold before an edge is recognised.
    pub debounce_polls: u8,
    /// Consecutive failed reads before a SensorFault alert.
    pub sensor_fault_after: u8,
    /// Consecutive unacknowledged writes before a HardwareFault alert.
    pub hardware_fault_after: u8,
    /// Time with every channel invalid before entering SafeMode.
    pub safe_mode_after_ms: u64,
}

/// Which relay a metering channel protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBinding {
    pub channel_id: ChannelId,
    pub relay_id: RelayId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Lifetime of a manual command before schedule control resumes.
    pub manual_expiry_ms: u64,
    pub bindings: Vec<ChannelBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPaths {
    pub sensors: String,
    pub devices: String,
    pub commands: String,
    pub schedules: String,
    pub history: String,
    pub alerts: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Realtime-database host, without scheme.
    pub host: String,
    pub paths: SyncPaths,
    pub queue_capacity: usize,
    /// Maximum entries pushed per sync cycle.
    pub per_cycle_cap: usize,
    /// Deadline for a single remote call, including a reconnect attempt.
    pub call_timeout_ms: u64,
    /// Wall time a whole sync cycle may take.  Reconnect plus cycle must fit
    /// between two sensor polls.
    pub cycle_budget_ms: u64,
    pub degrade_after_failures: u8,
    /// Consecutive failed sync cycles before one ConnectivityLoss alert.
    pub loss_alert_after_failures: u8,
    /// How many processed command ids are remembered.
    pub processed_ids_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let meters = pins::PZEM_UART_GPIOS
            .iter()
            .enumerate()
            .map(|(i, &(rx, tx))| MeterConfig {
                channel_id: i as ChannelId + 1,
                rx_gpio: rx,
                tx_gpio: tx,
                address: pins::PZEM_DEFAULT_ADDR,
            })
            .collect();

        // Meter n protects relay n.
        let bindings = (1..=pins::PZEM_UART_GPIOS.len() as u8)
            .map(|n| ChannelBinding { channel_id: n, relay_id: n })
            .collect();

        Self {
            device: DeviceInfo {
                device_id: "esp32_001".into(),
                name: "Smart Building Controller".into(),
                firmware_version: "1.0.0".into(),
                hardware_version: "ESP32-DevKit-V1".into(),
                tz_offset_secs: 7 * 3600, // GMT+7
            },
            hardware: HardwareConfig {
                relay_gpios: pins::RELAY_GPIOS.to_vec(),
                relay_active_low: pins::RELAY_ACTIVE_LOW,
                meters,
                meter_baud: pins::PZEM_BAUD,
                status_led_gpio: Some(pins::STATUS_LED_GPIO),
                buzzer_gpio: None,
            },
            timing: TimingConfig {
                sensor_interval_ms: 5_000,
                sync_interval_ms: 10_000,
                connectivity_interval_ms: 30_000,
                schedule_interval_ms: 60_000,
                history_interval_ms: 300_000,
                sensor_read_timeout_ms: 500,
                persist_interval_ms: 60_000,
                watchdog_timeout_ms: 30_000,
            },
            safety: SafetyConfig {
                max_power_w: 5_000.0,
                min_voltage_v: 200.0,
                max_current_a: 25.0,
                debounce_polls: 2,
                sensor_fault_after: 3,
                hardware_fault_after: 3,
                safe_mode_after_ms: 60_000,
            },
            control: ControlConfig {
                manual_expiry_ms: 3_600_000,
                bindings,
            },
            sync: SyncConfig {
                host: "smart-building-3e5c1-default-rtdb.asia-southeast1.firebasedatabase.app".into(),
                paths: SyncPaths {
                    sensors: "/sensors/pzem".into(),
                    devices: "/devices".into(),
                    commands: "/commands".into(),
                    schedules: "/schedules".into(),
                    history: "/history".into(),
                    alerts: "/alerts".into(),
                    status: "/devices/esp32".into(),
                },
                queue_capacity: 64,
                per_cycle_cap: 16,
                call_timeout_ms: 1_000,
                cycle_budget_ms: 2_000,
                degrade_after_failures: 3,
                loss_alert_after_failures: 3,
                processed_ids_capacity: 32,
            },
        }
    }
}

impl ControllerConfig {
    pub fn relay_count(&self) -> usize {
        self.hardware.relay_gpios.len()
    }

    pub fn relay_ids(&self) -> impl Iterator<Item = RelayId> + '_ {
        (1..=self.relay_count() as u8).map(|n| n as RelayId)
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.hardware.meters.iter().map(|m| m.channel_id)
    }

    /// The relay that a threshold violation on `channel` switches off.
    pub fn relay_for_channel(&self, channel: ChannelId) -> Option<RelayId> {
        self.control
            .bindings
            .iter()
            .find(|b| b.channel_id == channel)
            .map(|b| b.relay_id)
    }

    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigInvalid> {
        let hw = &self.hardware;
        if hw.relay_gpios.is_empty() || hw.relay_gpios.len() > 16 {
            return Err(ConfigInvalid("hardware.relay_gpios: need 1..=16 relays"));
        }
        if hw.meters.is_empty() {
            return Err(ConfigInvalid("hardware.meters: at least one meter required"));
        }
        for (i, m) in hw.meters.iter().enumerate() {
            if m.channel_id == 0 {
                return Err(ConfigInvalid("hardware.meters: channel ids are 1-based"));
            }
            if hw.meters[..i].iter().any(|o| o.channel_id == m.channel_id) {
                return Err(ConfigInvalid("hardware.meters: duplicate channel id"));
            }
            if m.address == 0 || m.address > 0xF8 {
                return Err(ConfigInvalid("hardware.meters: modbus address out of range"));
            }
        }

        let mut gpios: Vec<i32> = hw.relay_gpios.clone();
        for m in &hw.meters {
            gpios.push(m.rx_gpio);
            gpios.push(m.tx_gpio);
        }
        gpios.extend(hw.status_led_gpio);
        gpios.extend(hw.buzzer_gpio);
        if gpios.iter().any(|&g| !(0..=39).contains(&g)) {
            return Err(ConfigInvalid("hardware: GPIO number out of range"));
        }
        let mut sorted = gpios;
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigInvalid("hardware: GPIO assigned twice"));
        }

        let t = &self.timing;
        if t.sensor_interval_ms < 1_000 {
            return Err(ConfigInvalid("timing.sensor_interval_ms: below 1 s"));
        }
        if t.sync_interval_ms == 0
            || t.connectivity_interval_ms == 0
            || t.schedule_interval_ms == 0
            || t.history_interval_ms == 0
        {
            return Err(ConfigInvalid("timing: intervals must be non-zero"));
        }
        if t.sensor_read_timeout_ms == 0 || t.sensor_read_timeout_ms >= t.sensor_interval_ms {
            return Err(ConfigInvalid("timing.sensor_read_timeout_ms: must be below the poll interval"));
        }
        if t.watchdog_timeout_ms <= self.sync.cycle_budget_ms + t.sensor_read_timeout_ms * self.hardware.meters.len() as u64 {
            return Err(ConfigInvalid("timing.watchdog_timeout_ms: shorter than one worst-case tick"));
        }

        let s = &self.safety;
        if !(s.max_power_w > 0.0 && s.max_power_w <= 23_000.0) {
            return Err(ConfigInvalid("safety.max_power_w: out of range (0, 23000]"));
        }
        if !(s.min_voltage_v >= 80.0 && s.min_voltage_v < 260.0) {
            return Err(ConfigInvalid("safety.min_voltage_v: out of range [80, 260)"));
        }
        if !(s.max_current_a > 0.0 && s.max_current_a <= 100.0) {
            return Err(ConfigInvalid("safety.max_current_a: out of range (0, 100]"));
        }
        if s.debounce_polls == 0 {
            return Err(ConfigInvalid("safety.debounce_polls: must be at least 1"));
        }
        if s.sensor_fault_after == 0 || s.hardware_fault_after == 0 {
            return Err(ConfigInvalid("safety: fault thresholds must be at least 1"));
        }
        if s.safe_mode_after_ms < t.sensor_interval_ms {
            return Err(ConfigInvalid("safety.safe_mode_after_ms: shorter than one poll"));
        }

        let c = &self.control;
        if c.manual_expiry_ms == 0 {
            return Err(ConfigInvalid("control.manual_expiry_ms: must be non-zero"));
        }
        for b in &c.bindings {
            if !hw.meters.iter().any(|m| m.channel_id == b.channel_id) {
                return Err(ConfigInvalid("control.bindings: unknown channel"));
            }
            if b.relay_id == 0 || usize::from(b.relay_id) > hw.relay_gpios.len() {
                return Err(ConfigInvalid("control.bindings: unknown relay"));
            }
        }

        let y = &self.sync;
        if self.device.device_id.is_empty() {
            return Err(ConfigInvalid("device.device_id: empty"));
        }
        if y.queue_capacity < 4 {
            return Err(ConfigInvalid("sync.queue_capacity: below 4"));
        }
        if y.per_cycle_cap == 0 || y.per_cycle_cap > y.queue_capacity {
            return Err(ConfigInvalid("sync.per_cycle_cap: must be 1..=queue_capacity"));
        }
        if y.call_timeout_ms == 0 || y.call_timeout_ms > y.cycle_budget_ms {
            return Err(ConfigInvalid("sync.call_timeout_ms: must be within the cycle budget"));
        }
        let reads = t.sensor_read_timeout_ms * hw.meters.len() as u64;
        if y.call_timeout_ms + y.cycle_budget_ms >= t.sensor_interval_ms.saturating_sub(reads) {
            return Err(ConfigInvalid("sync: reconnect plus cycle budget do not fit between polls"));
        }
        if y.degrade_after_failures == 0 || y.loss_alert_after_failures == 0 {
            return Err(ConfigInvalid("sync: failure thresholds must be at least 1"));
        }
        if y.loss_alert_after_failures > y.degrade_after_failures {
            return Err(ConfigInvalid("sync.loss_alert_after_failures: above degrade_after_failures"));
        }
        Ok(())
    }
}
