//! Simulated metering bus for host runs and tests.
//!
//! Every channel holds a [`Measurement`] that is encoded into a register
//! frame on each read.  Channels can be taken offline (reads time out) or
//! made to return garbage.

use std::collections::BTreeMap;

use crate::app::ports::SensorBus;
use crate::error::SensorError;
use crate::model::ChannelId;
use crate::sensors::pzem::{Measurement, RawFrame, encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    None,
    Offline,
    Garbage,
}

#[derive(Debug, Clone)]
struct SimChannel {
    measurement: Measurement,
    fault: SimFault,
}

/// 230 V, 1 A resistive load.
pub const NOMINAL: Measurement = Measurement {
    voltage: 230.0,
    current: 1.0,
    power: 230.0,
    energy_kwh: 0.0,
    frequency: 50.0,
    power_factor: 1.0,
    alarm: false,
};

pub struct SimMeterBus {
    channels: BTreeMap<ChannelId, SimChannel>,
    reads: u64,
}

impl SimMeterBus {
    pub fn new(channels: impl IntoIterator<Item = ChannelId>) -> Self {
        let channels = channels
            .into_iter()
            .map(|ch| {
                (
                    ch,
                    SimChannel {
                        measurement: NOMINAL,
                        fault: SimFault::None,
                    },
                )
            })
            .collect();
        Self { channels, reads: 0 }
    }

    pub fn set_measurement(&mut self, channel: ChannelId, m: Measurement) {
        if let Some(c) = self.channels.get_mut(&channel) {
            c.measurement = m;
        }
    }

    /// Set active power, keeping voltage and deriving current.
    pub fn set_power(&mut self, channel: ChannelId, watts: f32) {
        if let Some(c) = self.channels.get_mut(&channel) {
            let m = &mut c.measurement;
            m.power = watts;
            m.current = if m.voltage > 0.0 { watts / (m.voltage * m.power_factor.max(0.01)) } else { 0.0 };
        }
    }

    pub fn set_voltage(&mut self, channel: ChannelId, volts: f32) {
        if let Some(c) = self.channels.get_mut(&channel) {
            c.measurement.voltage = volts;
        }
    }

    pub fn set_fault(&mut self, channel: ChannelId, fault: SimFault) {
        if let Some(c) = self.channels.get_mut(&channel) {
            c.fault = fault;
        }
    }

    /// Apply one fault to every channel.
    pub fn set_all_faults(&mut self, fault: SimFault) {
        for c in self.channels.values_mut() {
            c.fault = fault;
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl SensorBus for SimMeterBus {
    fn read_channel(&mut self, channel: ChannelId, _timeout_ms: u64) -> Result<RawFrame, SensorError> {
        self.reads += 1;
        let c = self.channels.get(&channel).ok_or(SensorError::Bus)?;
        match c.fault {
            SimFault::None => Ok(encode(&c.measurement)),
            SimFault::Offline => Err(SensorError::Timeout),
            SimFault::Garbage => {
                let mut frame = RawFrame::new();
                let _ = frame.extend_from_slice(&[0xFF; 6]);
                Ok(frame)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::pzem::decode;

    #[test]
    fn nominal_reading_decodes() {
        let mut bus = SimMeterBus::new([1, 2]);
        let m = decode(&bus.read_channel(1, 100).unwrap()).unwrap();
        assert!((m.voltage - 230.0).abs() < 0.1);
        assert!((m.power - 230.0).abs() < 0.1);
        assert_eq!(bus.reads(), 1);
    }

    #[test]
    fn set_power_derives_current() {
        let mut bus = SimMeterBus::new([1]);
        bus.set_power(1, 2300.0);
        let m = decode(&bus.read_channel(1, 100).unwrap()).unwrap();
        assert!((m.current - 10.0).abs() < 0.01);
    }

    #[test]
    fn faults_surface_as_errors() {
        let mut bus = SimMeterBus::new([1, 2]);
        bus.set_fault(1, SimFault::Offline);
        bus.set_fault(2, SimFault::Garbage);
        assert_eq!(bus.read_channel(1, 100), Err(SensorError::Timeout));
        assert_eq!(decode(&bus.read_channel(2, 100).unwrap()), Err(SensorError::Malformed));
        assert_eq!(bus.read_channel(9, 100), Err(SensorError::Bus));
    }
}
