//! PZEM-004T v3 measurement decoding.
//!
//! The meter answers a Modbus "read input registers" request for
//! registers `0x0000..0x000A` with ten 16-bit big-endian registers.  The
//! bus adapter strips the Modbus envelope (address, function, byte count,
//! CRC) and hands over the 20 register bytes decoded here.
//!
//! | Reg   | Field          | Unit    |
//! |-------|----------------|---------|
//! | 0     | voltage        | 0.1 V   |
//! | 1–2   | current        | 0.001 A |
//! | 3–4   | power          | 0.1 W   |
//! | 5–6   | energy         | 1 Wh    |
//! | 7     | frequency      | 0.1 Hz  |
//! | 8     | power factor   | 0.01    |
//! | 9     | alarm status   | –       |
//!
//! 32-bit values are sent low word first.

use crate::error::SensorError;

/// Register payload length in bytes.
pub const FRAME_LEN: usize = 20;

/// Register payload as delivered by a [`SensorBus`](crate::app::ports::SensorBus).
pub type RawFrame = heapless::Vec<u8, FRAME_LEN>;

pub const VOLTAGE_RANGE: (f32, f32) = (80.0, 260.0);
pub const CURRENT_RANGE: (f32, f32) = (0.0, 100.0);
pub const POWER_RANGE: (f32, f32) = (0.0, 23_000.0);
pub const FREQUENCY_RANGE: (f32, f32) = (45.0, 65.0);
pub const POWER_FACTOR_RANGE: (f32, f32) = (0.0, 1.0);

/// Decoded register values in engineering units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
    pub energy_kwh: f32,
    pub frequency: f32,
    pub power_factor: f32,
    pub alarm: bool,
}

fn reg(frame: &[u8], n: usize) -> u16 {
    u16::from_be_bytes([frame[2 * n], frame[2 * n + 1]])
}

fn reg32(frame: &[u8], low: usize) -> u32 {
    u32::from(reg(frame, low)) | (u32::from(reg(frame, low + 1)) << 16)
}

/// Decode a register payload.  Only the length is checked here; see
/// [`Measurement::check_plausible`] for range validation.
pub fn decode(frame: &[u8]) -> Result<Measurement, SensorError> {
    if frame.len() != FRAME_LEN {
        return Err(SensorError::Malformed);
    }
    Ok(Measurement {
        voltage: f32::from(reg(frame, 0)) * 0.1,
        current: reg32(frame, 1) as f32 * 0.001,
        power: reg32(frame, 3) as f32 * 0.1,
        energy_kwh: reg32(frame, 5) as f32 / 1000.0,
        frequency: f32::from(reg(frame, 7)) * 0.1,
        power_factor: f32::from(reg(frame, 8)) * 0.01,
        alarm: reg(frame, 9) != 0,
    })
}

fn within((lo, hi): (f32, f32), v: f32) -> bool {
    v >= lo && v <= hi
}

impl Measurement {
    pub fn check_plausible(&self) -> Result<(), SensorError> {
        let ok = within(VOLTAGE_RANGE, self.voltage)
            && within(CURRENT_RANGE, self.current)
            && within(POWER_RANGE, self.power)
            && within(FREQUENCY_RANGE, self.frequency)
            && within(POWER_FACTOR_RANGE, self.power_factor)
            && self.energy_kwh.is_finite()
            && self.energy_kwh >= 0.0;
        if ok { Ok(()) } else { Err(SensorError::OutOfRange) }
    }
}

/// Build a register payload.  Used by the simulated bus and tests.
pub fn encode(m: &Measurement) -> RawFrame {
    let mut regs = [0u16; 10];
    let split = |v: u32| (v as u16, (v >> 16) as u16);

    regs[0] = (m.voltage * 10.0).round() as u16;
    (regs[1], regs[2]) = split((m.current * 1000.0).round() as u32);
    (regs[3], regs[4]) = split((m.power * 10.0).round() as u32);
    (regs[5], regs[6]) = split((m.energy_kwh * 1000.0).round() as u32);
    regs[7] = (m.frequency * 10.0).round() as u16;
    regs[8] = (m.power_factor * 100.0).round() as u16;
    regs[9] = u16::from(m.alarm);

    let mut frame = RawFrame::new();
    for r in regs {
        // FRAME_LEN is exactly ten registers.
        let _ = frame.extend_from_slice(&r.to_be_bytes());
    }
    frame
}
