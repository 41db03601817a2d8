//! GPIO / peripheral pin assignments for the ESP32-DevKit-V1 controller board.
//!
//! These are the factory defaults.  [`crate::config::HardwareConfig`] copies
//! them at startup and may be overridden from NVS, so drivers take pin
//! numbers from the config rather than from this module directly.

// ---------------------------------------------------------------------------
// Relay board (8-channel, one GPIO per coil driver)
// ---------------------------------------------------------------------------

/// Relay outputs in relay order: index 0 is `relay1`.
pub const RELAY_GPIOS: [i32; 8] = [26, 27, 14, 12, 13, 25, 33, 32];

/// Most opto-isolated relay boards energise the coil on LOW.
pub const RELAY_ACTIVE_LOW: bool = false;

// ---------------------------------------------------------------------------
// PZEM-004T v3 power meters (one UART pair per meter, multiplexed)
// ---------------------------------------------------------------------------

/// `(rx, tx)` per meter, in channel order: index 0 is channel 1.
pub const PZEM_UART_GPIOS: [(i32, i32); 3] = [(16, 17), (18, 19), (21, 22)];

/// PZEM Modbus-RTU line rate.
pub const PZEM_BAUD: u32 = 9_600;

/// Factory default Modbus slave address of a PZEM-004T.
pub const PZEM_DEFAULT_ADDR: u8 = 0xF8;

// ---------------------------------------------------------------------------
// Indicators
// ---------------------------------------------------------------------------

/// On-board blue LED.
pub const STATUS_LED_GPIO: i32 = 2;

/// Buzzer pad on the carrier board.  Shares GPIO 25 with relay 6, so the
/// default configuration leaves the buzzer unassigned.
#[allow(dead_code)]
pub const BUZZER_GPIO: i32 = 25;
