//! Indicator and runtime-health drivers.

pub mod status_led;
pub mod watchdog;
