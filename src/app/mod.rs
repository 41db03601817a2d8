//! Application core: domain orchestration, zero direct I/O.
//!
//! The [`service::Supervisor`] ties the sensor reader, threshold monitor,
//! relay bank, schedule engine and sync client together behind the
//! **port traits** in [`ports`], so the whole controller is testable
//! without real peripherals or a network.

pub mod commands;
pub mod events;
pub mod persist;
pub mod ports;
pub mod service;
