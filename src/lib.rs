//! Smart-building controller firmware library.
//!
//! Exposes the pure-logic modules and the host-side adapters for
//! integration testing. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod cadence;
pub mod config;
pub mod error;
pub mod fsm;
pub mod model;
pub mod relay;
pub mod safety;
pub mod schedule;
pub mod sync;

mod pins;

pub mod adapters;
pub mod drivers;
pub mod sensors;
