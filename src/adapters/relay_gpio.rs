//! GPIO relay outputs.
//!
//! Drives one `embedded-hal` output pin per relay.  A write counts as
//! acknowledged only when the pin reads back at the requested level, so a
//! driver error or a stuck output surfaces as [`Error::Hardware`].
//!
//! Relay boards differ in polarity; with `active_low` the coil is
//! energised by driving the pin low.

use embedded_hal::digital::{PinState, StatefulOutputPin};
use log::{debug, warn};

use crate::app::ports::RelayOutput;
use crate::error::{Error, Result};
use crate::model::RelayId;

pub struct RelayPins<P> {
    pins: Vec<P>,
    active_low: bool,
}

impl<P: StatefulOutputPin> RelayPins<P> {
    /// `pins[0]` drives relay 1.
    pub fn new(pins: Vec<P>, active_low: bool) -> Self {
        Self { pins, active_low }
    }

    fn level(&self, on: bool) -> PinState {
        PinState::from(on != self.active_low)
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

impl<P: StatefulOutputPin> RelayOutput for RelayPins<P> {
    fn write_output(&mut self, relay: RelayId, on: bool) -> Result<()> {
        let level = self.level(on);
        let idx = usize::from(relay).wrapping_sub(1);
        let pin = self.pins.get_mut(idx).ok_or(Error::Hardware(relay))?;

        if pin.set_state(level).is_err() {
            warn!("Relay {relay}: GPIO write failed");
            return Err(Error::Hardware(relay));
        }
        match pin.is_set_high() {
            Ok(high) if PinState::from(high) == level => {
                debug!("Relay {relay}: {}", if on { "on" } else { "off" });
                Ok(())
            }
            _ => {
                warn!("Relay {relay}: output did not latch");
                Err(Error::Hardware(relay))
            }
        }
    }
}
