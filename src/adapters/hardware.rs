//! Board adapter: bridges the physical board to the domain port traits.
//!
//! Owns the metering bus, the relay outputs and the optional status LED
//! and buzzer pins, exposing them through [`SensorBus`], [`RelayOutput`]
//! and [`IndicatorPort`].  The supervisor takes this as its single
//! hardware handle.  The bus and pin types are generic, so the same
//! adapter runs over ESP-IDF drivers on the device and over simulated
//! parts on the host.

use embedded_hal::digital::{OutputPin, PinState, StatefulOutputPin};
use log::warn;

use crate::adapters::relay_gpio::RelayPins;
use crate::app::ports::{IndicatorPort, RelayOutput, SensorBus};
use crate::error::{Result, SensorError};
use crate::model::{ChannelId, RelayId};
use crate::sensors::pzem::RawFrame;

/// Concrete adapter that combines all board I/O behind port traits.
pub struct BoardAdapter<B, P> {
    bus: B,
    relays: RelayPins<P>,
    led: Option<P>,
    buzzer: Option<P>,
}

impl<B: SensorBus, P: StatefulOutputPin> BoardAdapter<B, P> {
    pub fn new(bus: B, relays: RelayPins<P>, led: Option<P>, buzzer: Option<P>) -> Self {
        Self {
            bus,
            relays,
            led,
            buzzer,
        }
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}

fn drive<P: OutputPin>(pin: Option<&mut P>, on: bool, what: &str) {
    if let Some(pin) = pin {
        if pin.set_state(PinState::from(on)).is_err() {
            warn!("{what}: GPIO write failed");
        }
    }
}

// ── SensorBus implementation ─────────────────────────────────

impl<B: SensorBus, P: StatefulOutputPin> SensorBus for BoardAdapter<B, P> {
    fn read_channel(&mut self, channel: ChannelId, timeout_ms: u64) -> core::result::Result<RawFrame, SensorError> {
        self.bus.read_channel(channel, timeout_ms)
    }
}

// ── RelayOutput implementation ───────────────────────────────

impl<B: SensorBus, P: StatefulOutputPin> RelayOutput for BoardAdapter<B, P> {
    fn write_output(&mut self, relay: RelayId, on: bool) -> Result<()> {
        self.relays.write_output(relay, on)
    }
}

// ── IndicatorPort implementation ─────────────────────────────

impl<B: SensorBus, P: StatefulOutputPin> IndicatorPort for BoardAdapter<B, P> {
    fn set_status_led(&mut self, on: bool) {
        drive(self.led.as_mut(), on, "Status LED");
    }

    fn set_buzzer(&mut self, on: bool) {
        drive(self.buzzer.as_mut(), on, "Buzzer");
    }
}
