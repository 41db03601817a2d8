//! Mock adapters for integration tests.
//!
//! The board records every relay and indicator level so tests can assert
//! on outputs without touching real GPIO.  Meters come from the library's
//! simulated bus; the remote store is the in-memory JSON tree.  The slow
//! variants advance the shared clock to model blocking calls.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use smartbuilding::adapters::firebase::MemoryStore;
use smartbuilding::adapters::sim_meter::SimMeterBus;
use smartbuilding::adapters::uplink::Uplink;
use smartbuilding::app::events::AppEvent;
use smartbuilding::app::ports::{
    ClockPort, ConnectivityPort, EventSink, IndicatorPort, RelayOutput, RemoteStore, SensorBus,
};
use smartbuilding::app::service::Supervisor;
use smartbuilding::config::ControllerConfig;
use smartbuilding::error::{Error, RemoteError, SensorError};
use smartbuilding::model::{AlertKind, ChannelId, RelayId};
use smartbuilding::sensors::pzem::RawFrame;

// ── MockBoard ─────────────────────────────────────────────────

pub struct MockBoard {
    pub meters: SimMeterBus,
    /// Level last acknowledged per relay; index 0 is relay 1.
    pub relays: Vec<bool>,
    /// Relays whose writes fail.
    pub stuck: BTreeSet<RelayId>,
    pub writes: u32,
    pub led: bool,
    pub buzzer: bool,
    pub buzzer_edges: u32,
    /// Each meter read blocks this long on the given clock.
    pub read_delay: Option<(Rc<MockClock>, u64)>,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            meters: SimMeterBus::new(config.channel_ids()),
            relays: vec![false; config.relay_count()],
            stuck: BTreeSet::new(),
            writes: 0,
            led: false,
            buzzer: false,
            buzzer_edges: 0,
            read_delay: None,
        }
    }

    pub fn relay(&self, relay: RelayId) -> bool {
        self.relays[usize::from(relay) - 1]
    }
}

impl SensorBus for MockBoard {
    fn read_channel(&mut self, channel: ChannelId, timeout_ms: u64) -> Result<RawFrame, SensorError> {
        if let Some((clock, ms)) = &self.read_delay {
            clock.advance((*ms).min(timeout_ms));
        }
        self.meters.read_channel(channel, timeout_ms)
    }
}

impl RelayOutput for MockBoard {
    fn write_output(&mut self, relay: RelayId, on: bool) -> smartbuilding::error::Result<()> {
        self.writes += 1;
        if self.stuck.contains(&relay) {
            return Err(Error::Hardware(relay));
        }
        let slot = self
            .relays
            .get_mut(usize::from(relay).wrapping_sub(1))
            .ok_or(Error::Hardware(relay))?;
        *slot = on;
        Ok(())
    }
}

impl IndicatorPort for MockBoard {
    fn set_status_led(&mut self, on: bool) {
        self.led = on;
    }

    fn set_buzzer(&mut self, on: bool) {
        if on && !self.buzzer {
            self.buzzer_edges += 1;
        }
        self.buzzer = on;
    }
}

// ── MockLink ──────────────────────────────────────────────────

pub struct MockLink {
    pub up: bool,
    pub reconnects: u32,
}

impl ConnectivityPort for MockLink {
    fn is_up(&self) -> bool {
        self.up
    }

    fn reconnect(&mut self, _timeout_ms: u64) -> bool {
        self.reconnects += 1;
        self.up
    }
}

// ── SlowLink / SlowStore ──────────────────────────────────────

/// A link whose reconnect attempts always use their full timeout.
pub struct SlowLink {
    clock: Rc<MockClock>,
    up: bool,
    /// Whether the next reconnect succeeds.
    pub available: bool,
    pub reconnects: u32,
}

#[allow(dead_code)]
impl SlowLink {
    pub fn new(clock: Rc<MockClock>) -> Self {
        Self {
            clock,
            up: false,
            available: false,
            reconnects: 0,
        }
    }
}

impl ConnectivityPort for SlowLink {
    fn is_up(&self) -> bool {
        self.up
    }

    fn reconnect(&mut self, timeout_ms: u64) -> bool {
        self.reconnects += 1;
        self.clock.advance(timeout_ms);
        self.up = self.available;
        self.up
    }
}

/// [`MemoryStore`] behind a fixed per-call latency.  A call slower than its
/// timeout blocks for the timeout and fails.
pub struct SlowStore {
    clock: Rc<MockClock>,
    pub latency_ms: u64,
    pub inner: MemoryStore,
}

#[allow(dead_code)]
impl SlowStore {
    pub fn new(clock: Rc<MockClock>) -> Self {
        Self {
            clock,
            latency_ms: 0,
            inner: MemoryStore::new(),
        }
    }

    fn wait(&self, timeout_ms: u64) -> Result<(), RemoteError> {
        self.clock.advance(self.latency_ms.min(timeout_ms));
        if self.latency_ms > timeout_ms { Err(RemoteError::Timeout) } else { Ok(()) }
    }
}

impl RemoteStore for SlowStore {
    fn put(&mut self, path: &str, body: &Value, timeout_ms: u64) -> Result<(), RemoteError> {
        self.wait(timeout_ms)?;
        self.inner.put(path, body, timeout_ms)
    }

    fn get(&mut self, path: &str, timeout_ms: u64) -> Result<Value, RemoteError> {
        self.wait(timeout_ms)?;
        self.inner.get(path, timeout_ms)
    }

    fn remove(&mut self, path: &str, timeout_ms: u64) -> Result<(), RemoteError> {
        self.wait(timeout_ms)?;
        self.inner.remove(path, timeout_ms)
    }
}

// ── MockClock ─────────────────────────────────────────────────

pub struct MockClock {
    now: Cell<u64>,
    wall: Cell<Option<NaiveDateTime>>,
}

#[allow(dead_code)]
impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0),
            wall: Cell::new(None),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
        if let Some(w) = self.wall.get() {
            self.wall.set(Some(w + chrono::Duration::milliseconds(ms as i64)));
        }
    }

    pub fn set_wall(&self, wall: Option<NaiveDateTime>) {
        self.wall.set(wall);
    }
}

impl ClockPort for MockClock {
    fn monotonic_ms(&self) -> u64 {
        self.now.get()
    }

    fn wall_clock(&self) -> Option<NaiveDateTime> {
        self.wall.get()
    }
}

/// 2024-06-03 is a Monday.
#[allow(dead_code)]
pub fn monday_at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .unwrap()
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn alerts(&self, kind: AlertKind) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::AlertRaised(a) if a.kind == kind))
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::CommandRejected { .. }))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// A supervisor wired to mocks, with a manual clock.
pub struct Rig {
    pub sup: Supervisor,
    pub board: MockBoard,
    pub net: Uplink<MemoryStore, MockLink>,
    pub clock: MockClock,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(config: ControllerConfig) -> Self {
        let board = MockBoard::new(&config);
        let sup = Supervisor::new(config, 0).unwrap();
        let net = Uplink::new(MemoryStore::new(), MockLink { up: true, reconnects: 0 });
        Self {
            sup,
            board,
            net,
            clock: MockClock::new(),
            sink: RecordingSink::default(),
        }
    }

    /// Started, with the first tick at t = 0 already run.
    pub fn started(config: ControllerConfig) -> Self {
        let mut rig = Self::new(config);
        rig.sup.start(&mut rig.sink);
        rig.tick();
        rig
    }

    pub fn tick(&mut self) {
        self.sup.tick(&mut self.board, &mut self.net, &self.clock, &mut self.sink);
    }

    /// Advance the clock and run one tick.
    pub fn step(&mut self, ms: u64) {
        self.clock.advance(ms);
        self.tick();
    }

    /// Advance in `step_ms` increments for `total_ms`.
    pub fn run_for(&mut self, total_ms: u64, step_ms: u64) {
        let mut elapsed = 0;
        while elapsed < total_ms {
            self.step(step_ms);
            elapsed += step_ms;
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.monotonic_ms()
    }

    pub fn store(&mut self) -> &mut MemoryStore {
        self.net.store_mut()
    }

    pub fn set_link(&mut self, up: bool) {
        self.net.link_mut().up = up;
    }
}
