//! Supervisor: the hexagonal core.
//!
//! [`Supervisor`] owns every subsystem (sensor reader, threshold monitor,
//! relay bank, schedule engine, sync client, upload queue) plus the
//! link-state FSM.  All I/O flows through port traits passed in at the
//! call site, so the whole controller runs against mock adapters in tests.
//!
//! ```text
//!   SensorBus ──▶ ┌───────────────────────────────┐ ──▶ EventSink
//!                 │          Supervisor            │
//! RelayOutput ◀── │ Sensors · Safety · Schedule    │ ◀─▶ RemoteStore
//! IndicatorPort ◀─│ Relays · Sync · FSM            │ ◀── ConnectivityPort
//!                 └───────────────────────────────┘
//! ```
//!
//! Safety actions are applied in the same tick as the reading that
//! triggered them, before any network call.  Reconnect and sync only get
//! the time left before the next poll, less the worst-case sensor reads,
//! so a slow network never delays a threshold evaluation.

use std::collections::BTreeSet;

use log::{debug, error, info, warn};

use crate::cadence::{Cadence, Task};
use crate::config::ControllerConfig;
use crate::drivers::status_led::StatusIndicator;
use crate::error::{ConfigInvalid, Error, Result};
use crate::fsm::context::SupervisorContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, LinkState};
use crate::model::{
    AlertEvent, AlertIds, AlertKind, AlertTarget, DeviceStatus, RelayId, RelaySource, RelayState,
    UploadEntry,
};
use crate::relay::RelayBank;
use crate::safety::{SafetyAction, ThresholdMonitor};
use crate::schedule::ScheduleEngine;
use crate::sensors::SensorReader;
use crate::sync::SyncClient;
use crate::sync::queue::{PushOutcome, UploadQueue};

use super::commands::{Command, RemoteCommand};
use super::events::{AppEvent, SyncSummary};
use super::persist::PersistedState;
use super::ports::{
    ClockPort, ConnectivityPort, EventSink, IndicatorPort, RelayOutput, RemoteStore, SensorBus,
    StorageError, StoragePort,
};

// ───────────────────────────────────────────────────────────────
// Supervisor
// ───────────────────────────────────────────────────────────────

pub struct Supervisor {
    config: ControllerConfig,
    fsm: Fsm,
    ctx: SupervisorContext,
    cadence: Cadence,

    sensors: SensorReader,
    monitor: ThresholdMonitor,
    relays: RelayBank,
    schedule: ScheduleEngine,
    sync: SyncClient,
    queue: UploadQueue,
    alert_ids: AlertIds,
    indicator: StatusIndicator,

    boot_count: u32,
    started_at: u64,
    initial_read_ok: bool,
    all_lost_since: Option<u64>,
    sync_failures: u32,
    /// A ConnectivityLoss alert was raised for the current run of failed syncs.
    loss_alerted: bool,
    /// A ConnectivityLoss alert was raised for the current overflow episode.
    eviction_alerted: bool,
    /// Threshold alerts nobody has acknowledged yet (drives the buzzer).
    unacked: BTreeSet<u32>,

    // -- Persistence --
    urgent_dirty: bool,
    queue_dirty: bool,
    last_persist_ms: u64,
}

impl Supervisor {
    /// Build every subsystem from a validated configuration.
    ///
    /// Does **not** start the FSM; call [`restore`](Self::restore) (optional)
    /// and then [`start`](Self::start).
    pub fn new(config: ControllerConfig, now_ms: u64) -> core::result::Result<Self, ConfigInvalid> {
        config.validate()?;
        let ctx = SupervisorContext::new(&config);
        Ok(Self {
            fsm: Fsm::new(build_state_table(), LinkState::Booting),
            ctx,
            cadence: Cadence::new(&config.timing, now_ms),
            sensors: SensorReader::new(&config),
            monitor: ThresholdMonitor::new(&config),
            relays: RelayBank::new(&config),
            schedule: ScheduleEngine::new(config.relay_count()),
            sync: SyncClient::new(&config),
            queue: UploadQueue::new(config.sync.queue_capacity),
            alert_ids: AlertIds::new(),
            indicator: StatusIndicator::new(),
            boot_count: 1,
            started_at: now_ms,
            initial_read_ok: false,
            all_lost_since: None,
            sync_failures: 0,
            loss_alerted: false,
            eviction_alerted: false,
            unacked: BTreeSet::new(),
            urgent_dirty: true,
            queue_dirty: false,
            last_persist_ms: now_ms,
            config,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Re-seed relays, rules and the upload queue from the last snapshot
    /// and bump the boot counter.  A missing or unreadable snapshot leaves
    /// the defaults in place.
    pub fn restore(&mut self, storage: &impl StoragePort) {
        let saved = match PersistedState::load(storage) {
            Ok(Some(saved)) => saved,
            Ok(None) => {
                info!("Supervisor: first boot, no persisted state");
                return;
            }
            Err(e) => {
                warn!("Supervisor: persisted state unavailable: {e}");
                return;
            }
        };

        self.boot_count = saved.boot_count.wrapping_add(1);
        self.alert_ids = AlertIds::resume(saved.last_alert_id);
        self.relays.restore(&saved.relays, saved.safe_mode);
        if !saved.safe_mode {
            // Bound overrides stay engaged until readings clear them again.
            let held: Vec<RelayId> = saved
                .relays
                .iter()
                .filter(|s| s.source == RelaySource::SafetyOverride)
                .map(|s| s.relay_id)
                .filter(|&r| self.monitor.is_bound(r))
                .collect();
            for &relay in &held {
                self.relays.hold_override(relay);
            }
            if !held.is_empty() {
                warn!("Supervisor: safety override still held on relays {held:?}");
            }
            self.monitor.restore_overrides(&held);
        }
        let dropped = self.schedule.replace(saved.rules);
        if dropped > 0 {
            warn!("Supervisor: {dropped} persisted rules no longer valid");
        }
        self.unacked = saved
            .queue
            .iter()
            .filter_map(|q| match &q.entry {
                UploadEntry::Alert(a) if a.kind.is_threshold_violation() && !a.acknowledged => {
                    Some(a.alert_id)
                }
                _ => None,
            })
            .collect();
        self.queue.restore(saved.queue, saved.next_seq);
        self.urgent_dirty = true;
    }

    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.fsm.start(&mut self.ctx);
        let state = self.fsm.current_state();
        sink.emit(&AppEvent::Started {
            state,
            boot_count: self.boot_count,
        });
        info!("Supervisor started in {state} (boot #{})", self.boot_count);
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control cycle.
    ///
    /// Order: sensors → thresholds → schedule → relays → upload queue →
    /// connectivity → sync → link state → indicators.  Each stage runs
    /// only when its cadence is due, except relay retries and indicators
    /// which run every tick.
    pub fn tick(
        &mut self,
        hw: &mut (impl SensorBus + RelayOutput + IndicatorPort),
        net: &mut (impl RemoteStore + ConnectivityPort),
        clock: &impl ClockPort,
        sink: &mut impl EventSink,
    ) {
        let now = clock.monotonic_ms();

        // 1–2. Sensors, then thresholds with immediate safety action
        if self.cadence.take_due(Task::Sensors, now) {
            self.poll_sensors(hw, now, sink);
        }

        // 3. Schedule (wall clock only here)
        if self.cadence.take_due(Task::Schedule, now) {
            match clock.wall_clock() {
                Some(wall) => {
                    let targets = self.schedule.evaluate(&wall);
                    self.relays.apply_schedule(hw, &targets, now);
                }
                None => debug!("Supervisor: wall clock not set, schedule skipped"),
            }
        }

        // 4. Manual expiry and write retries
        self.relays.tick(hw, now);
        self.collect_relay_events(now, sink);

        // 5. Connectivity supervision
        if self.cadence.is_due(Task::Connectivity, now) {
            if net.is_up() {
                self.cadence.take_due(Task::Connectivity, now);
            } else if let Some(timeout) = self.network_timeout(clock, self.config.sync.call_timeout_ms) {
                self.cadence.take_due(Task::Connectivity, now);
                warn!("Supervisor: link down, reconnecting");
                if net.reconnect(timeout) {
                    info!("Supervisor: link restored");
                }
            } else {
                debug!("Supervisor: no time before the next poll, reconnect deferred");
                self.cadence.defer(Task::Connectivity, self.cadence.next_due(Task::Sensors));
            }
        }

        // 6. Sync
        if self.cadence.is_due(Task::Sync, now) {
            if clock.monotonic_ms() < self.network_deadline() {
                self.cadence.take_due(Task::Sync, now);
                self.run_sync(hw, net, clock, now, sink);
            } else {
                debug!("Supervisor: no time before the next poll, sync deferred");
                self.cadence.defer(Task::Sync, self.cadence.next_due(Task::Sensors));
            }
        }

        // 7. History snapshots
        if self.cadence.take_due(Task::History, now) {
            let snapshot = self.sensors.snapshot(now);
            for reading in snapshot.values().filter(|r| r.valid) {
                self.enqueue(UploadEntry::History(*reading), now, sink);
            }
        }

        // 8. Link state
        self.update_link_state(hw, net.is_up(), now, sink);

        // 9. Indicators
        self.indicator.set_pattern(self.ctx.outputs.led);
        self.indicator.set_alarm(!self.unacked.is_empty());
        self.indicator.tick(hw, now);

        self.urgent_dirty |= self.relays.take_dirty() | self.schedule.take_dirty();
    }

    // ── Command handling ──────────────────────────────────────

    /// Apply one command.  Relay commands are refused while a safety
    /// override or safe mode holds the relay.
    pub fn handle_command(&mut self, cmd: Command, hw: &mut impl RelayOutput, now_ms: u64) -> Result<()> {
        match cmd {
            Command::SetRelay { relay, on } => {
                self.relays.apply(hw, relay, on, RelaySource::Manual, now_ms)?;
                info!("Supervisor: manual relay {relay} -> {}", on_off(on));
            }
            Command::ReleaseRelay { relay } => {
                self.relays.release_manual(hw, relay, now_ms)?;
                // Let the schedule reclaim the relay without waiting a full interval.
                self.cadence.expedite(Task::Schedule, now_ms);
            }
            Command::UpsertRule(rule) => {
                let id = rule.rule_id;
                self.schedule.upsert(rule)?;
                info!("Supervisor: rule {id} stored");
                self.cadence.expedite(Task::Schedule, now_ms);
            }
            Command::DeleteRule { rule_id } => {
                if !self.schedule.remove(rule_id) {
                    return Err(Error::Config(ConfigInvalid("unknown rule id")));
                }
                info!("Supervisor: rule {rule_id} deleted");
                self.cadence.expedite(Task::Schedule, now_ms);
            }
            Command::AckAlert { alert_id } => {
                if self.unacked.remove(&alert_id) {
                    info!("Supervisor: alert {alert_id} acknowledged");
                } else {
                    debug!("Supervisor: alert {alert_id} not pending");
                }
            }
        }
        Ok(())
    }

    // ── Persistence ───────────────────────────────────────────

    /// Flush state when something urgent changed, or when only the queue
    /// changed and `persist_interval_ms` has passed.  Returns whether a
    /// snapshot was written.
    pub fn persist_if_needed(&mut self, storage: &mut impl StoragePort, now_ms: u64) -> bool {
        self.urgent_dirty |= self.relays.take_dirty() | self.schedule.take_dirty();
        let periodic = self.queue_dirty
            && now_ms.saturating_sub(self.last_persist_ms) >= self.config.timing.persist_interval_ms;
        if !self.urgent_dirty && !periodic {
            return false;
        }
        match self.save(storage) {
            Ok(()) => {
                self.urgent_dirty = false;
                self.queue_dirty = false;
                self.last_persist_ms = now_ms;
                true
            }
            Err(e) => {
                warn!("Supervisor: persisting state failed: {e}");
                false
            }
        }
    }

    /// Write a snapshot unconditionally.
    pub fn save(&self, storage: &mut impl StoragePort) -> core::result::Result<(), StorageError> {
        self.persisted().save(storage)
    }

    fn persisted(&self) -> PersistedState {
        PersistedState {
            boot_count: self.boot_count,
            safe_mode: self.relays.is_safe_mode(),
            last_alert_id: self.alert_ids.last(),
            relays: self.relays.states().collect(),
            rules: self.schedule.rules().cloned().collect(),
            queue: self.queue.iter().cloned().collect(),
            next_seq: self.queue.next_seq(),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> LinkState {
        self.fsm.current_state()
    }

    pub fn relay_state(&self, relay: RelayId) -> Option<RelayState> {
        self.relays.state(relay)
    }

    pub fn relays(&self) -> &RelayBank {
        &self.relays
    }

    pub fn schedule(&self) -> &ScheduleEngine {
        &self.schedule
    }

    pub fn sensors(&self) -> &SensorReader {
        &self.sensors
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn boot_count(&self) -> u32 {
        self.boot_count
    }

    pub fn sync_failures(&self) -> u32 {
        self.sync_failures
    }

    pub fn unacknowledged_alerts(&self) -> usize {
        self.unacked.len()
    }

    pub fn indicator(&self) -> &StatusIndicator {
        &self.indicator
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Earliest monotonic time at which a cadence task is due.
    pub fn next_deadline(&self) -> u64 {
        self.cadence.next_deadline()
    }

    pub fn status(&self, now_ms: u64) -> DeviceStatus {
        DeviceStatus {
            device_id: self.config.device.device_id.clone(),
            name: self.config.device.name.clone(),
            firmware_version: self.config.device.firmware_version.clone(),
            link_state: self.fsm.current_state(),
            uptime_ms: now_ms.saturating_sub(self.started_at),
            boot_count: self.boot_count,
            queue_depth: self.queue.len(),
            relays: self.relays.states().map(|s| s.actual_state).collect(),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn poll_sensors(&mut self, hw: &mut (impl SensorBus + RelayOutput), now: u64, sink: &mut impl EventSink) {
        let poll = self.sensors.poll(hw, now, &mut self.alert_ids);
        if !self.initial_read_ok && poll.readings.values().any(|r| r.valid) {
            info!("Supervisor: first valid sensor reading");
            self.initial_read_ok = true;
        }

        let report = self.monitor.evaluate(&poll.readings, now, &mut self.alert_ids);
        for action in &report.actions {
            self.apply_safety(hw, *action, now);
        }
        // Relay state changes go out before the alerts that caused them.
        self.collect_relay_events(now, sink);

        for alert in poll.alerts.into_iter().chain(report.alerts) {
            self.raise(alert, now, sink);
        }
        for reading in poll.readings.into_values() {
            self.enqueue(UploadEntry::Reading(reading), now, sink);
        }

        if self.sensors.all_lost(now) {
            self.all_lost_since.get_or_insert(now);
        } else {
            self.all_lost_since = None;
        }
    }

    fn apply_safety(&mut self, out: &mut impl RelayOutput, action: SafetyAction, now: u64) {
        let result = match action {
            SafetyAction::Engage(relay) => {
                self.relays.apply(out, relay, false, RelaySource::SafetyOverride, now)
            }
            SafetyAction::Release(relay) => self.relays.clear_override(out, relay, now),
        };
        if let Err(e) = result {
            error!("Supervisor: safety action {action:?} failed: {e}");
        }
    }

    fn collect_relay_events(&mut self, now: u64, sink: &mut impl EventSink) {
        for change in self.relays.take_changes() {
            sink.emit(&AppEvent::RelayChanged(change));
            self.enqueue(UploadEntry::Relay(change), now, sink);
        }
        for fault in self.relays.take_faults() {
            let alert = self.alert_ids.raise(
                AlertKind::HardwareFault,
                AlertTarget::Relay(fault.relay_id),
                fault.write_failures as f32,
                f32::from(self.config.safety.hardware_fault_after),
                now,
            );
            self.raise(alert, now, sink);
        }
    }

    /// Latest monotonic time a network call may run to without delaying
    /// the next poll.
    fn network_deadline(&self) -> u64 {
        let reads = self.config.timing.sensor_read_timeout_ms * self.config.hardware.meters.len() as u64;
        self.cadence.next_due(Task::Sensors).saturating_sub(reads)
    }

    /// `cap`, shortened to what is left before [`network_deadline`](Self::network_deadline),
    /// or `None` when nothing is left.
    fn network_timeout(&self, clock: &impl ClockPort, cap: u64) -> Option<u64> {
        let left = self.network_deadline().saturating_sub(clock.monotonic_ms());
        (left > 0).then(|| left.min(cap))
    }

    fn run_sync(
        &mut self,
        hw: &mut impl RelayOutput,
        net: &mut (impl RemoteStore + ConnectivityPort),
        clock: &impl ClockPort,
        now: u64,
        sink: &mut impl EventSink,
    ) {
        let status = self.status(now);
        self.enqueue(UploadEntry::Status(status), now, sink);

        let mut summary = SyncSummary::default();
        if !net.is_up() {
            summary.push_failed = true;
            self.record_sync(false, now, sink);
            summary.queue_depth = self.queue.len();
            debug!("Supervisor: link down, sync skipped ({} failures)", self.sync_failures);
            sink.emit(&AppEvent::SyncCompleted(summary));
            return;
        }

        let deadline = clock
            .monotonic_ms()
            .saturating_add(self.config.sync.cycle_budget_ms)
            .min(self.network_deadline());
        let push = self
            .sync
            .push_pending(net, &mut self.queue, &self.config, self.boot_count, clock, deadline);
        summary.sent = push.sent;
        summary.push_failed = push.failed.is_some();
        if push.sent > 0 {
            self.queue_dirty = true;
        }
        if self.queue.len() < self.queue.capacity() {
            self.eviction_alerted = false;
        }

        let budget_left = clock.monotonic_ms() < deadline;
        if self.ctx.outputs.pull_enabled && push.failed.is_none() && budget_left {
            let pull = self.sync.pull_commands(net, &self.config, clock, deadline);
            summary.pull_failed = pull.failed.is_some();
            summary.commands = pull.commands.len();

            for (id, invalid) in pull.rejected {
                sink.emit(&AppEvent::CommandRejected {
                    id,
                    error: invalid.into(),
                });
            }
            if let Some(rules) = pull.rules {
                let dropped = self.schedule.replace(rules);
                if dropped > 0 {
                    warn!("Supervisor: {dropped} remote rules rejected");
                }
                self.cadence.expedite(Task::Schedule, now);
            }
            for RemoteCommand { id, command } in pull.commands {
                if let Err(error) = self.handle_command(command, hw, now) {
                    warn!("Supervisor: command {id} rejected: {error}");
                    sink.emit(&AppEvent::CommandRejected { id: Some(id), error });
                }
            }
            self.collect_relay_events(now, sink);
        } else if !self.ctx.outputs.pull_enabled {
            debug!("Supervisor: degraded, command pull skipped");
        } else if !budget_left {
            debug!("Supervisor: cycle budget spent, command pull skipped");
        }

        self.record_sync(!(summary.push_failed || summary.pull_failed), now, sink);
        summary.queue_depth = self.queue.len();
        sink.emit(&AppEvent::SyncCompleted(summary));
    }

    /// Count consecutive failed cycles and raise one ConnectivityLoss alert
    /// per run of failures.
    fn record_sync(&mut self, ok: bool, now: u64, sink: &mut impl EventSink) {
        if ok {
            if self.loss_alerted {
                info!("Supervisor: sync recovered after {} failed cycles", self.sync_failures);
            }
            self.sync_failures = 0;
            self.loss_alerted = false;
            return;
        }
        self.sync_failures = self.sync_failures.saturating_add(1);
        let after = self.config.sync.loss_alert_after_failures;
        if !self.loss_alerted && self.sync_failures >= u32::from(after) {
            self.loss_alerted = true;
            warn!("Supervisor: {} sync cycles failed in a row", self.sync_failures);
            let alert = self.alert_ids.raise(
                AlertKind::ConnectivityLoss,
                AlertTarget::Device,
                self.sync_failures as f32,
                f32::from(after),
                now,
            );
            self.raise(alert, now, sink);
        }
    }

    fn update_link_state(
        &mut self,
        out: &mut impl RelayOutput,
        link_up: bool,
        now: u64,
        sink: &mut impl EventSink,
    ) {
        let health = &mut self.ctx.health;
        health.link_up = link_up;
        health.initial_read_ok = self.initial_read_ok;
        health.sensors_ok = self.initial_read_ok && !self.sensors.all_lost(now);
        health.sync_failures = self.sync_failures;
        health.all_lost_since = self.all_lost_since;
        health.now_ms = now;

        if let Some((from, to)) = self.fsm.tick(&mut self.ctx) {
            sink.emit(&AppEvent::StateChanged { from, to });
            self.urgent_dirty = true;
        }

        if self.ctx.outputs.safe_mode != self.relays.is_safe_mode() {
            self.relays.set_safe_mode(out, self.ctx.outputs.safe_mode, now);
            self.collect_relay_events(now, sink);
        }
    }

    fn raise(&mut self, alert: AlertEvent, now: u64, sink: &mut impl EventSink) {
        if alert.kind.is_threshold_violation() {
            self.unacked.insert(alert.alert_id);
        }
        sink.emit(&AppEvent::AlertRaised(alert));
        self.urgent_dirty = true;
        self.enqueue(UploadEntry::Alert(alert), now, sink);
    }

    fn enqueue(&mut self, entry: UploadEntry, now: u64, sink: &mut impl EventSink) {
        self.queue_dirty = true;
        match self.queue.push(entry) {
            PushOutcome::Stored => {}
            PushOutcome::EvictedOldest => debug!("Supervisor: upload queue full, oldest entry dropped"),
            PushOutcome::EvictedAlert(lost) => {
                error!("Supervisor: upload queue holds only alerts, alert {} dropped", lost.alert_id);
                if !self.eviction_alerted {
                    self.eviction_alerted = true;
                    let alert = self.alert_ids.raise(
                        AlertKind::ConnectivityLoss,
                        AlertTarget::Device,
                        self.queue.evicted() as f32,
                        self.queue.capacity() as f32,
                        now,
                    );
                    sink.emit(&AppEvent::AlertRaised(alert));
                    self.urgent_dirty = true;
                    if let PushOutcome::EvictedAlert(also_lost) = self.queue.push(UploadEntry::Alert(alert)) {
                        error!(
                            "Supervisor: alert {} dropped to make room for the overflow alert ({} evicted)",
                            also_lost.alert_id,
                            self.queue.evicted()
                        );
                    }
                }
            }
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
