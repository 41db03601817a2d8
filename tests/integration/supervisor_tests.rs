//! End-to-end tests for the Supervisor → relays / queue / remote pipeline.
//!
//! Every test drives a real [`Supervisor`] through mock adapters and a
//! manual clock, using the default configuration (5 s polls, 10 s sync,
//! 60 s schedule, debounce of two polls, 5000 W / 25 A limits).

use std::rc::Rc;

use serde_json::json;

use smartbuilding::adapters::nvs::NvsAdapter;
use smartbuilding::adapters::sim_meter::{NOMINAL, SimFault};
use smartbuilding::adapters::uplink::Uplink;
use smartbuilding::app::commands::Command;
use smartbuilding::app::events::AppEvent;
use smartbuilding::app::ports::{ClockPort, RemoteStore};
use smartbuilding::app::service::Supervisor;
use smartbuilding::config::ControllerConfig;
use smartbuilding::drivers::status_led::LedPattern;
use smartbuilding::error::{Error, RelayError, RemoteError};
use smartbuilding::fsm::LinkState;
use smartbuilding::model::{AlertKind, AlertTarget, RelaySource, UploadEntry};
use smartbuilding::schedule::{DaySet, ScheduleRule, TimeOfDay};
use smartbuilding::sensors::pzem::Measurement;

use crate::mock_hw::{MockBoard, MockClock, RecordingSink, Rig, SlowLink, SlowStore, monday_at};

const OVER_POWER: Measurement = Measurement {
    power: 6_000.0,
    current: 20.0,
    ..NOMINAL
};

fn manual(rig: &mut Rig, relay: u8, on: bool) -> Result<(), Error> {
    let now = rig.now();
    rig.sup
        .handle_command(Command::SetRelay { relay, on }, &mut rig.board, now)
}

// ── Startup ───────────────────────────────────────────────────

#[test]
fn first_tick_connects_and_drives_every_relay_off() {
    let rig = Rig::started(ControllerConfig::default());
    assert_eq!(rig.sup.state(), LinkState::Connected);
    assert_eq!(rig.board.writes, 8);
    assert!(rig.board.relays.iter().all(|on| !on));
    assert!(rig.board.led, "connected shows a solid LED");
    assert!(matches!(
        rig.sink.events.first(),
        Some(AppEvent::Started { state: LinkState::Booting, boot_count: 1 })
    ));
}

#[test]
fn status_heartbeat_reaches_the_store() {
    let mut rig = Rig::started(ControllerConfig::default());
    rig.step(10_000);
    let status = rig.store().at("/devices/esp32/esp32_001").cloned().unwrap();
    assert_eq!(status["link_state"], json!("connected"));
    assert_eq!(status["relays"].as_array().map(Vec::len), Some(8));
    assert_eq!(status["uptime_ms"], json!(10_000));
}

// ── Threshold monitoring ──────────────────────────────────────

#[test]
fn over_power_cuts_relay_and_raises_exactly_one_alert() {
    let mut rig = Rig::started(ControllerConfig::default());
    manual(&mut rig, 1, true).unwrap();
    assert!(rig.board.relay(1));

    rig.board.meters.set_measurement(1, OVER_POWER);
    rig.step(5_000);
    assert_eq!(rig.sink.alerts(AlertKind::OverPower), 0, "one poll is not confirmed");
    assert!(rig.board.relay(1));

    rig.step(5_000);
    assert_eq!(rig.sink.alerts(AlertKind::OverPower), 1);
    assert!(!rig.board.relay(1));
    let state = rig.sup.relay_state(1).unwrap();
    assert_eq!(state.source, RelaySource::SafetyOverride);
    assert!(!state.actual_state);

    // The relay event precedes the alert in the same tick.
    let relay_pos = rig.sink.events.iter().rposition(|e| {
        matches!(e, AppEvent::RelayChanged(s) if s.relay_id == 1 && s.source == RelaySource::SafetyOverride)
    });
    let alert_pos = rig
        .sink
        .events
        .iter()
        .rposition(|e| matches!(e, AppEvent::AlertRaised(a) if a.kind == AlertKind::OverPower));
    assert!(relay_pos.unwrap() < alert_pos.unwrap());

    // Still over the limit: no repeat alert, manual control refused.
    rig.run_for(10_000, 5_000);
    assert_eq!(rig.sink.alerts(AlertKind::OverPower), 1);
    assert_eq!(manual(&mut rig, 1, true), Err(Error::Relay(RelayError::OverrideActive(1))));

    // Back in range: held for one poll, released after the debounce window.
    rig.board.meters.set_measurement(1, NOMINAL);
    rig.step(5_000);
    assert!(rig.sup.relays().is_overridden(1));
    rig.step(5_000);
    assert!(!rig.sup.relays().is_overridden(1));
    manual(&mut rig, 1, true).unwrap();
    assert!(rig.board.relay(1));
}

#[test]
fn over_power_alert_drives_buzzer_until_acknowledged() {
    let mut rig = Rig::started(ControllerConfig::default());
    rig.board.meters.set_measurement(2, OVER_POWER);
    rig.run_for(10_000, 5_000);

    assert!(rig.sup.indicator().alarm());
    assert_eq!(rig.sup.unacknowledged_alerts(), 1);
    rig.run_for(2_000, 100);
    assert!(rig.board.buzzer_edges >= 2, "buzzer beeps repeatedly");

    let alert_id = rig
        .sink
        .events
        .iter()
        .find_map(|e| match e {
            AppEvent::AlertRaised(a) if a.target == AlertTarget::Channel(2) => Some(a.alert_id),
            _ => None,
        })
        .unwrap();
    let now = rig.now();
    rig.sup
        .handle_command(Command::AckAlert { alert_id }, &mut rig.board, now)
        .unwrap();
    rig.step(100);
    assert!(!rig.sup.indicator().alarm());
    assert!(!rig.board.buzzer);
}

#[test]
fn under_voltage_alerts_without_cutting_load() {
    let mut rig = Rig::started(ControllerConfig::default());
    manual(&mut rig, 3, true).unwrap();
    rig.board.meters.set_voltage(3, 180.0);
    rig.run_for(10_000, 5_000);
    assert_eq!(rig.sink.alerts(AlertKind::UnderVoltage), 1);
    assert!(rig.board.relay(3));
}

// ── Connectivity ──────────────────────────────────────────────

#[test]
fn three_failed_pushes_degrade_without_touching_relays() {
    let mut rig = Rig::started(ControllerConfig::default());
    manual(&mut rig, 5, true).unwrap();
    rig.store()
        .put("/commands/esp32_001/c1", &json!({ "type": "relay", "relay": 2, "state": true }), 0)
        .unwrap();
    rig.store().fail_put_after = Some(0);
    let relays_before = rig.board.relays.clone();

    rig.run_for(20_000, 5_000);
    assert_eq!(rig.sup.sync_failures(), 2);
    assert_eq!(rig.sup.state(), LinkState::Connected);

    rig.run_for(10_000, 5_000);
    assert_eq!(rig.sup.state(), LinkState::Degraded);
    assert!(rig.sink.events.contains(&AppEvent::StateChanged {
        from: LinkState::Connected,
        to: LinkState::Degraded,
    }));
    assert_eq!(rig.board.relays, relays_before);
    assert!(rig.store().at("/commands/esp32_001/c1").is_some(), "pull skipped");
    assert_eq!(rig.sup.indicator().pattern(), LedPattern::SlowBlink);
    assert_eq!(rig.sink.alerts(AlertKind::ConnectivityLoss), 1);

    // Local safety keeps working while degraded.
    rig.board.meters.set_measurement(1, OVER_POWER);
    rig.run_for(10_000, 5_000);
    assert_eq!(rig.sink.alerts(AlertKind::OverPower), 1);
    assert_eq!(rig.sup.relay_state(1).map(|s| s.source), Some(RelaySource::SafetyOverride));
    assert!(rig.board.relay(5));

    // Pushes recover: back to Connected, the next cycle pulls again.
    rig.store().fail_put_after = None;
    rig.run_for(10_000, 5_000);
    assert_eq!(rig.sup.state(), LinkState::Connected);
    rig.run_for(10_000, 5_000);
    assert!(rig.store().at("/commands/esp32_001/c1").is_none());
    assert!(rig.board.relay(2));
}

#[test]
fn link_down_counts_failures_and_reconnects() {
    let mut rig = Rig::started(ControllerConfig::default());
    rig.set_link(false);
    rig.run_for(30_000, 5_000);
    assert_eq!(rig.sup.state(), LinkState::Degraded);
    assert!(rig.net.link_mut().reconnects >= 1);

    rig.set_link(true);
    rig.run_for(10_000, 5_000);
    assert_eq!(rig.sup.state(), LinkState::Connected);
    assert_eq!(rig.sup.sync_failures(), 0);
}

#[test]
fn rejected_token_raises_one_connectivity_alert_per_outage() {
    let mut rig = Rig::started(ControllerConfig::default());
    rig.store().fail_all = Some(RemoteError::Unauthorized);
    rig.run_for(120_000, 5_000);
    assert_eq!(rig.sup.state(), LinkState::Degraded);
    assert_eq!(rig.sink.alerts(AlertKind::ConnectivityLoss), 1);
    let loss = rig.sink.events.iter().find_map(|e| match e {
        AppEvent::AlertRaised(a) if a.kind == AlertKind::ConnectivityLoss => Some(*a),
        _ => None,
    });
    assert_eq!(loss.map(|a| (a.target, a.raised_at)), Some((AlertTarget::Device, 30_000)));

    rig.store().fail_all = None;
    rig.run_for(20_000, 5_000);
    assert_eq!(rig.sup.state(), LinkState::Connected);
    assert_eq!(rig.sink.alerts(AlertKind::ConnectivityLoss), 1);

    // A new outage is a new episode.
    rig.store().fail_all = Some(RemoteError::Unauthorized);
    rig.run_for(30_000, 5_000);
    assert_eq!(rig.sink.alerts(AlertKind::ConnectivityLoss), 2);
}

#[test]
fn slow_network_never_delays_sensor_polls() {
    let config = ControllerConfig::default();
    let interval = config.timing.sensor_interval_ms;
    let worst_reads = config.timing.sensor_read_timeout_ms * config.hardware.meters.len() as u64;

    let clock = Rc::new(MockClock::new());
    let mut board = MockBoard::new(&config);
    board.read_delay = Some((clock.clone(), 400));
    let mut net = Uplink::new(SlowStore::new(clock.clone()), SlowLink::new(clock.clone()));
    let mut sink = RecordingSink::default();
    let mut sup = Supervisor::new(config, 0).unwrap();
    sup.start(&mut sink);
    sup.handle_command(Command::SetRelay { relay: 1, on: true }, &mut board, 0)
        .unwrap();

    let mut polls = Vec::new();
    let mut longest_tick = 0;
    while clock.monotonic_ms() < 180_000 {
        let t = clock.monotonic_ms();
        // Dead link, then a store that answers in 900 ms, then a fast one.
        net.link_mut().available = t >= 60_000;
        net.store_mut().latency_ms = if t < 120_000 { 900 } else { 100 };
        if t >= 150_000 {
            board.meters.set_measurement(1, OVER_POWER);
        }

        let reads = board.meters.reads();
        sup.tick(&mut board, &mut net, &*clock, &mut sink);
        if board.meters.reads() > reads {
            polls.push(t);
        }
        longest_tick = longest_tick.max(clock.monotonic_ms() - t);

        let idle = sup.next_deadline().saturating_sub(clock.monotonic_ms());
        clock.advance(idle.max(1));
    }

    assert_eq!(polls.first(), Some(&0));
    assert!(polls.last().is_some_and(|&t| t >= 175_000));
    assert!(polls.windows(2).all(|w| w[1] - w[0] <= interval), "polls: {polls:?}");
    assert!(longest_tick <= interval - worst_reads, "longest tick {longest_tick} ms");

    assert!(net.link_mut().reconnects >= 2);
    assert!(net.store().inner.puts > 0);
    assert_eq!(sup.state(), LinkState::Connected);
    assert_eq!(sink.alerts(AlertKind::ConnectivityLoss), 1);

    // The over-power at 150 s was cut on the second poll, network or not.
    assert_eq!(sink.alerts(AlertKind::OverPower), 1);
    assert!(!board.relay(1));
}

// ── Upload queue ──────────────────────────────────────────────

#[test]
fn partial_push_is_redrained_without_gaps_or_duplicates() {
    let mut rig = Rig::new(ControllerConfig::default());
    rig.store().fail_put_after = Some(2);
    rig.sup.start(&mut rig.sink);
    rig.tick();
    assert_eq!(rig.store().puts, 2);
    assert!(!rig.sup.queue().is_empty());

    rig.store().fail_put_after = None;
    rig.run_for(60_000, 5_000);

    assert!(rig.sup.queue().is_empty());
    // Every entry ever queued was stored exactly once.
    assert_eq!(u64::from(rig.store().puts), rig.sup.queue().next_seq() - 1);
    // 13 polls of 3 channels, one history snapshot.
    assert_eq!(rig.store().children("/sensors/pzem/esp32_001"), 39);
    assert_eq!(rig.store().children("/history/esp32_001"), 3);
}

#[test]
fn alerts_survive_queue_overflow() {
    let mut config = ControllerConfig::default();
    config.sync.queue_capacity = 8;
    config.sync.per_cycle_cap = 8;
    let mut rig = Rig::new(config);
    rig.set_link(false);
    rig.sup.start(&mut rig.sink);
    rig.tick();

    for ch in 1..=3 {
        rig.board.meters.set_measurement(ch, OVER_POWER);
    }
    rig.run_for(60_000, 5_000);
    assert_eq!(rig.sink.alerts(AlertKind::OverPower), 3);
    assert_eq!(rig.sup.queue().len(), rig.sup.queue().capacity());
    let queued_alerts = rig
        .sup
        .queue()
        .iter()
        .filter(|q| matches!(&q.entry, UploadEntry::Alert(a) if a.kind == AlertKind::OverPower))
        .count();
    assert_eq!(queued_alerts, 3);

    rig.set_link(true);
    rig.run_for(10_000, 5_000);
    // The three over-power alerts plus the one for the failed syncs.
    assert_eq!(rig.sink.alerts(AlertKind::ConnectivityLoss), 1);
    assert_eq!(rig.store().children("/alerts/esp32_001"), 4);
}

#[test]
fn evicting_an_alert_raises_one_connectivity_alert() {
    let mut config = ControllerConfig::default();
    config.sync.queue_capacity = 4;
    config.sync.per_cycle_cap = 4;
    // Only the overflow may raise a loss alert here.
    config.sync.degrade_after_failures = 10;
    config.sync.loss_alert_after_failures = 10;
    let mut rig = Rig::new(config);
    rig.set_link(false);
    rig.sup.start(&mut rig.sink);
    rig.tick();

    // Every channel violates all three limits: nine alerts at once.
    let bad = Measurement {
        voltage: 150.0,
        current: 30.0,
        power: 6_000.0,
        ..NOMINAL
    };
    for ch in 1..=3 {
        rig.board.meters.set_measurement(ch, bad);
    }
    rig.run_for(30_000, 5_000);

    assert_eq!(rig.sink.alerts(AlertKind::ConnectivityLoss), 1);
    assert!(rig.sup.queue().evicted() > 0);
    assert!(rig.sup.queue().alert_count() >= 3);
}

// ── Schedules ─────────────────────────────────────────────────

#[test]
fn shorter_rule_wins_at_half_past_twelve() {
    let mut rig = Rig::new(ControllerConfig::default());
    rig.clock.set_wall(Some(monday_at(11, 0)));
    rig.store()
        .put(
            "/schedules/esp32_001",
            &json!({
                "a": { "id": 1, "relay": "relay3", "start_time": "08:00", "end_time": "18:00", "target": true },
                "b": { "id": 2, "relay": 3, "start_time": "12:00:00", "end_time": "13:00:00", "target": false }
            }),
            0,
        )
        .unwrap();
    rig.sup.start(&mut rig.sink);
    rig.tick(); // pulls the rules
    rig.tick(); // evaluates them
    assert_eq!(rig.sup.schedule().len(), 2);
    assert!(rig.board.relay(3));

    rig.clock.advance(60_000);
    rig.clock.set_wall(Some(monday_at(12, 30)));
    rig.tick();
    assert!(!rig.board.relay(3));
    assert_eq!(rig.sup.relay_state(3).map(|s| s.source), Some(RelaySource::Schedule));

    rig.clock.advance(60_000);
    rig.clock.set_wall(Some(monday_at(13, 0)));
    rig.tick();
    assert!(rig.board.relay(3));
}

#[test]
fn schedule_waits_for_wall_clock() {
    let mut rig = Rig::started(ControllerConfig::default());
    let rule = ScheduleRule {
        rule_id: 7,
        relay_id: 4,
        start: TimeOfDay::new(0, 0).unwrap(),
        end: TimeOfDay::new(23, 59).unwrap(),
        days: DaySet::EVERY_DAY,
        target_state: true,
        enabled: true,
    };
    let now = rig.now();
    rig.sup
        .handle_command(Command::UpsertRule(rule), &mut rig.board, now)
        .unwrap();
    rig.step(1_000);
    assert!(!rig.board.relay(4), "no wall time yet");

    rig.clock.set_wall(Some(monday_at(9, 0)));
    rig.step(60_000);
    assert!(rig.board.relay(4));
}

// ── Remote commands ───────────────────────────────────────────

#[test]
fn commands_are_applied_once_and_removed() {
    let mut rig = Rig::started(ControllerConfig::default());
    rig.store()
        .put("/commands/esp32_001/-N1", &json!({ "type": "relay", "relay": "relay2", "state": true }), 0)
        .unwrap();
    rig.store()
        .put("/commands/esp32_001/-N2", &json!({ "type": "explode" }), 0)
        .unwrap();
    rig.step(10_000);

    assert!(rig.board.relay(2));
    assert_eq!(rig.sup.relay_state(2).map(|s| s.source), Some(RelaySource::Manual));
    assert_eq!(rig.store().children("/commands/esp32_001"), 0);
    assert_eq!(rig.sink.rejected(), 1);
}

#[test]
fn deleting_unknown_rule_is_rejected() {
    let mut rig = Rig::started(ControllerConfig::default());
    let now = rig.now();
    let err = rig
        .sup
        .handle_command(Command::DeleteRule { rule_id: 99 }, &mut rig.board, now)
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

// ── Hardware faults ───────────────────────────────────────────

#[test]
fn stuck_relay_raises_one_hardware_fault() {
    let mut rig = Rig::started(ControllerConfig::default());
    rig.board.stuck.insert(4);
    manual(&mut rig, 4, true).unwrap();
    rig.run_for(1_000, 100);

    assert_eq!(rig.sink.alerts(AlertKind::HardwareFault), 1);
    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::AlertRaised(a) if a.kind == AlertKind::HardwareFault && a.target == AlertTarget::Relay(4)
    )));

    rig.board.stuck.clear();
    rig.step(100);
    assert!(rig.board.relay(4));
}

// ── Safe mode ─────────────────────────────────────────────────

fn into_safe_mode(rig: &mut Rig) {
    rig.board.meters.set_all_faults(SimFault::Offline);
    // First failed poll at 5 s; safe mode once 60 s have passed since.
    rig.run_for(60_000, 5_000);
    assert_ne!(rig.sup.state(), LinkState::SafeMode);
    rig.step(5_000);
    assert_eq!(rig.sup.state(), LinkState::SafeMode);
}

#[test]
fn sustained_sensor_loss_enters_safe_mode() {
    let mut rig = Rig::started(ControllerConfig::default());
    manual(&mut rig, 2, true).unwrap();
    into_safe_mode(&mut rig);

    assert!(rig.board.relays.iter().all(|on| !on));
    assert_eq!(rig.sup.relay_state(2).map(|s| s.source), Some(RelaySource::SafetyOverride));
    assert_eq!(rig.sup.indicator().pattern(), LedPattern::RapidBlink);
    assert_eq!(rig.sink.alerts(AlertKind::SensorFault), 3);
    assert_eq!(manual(&mut rig, 2, true), Err(Error::Relay(RelayError::SafeMode)));

    rig.board.meters.set_all_faults(SimFault::None);
    rig.step(5_000);
    assert_eq!(rig.sup.state(), LinkState::Connected);
    assert!(!rig.board.relay(2), "manual holds do not survive safe mode");
    manual(&mut rig, 2, true).unwrap();
    assert!(rig.board.relay(2));
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn restart_restores_relays_rules_and_boot_count() {
    let mut nvs = NvsAdapter::new().unwrap();
    let mut rig = Rig::started(ControllerConfig::default());
    manual(&mut rig, 2, true).unwrap();
    let rule = ScheduleRule {
        rule_id: 3,
        relay_id: 6,
        start: TimeOfDay::new(22, 0).unwrap(),
        end: TimeOfDay::new(6, 0).unwrap(),
        days: DaySet::EVERY_DAY,
        target_state: true,
        enabled: true,
    };
    let now = rig.now();
    rig.sup
        .handle_command(Command::UpsertRule(rule.clone()), &mut rig.board, now)
        .unwrap();
    rig.step(100);
    let now = rig.now();
    assert!(rig.sup.persist_if_needed(&mut nvs, now));
    assert!(!rig.sup.persist_if_needed(&mut nvs, now), "nothing new to write");

    // Offline restart so the remote snapshot cannot replace the rules.
    let mut rig2 = Rig::new(ControllerConfig::default());
    rig2.set_link(false);
    rig2.sup.restore(&nvs);
    rig2.sup.start(&mut rig2.sink);
    rig2.tick();

    assert_eq!(rig2.sup.boot_count(), 2);
    assert_eq!(rig2.sup.state(), LinkState::Booting);
    assert!(rig2.board.relay(2));
    assert_eq!(rig2.sup.schedule().rules().cloned().collect::<Vec<_>>(), vec![rule]);
}

#[test]
fn restart_after_safe_mode_starts_with_relays_off() {
    let mut nvs = NvsAdapter::new().unwrap();
    let mut rig = Rig::started(ControllerConfig::default());
    manual(&mut rig, 2, true).unwrap();
    into_safe_mode(&mut rig);
    let now = rig.now();
    assert!(rig.sup.persist_if_needed(&mut nvs, now));

    let mut rig2 = Rig::new(ControllerConfig::default());
    rig2.sup.restore(&nvs);
    rig2.sup.start(&mut rig2.sink);
    rig2.tick();

    assert!(rig2.board.relays.iter().all(|on| !on));
    assert_eq!(rig2.sup.relay_state(2).map(|s| s.source), Some(RelaySource::SafetyOverride));
    assert_eq!(rig2.sup.state(), LinkState::Connected, "healthy meters on boot");
}

#[test]
fn safety_override_survives_restart() {
    let mut nvs = NvsAdapter::new().unwrap();
    let mut rig = Rig::started(ControllerConfig::default());
    manual(&mut rig, 1, true).unwrap();
    rig.board.meters.set_measurement(1, OVER_POWER);
    rig.run_for(10_000, 5_000);
    assert!(rig.sup.relays().is_overridden(1));
    let now = rig.now();
    assert!(rig.sup.persist_if_needed(&mut nvs, now));

    // Load is still too high after the restart.
    let mut rig2 = Rig::new(ControllerConfig::default());
    rig2.board.meters.set_measurement(1, OVER_POWER);
    rig2.sup.restore(&nvs);
    rig2.sup.start(&mut rig2.sink);
    rig2.tick();
    assert!(!rig2.board.relay(1));
    assert!(rig2.sup.relays().is_overridden(1));
    assert_eq!(manual(&mut rig2, 1, true), Err(Error::Relay(RelayError::OverrideActive(1))));

    rig2.run_for(10_000, 5_000);
    assert!(rig2.sup.relays().is_overridden(1));
    assert_eq!(rig2.sink.alerts(AlertKind::OverPower), 0, "reported before the restart");

    rig2.board.meters.set_measurement(1, NOMINAL);
    rig2.run_for(10_000, 5_000);
    assert!(!rig2.sup.relays().is_overridden(1));
    manual(&mut rig2, 1, true).unwrap();
    assert!(rig2.board.relay(1));
}

#[test]
fn queued_alerts_survive_restart() {
    let mut nvs = NvsAdapter::new().unwrap();
    let mut rig = Rig::started(ControllerConfig::default());
    rig.set_link(false);
    rig.board.meters.set_measurement(1, OVER_POWER);
    rig.run_for(10_000, 5_000);
    let now = rig.now();
    rig.sup.persist_if_needed(&mut nvs, now);

    let mut rig2 = Rig::new(ControllerConfig::default());
    rig2.sup.restore(&nvs);
    assert_eq!(rig2.sup.unacknowledged_alerts(), 1);
    assert!(rig2.sup.queue().alert_count() >= 1);
    rig2.sup.start(&mut rig2.sink);
    rig2.tick();
    assert_eq!(rig2.store().children("/alerts/esp32_001"), 1);
}
