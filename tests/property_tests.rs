//! Property tests for the upload queue, the schedule tie-break and the
//! meter frame parser.
//!
//! Runs on host (x86_64) only: proptest is not available for ESP32 targets.

#![cfg(not(target_os = "espidf"))]

use chrono::NaiveDate;
use proptest::prelude::*;

use smartbuilding::adapters::pzem_uart::{build_read_request, crc16, parse_response};
use smartbuilding::model::{AlertIds, AlertKind, AlertTarget, SensorReading, UploadEntry};
use smartbuilding::schedule::{DaySet, ScheduleEngine, ScheduleRule, TimeOfDay};
use smartbuilding::sync::queue::{PushOutcome, UploadQueue};

// ── Upload queue ──────────────────────────────────────────────

/// `true` pushes an alert, `false` a reading.
fn arb_pushes() -> impl Strategy<Value = Vec<bool>> {
    proptest::collection::vec(any::<bool>(), 1..200)
}

proptest! {
    /// However entries arrive, the queue never exceeds its capacity, its
    /// sequence numbers stay strictly increasing, and alerts are only lost
    /// when nothing else is left to drop.
    #[test]
    fn queue_keeps_alerts_and_order(capacity in 4usize..32, pushes in arb_pushes()) {
        let mut queue = UploadQueue::new(capacity);
        let mut ids = AlertIds::new();
        let mut alerts_pushed = 0usize;

        for (t, is_alert) in pushes.iter().enumerate() {
            let t = t as u64;
            let entry = if *is_alert {
                alerts_pushed += 1;
                UploadEntry::Alert(ids.raise(AlertKind::OverPower, AlertTarget::Channel(1), 6_000.0, 5_000.0, t))
            } else {
                UploadEntry::Reading(SensorReading::invalid(1, t))
            };
            let only_alerts = queue.alert_count() == capacity;
            if let PushOutcome::EvictedAlert(_) = queue.push(entry) {
                prop_assert!(only_alerts);
            }

            prop_assert!(queue.len() <= capacity);
            let seqs: Vec<u64> = queue.iter().map(|q| q.seq).collect();
            prop_assert!(seqs.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(queue.alert_count() >= alerts_pushed.min(capacity - 1));
        }
        prop_assert_eq!(queue.next_seq(), pushes.len() as u64 + 1);
    }

    /// Acknowledging from the front always yields the lowest pending seq.
    #[test]
    fn ack_front_drains_in_seq_order(capacity in 4usize..16, n in 1usize..40) {
        let mut queue = UploadQueue::new(capacity);
        for t in 0..n as u64 {
            queue.push(UploadEntry::Reading(SensorReading::invalid(1, t)));
        }
        let mut last = 0;
        while let Some(q) = queue.ack_front() {
            prop_assert!(q.seq > last);
            last = q.seq;
        }
        prop_assert_eq!(last, n as u64);
    }
}

// ── Schedule tie-break ────────────────────────────────────────

fn arb_window() -> impl Strategy<Value = (u8, u8)> {
    (0u8..23).prop_flat_map(|start| (Just(start), (start + 1)..=23))
}

proptest! {
    /// When two rules on one relay overlap, the shorter window decides;
    /// equal windows fall to the lower rule id.
    #[test]
    fn narrower_rule_wins(
        (a_start, a_end) in arb_window(),
        (b_start, b_end) in arb_window(),
        a_on in any::<bool>(),
        b_on in any::<bool>(),
        hour in 0u32..24,
    ) {
        let rule = |id, start, end, on| ScheduleRule {
            rule_id: id,
            relay_id: 1,
            start: TimeOfDay::new(start, 0).unwrap(),
            end: TimeOfDay::new(end, 0).unwrap(),
            days: DaySet::EVERY_DAY,
            target_state: on,
            enabled: true,
        };
        let a = rule(1, a_start, a_end, a_on);
        let b = rule(2, b_start, b_end, b_on);

        let mut engine = ScheduleEngine::new(1);
        engine.upsert(a.clone()).unwrap();
        engine.upsert(b.clone()).unwrap();

        let now = NaiveDate::from_ymd_opt(2024, 6, 5)
            .and_then(|d| d.and_hms_opt(hour, 30, 0))
            .unwrap();
        let expected = match (a.matches(&now), b.matches(&now)) {
            (false, false) => None,
            (true, false) => Some(a_on),
            (false, true) => Some(b_on),
            (true, true) if b.window_minutes() < a.window_minutes() => Some(b_on),
            (true, true) => Some(a_on),
        };
        prop_assert_eq!(engine.evaluate(&now).get(&1).copied(), expected);
    }
}

// ── Meter frames ──────────────────────────────────────────────

proptest! {
    /// Arbitrary bytes never panic the parser, and any accepted frame
    /// carries exactly ten registers.
    #[test]
    fn response_parser_never_panics(addr in any::<u8>(), bytes in proptest::collection::vec(any::<u8>(), 0..40)) {
        if let Ok(frame) = parse_response(addr, &bytes) {
            prop_assert_eq!(frame.len(), 20);
        }
    }

    /// A request always ends in the CRC of its first six bytes.
    #[test]
    fn request_crc_is_consistent(addr in 1u8..=0xF7) {
        let req = build_read_request(addr);
        let crc = crc16(&req[..6]);
        prop_assert_eq!(u16::from_le_bytes([req[6], req[7]]), crc);
    }
}
