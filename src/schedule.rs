//! Time-windowed automation rules.
//!
//! A [`ScheduleRule`] asks for a relay to be on (or off) during a daily
//! window on selected weekdays.  Rules may overlap; for each relay the
//! matching rule with the **shortest window** wins, ties going to the
//! **lowest rule id**.  Relays with no matching rule are left out of the
//! result so the relay bank keeps their current state.
//!
//! Windows are half-open, `[start, end)`.  A window whose end is before its
//! start runs overnight; after midnight it still belongs to the weekday on
//! which it started.
//!
//! Only the wall clock is consulted here, and only through the `now`
//! argument of [`ScheduleEngine::evaluate`].

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::ConfigInvalid;
use crate::model::RelayId;

const MINUTES_PER_DAY: u16 = 24 * 60;

// ═══════════════════════════════════════════════════════════════
//  Time of day / weekday set
// ═══════════════════════════════════════════════════════════════

/// Minutes since local midnight, `0..1440`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ConfigInvalid> {
        if hour >= 24 || minute >= 60 {
            return Err(ConfigInvalid("schedule: time of day out of range"));
        }
        Ok(Self(u16::from(hour) * 60 + u16::from(minute)))
    }

    /// Parse `"HH:MM"` (24-hour clock).
    pub fn parse(s: &str) -> Result<Self, ConfigInvalid> {
        const BAD: ConfigInvalid = ConfigInvalid("schedule: time must be HH:MM");
        let (h, m) = s.trim().split_once(':').ok_or(BAD)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(BAD);
        }
        let hour = h.parse::<u8>().map_err(|_| BAD)?;
        let minute = m.parse::<u8>().map_err(|_| BAD)?;
        Self::new(hour, minute)
    }

    pub fn of(now: &NaiveDateTime) -> Self {
        Self((now.hour() * 60 + now.minute()) as u16)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl core::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Set of weekdays, bit 0 = Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DaySet(u8);

impl DaySet {
    pub const EVERY_DAY: DaySet = DaySet(0x7F);
    pub const WEEKDAYS: DaySet = DaySet(0x1F);

    pub fn from_days(days: impl IntoIterator<Item = Weekday>) -> Self {
        days.into_iter().fold(Self(0), |mut set, d| {
            set.insert(d);
            set
        })
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter(move |d| self.contains(*d))
    }
}

/// Accepts full English names and three-letter forms, any case.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    // chrono's FromStr handles "mon" and "monday".
    name.trim().parse::<Weekday>().ok()
}

// ═══════════════════════════════════════════════════════════════
//  Rules
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub rule_id: u32,
    pub relay_id: RelayId,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub days: DaySet,
    pub target_state: bool,
    pub enabled: bool,
}

impl ScheduleRule {
    pub fn validate(&self, relay_count: usize) -> Result<(), ConfigInvalid> {
        if self.relay_id == 0 || usize::from(self.relay_id) > relay_count {
            return Err(ConfigInvalid("schedule: unknown relay"));
        }
        if self.start == self.end {
            return Err(ConfigInvalid("schedule: empty window (start == end)"));
        }
        if self.days.is_empty() {
            return Err(ConfigInvalid("schedule: no weekday selected"));
        }
        Ok(())
    }

    pub fn is_overnight(&self) -> bool {
        self.end < self.start
    }

    /// Window length in minutes.
    pub fn window_minutes(&self) -> u16 {
        if self.is_overnight() {
            MINUTES_PER_DAY - self.start.0 + self.end.0
        } else {
            self.end.0 - self.start.0
        }
    }

    pub fn matches(&self, now: &NaiveDateTime) -> bool {
        if !self.enabled {
            return false;
        }
        let t = TimeOfDay::of(now);
        let today = now.weekday();
        if !self.is_overnight() {
            return t >= self.start && t < self.end && self.days.contains(today);
        }
        if t >= self.start {
            self.days.contains(today)
        } else if t < self.end {
            self.days.contains(today.pred())
        } else {
            false
        }
    }

    /// Ordering key for the tie-break: shorter window, then lower id.
    fn priority(&self) -> (u16, u32) {
        (self.window_minutes(), self.rule_id)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Engine
// ═══════════════════════════════════════════════════════════════

pub struct ScheduleEngine {
    rules: BTreeMap<u32, ScheduleRule>,
    relay_count: usize,
    dirty: bool,
}

impl ScheduleEngine {
    pub fn new(relay_count: usize) -> Self {
        Self {
            rules: BTreeMap::new(),
            relay_count,
            dirty: false,
        }
    }

    /// Insert or replace a rule.  Invalid rules are rejected and leave the
    /// existing rule with that id untouched.
    pub fn upsert(&mut self, rule: ScheduleRule) -> Result<(), ConfigInvalid> {
        rule.validate(self.relay_count)?;
        info!(
            "Schedule: rule {} relay {} {}-{} -> {}{}",
            rule.rule_id,
            rule.relay_id,
            rule.start,
            rule.end,
            if rule.target_state { "ON" } else { "OFF" },
            if rule.enabled { "" } else { " (disabled)" }
        );
        if self.rules.get(&rule.rule_id) != Some(&rule) {
            self.rules.insert(rule.rule_id, rule);
            self.dirty = true;
        }
        Ok(())
    }

    pub fn remove(&mut self, rule_id: u32) -> bool {
        let removed = self.rules.remove(&rule_id).is_some();
        if removed {
            info!("Schedule: rule {rule_id} removed");
            self.dirty = true;
        }
        removed
    }

    /// Replace the whole rule set with a remote snapshot.  Invalid rules are
    /// dropped; the number dropped is returned.
    pub fn replace(&mut self, rules: impl IntoIterator<Item = ScheduleRule>) -> usize {
        let mut next = BTreeMap::new();
        let mut rejected = 0;
        for rule in rules {
            match rule.validate(self.relay_count) {
                Ok(()) => {
                    next.insert(rule.rule_id, rule);
                }
                Err(e) => {
                    log::warn!("Schedule: rule {} dropped: {e}", rule.rule_id);
                    rejected += 1;
                }
            }
        }
        if next != self.rules {
            info!("Schedule: {} rules loaded", next.len());
            self.rules = next;
            self.dirty = true;
        }
        rejected
    }

    /// Target state per relay at wall time `now`.
    pub fn evaluate(&self, now: &NaiveDateTime) -> BTreeMap<RelayId, bool> {
        let mut winners: BTreeMap<RelayId, &ScheduleRule> = BTreeMap::new();
        for rule in self.rules.values().filter(|r| r.matches(now)) {
            winners
                .entry(rule.relay_id)
                .and_modify(|best| {
                    if rule.priority() < best.priority() {
                        *best = rule;
                    }
                })
                .or_insert(rule);
        }
        debug!("Schedule: {} relays targeted at {now}", winners.len());
        winners
            .into_iter()
            .map(|(relay, rule)| (relay, rule.target_state))
            .collect()
    }

    pub fn rules(&self) -> impl Iterator<Item = &ScheduleRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns `true` once after the rule set changed.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }
}
