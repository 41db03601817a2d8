//! JSON wire format for the realtime database.
//!
//! Outbound: every queued entry becomes one document at
//! `{kind path}/{device_id}/{key}` where the key is built from the device
//! id, boot counter, timestamp and queue sequence.  Re-sending an entry
//! after a lost acknowledgement overwrites the same document, so the
//! store sees each entry once.  The device status document is the
//! exception: it lives at `{status path}/{device_id}` and is overwritten.
//!
//! Inbound: command queue entries and schedule rules.  Relay references
//! accept `3` or `"relay3"`; weekdays accept `"monday"` or `"mon"`; times
//! accept `"HH:MM"` or `"HH:MM:SS"`; boolean flags accept `true`/`1`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::commands::{Command, RemoteCommand};
use crate::config::ControllerConfig;
use crate::error::ConfigInvalid;
use crate::model::{RelayId, UploadEntry};
use crate::schedule::{DaySet, ScheduleRule, TimeOfDay, parse_weekday};
use crate::sync::queue::QueuedEntry;

// ═══════════════════════════════════════════════════════════════
//  Outbound
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    device_id: &'a str,
    boot: u32,
    seq: u64,
    #[serde(flatten)]
    body: &'a T,
}

/// One document ready for [`RemoteStore::put`](crate::app::ports::RemoteStore::put).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub body: Value,
}

pub fn entry_key(device_id: &str, boot: u32, q: &QueuedEntry) -> String {
    format!("{device_id}_{boot}_{}_{}", q.entry.timestamp_ms(), q.seq)
}

fn join(base: &str, device_id: &str, key: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    match key {
        Some(k) => format!("{base}/{device_id}/{k}"),
        None => format!("{base}/{device_id}"),
    }
}

fn envelope<T: Serialize>(device_id: &str, boot: u32, seq: u64, body: &T) -> Result<Value, ConfigInvalid> {
    serde_json::to_value(Envelope {
        device_id,
        boot,
        seq,
        body,
    })
    .map_err(|_| ConfigInvalid("wire: entry not serialisable"))
}

pub fn encode_entry(config: &ControllerConfig, boot: u32, q: &QueuedEntry) -> Result<Document, ConfigInvalid> {
    let device = config.device.device_id.as_str();
    let paths = &config.sync.paths;
    let key = entry_key(device, boot, q);
    let (path, body) = match &q.entry {
        UploadEntry::Reading(r) => (join(&paths.sensors, device, Some(&key)), envelope(device, boot, q.seq, r)?),
        UploadEntry::History(r) => (join(&paths.history, device, Some(&key)), envelope(device, boot, q.seq, r)?),
        UploadEntry::Relay(s) => (join(&paths.devices, device, Some(&key)), envelope(device, boot, q.seq, s)?),
        UploadEntry::Alert(a) => (join(&paths.alerts, device, Some(&key)), envelope(device, boot, q.seq, a)?),
        UploadEntry::Status(s) => (join(&paths.status, device, None), envelope(device, boot, q.seq, s)?),
    };
    Ok(Document { path, body })
}

pub fn commands_path(config: &ControllerConfig) -> String {
    join(&config.sync.paths.commands, &config.device.device_id, None)
}

pub fn schedules_path(config: &ControllerConfig) -> String {
    join(&config.sync.paths.schedules, &config.device.device_id, None)
}

// ═══════════════════════════════════════════════════════════════
//  Inbound
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelayRef {
    Number(u8),
    Name(String),
}

impl RelayRef {
    /// Relay ids are 1-based; `0` and `"relay0"` are rejected.
    fn resolve(&self) -> Result<RelayId, ConfigInvalid> {
        const BAD: ConfigInvalid = ConfigInvalid("wire: bad relay reference");
        let id = match self {
            Self::Number(n) => *n,
            Self::Name(s) => {
                let s = s.trim();
                let digits = s.strip_prefix("relay").unwrap_or(s);
                digits.parse::<u8>().map_err(|_| BAD)?
            }
        };
        if id == 0 {
            return Err(BAD);
        }
        Ok(id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn get(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Days {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RuleWire {
    #[serde(alias = "rule_id")]
    id: u32,
    #[serde(alias = "relay_id", alias = "device_type")]
    relay: RelayRef,
    start_time: String,
    end_time: String,
    #[serde(default, alias = "day_of_week")]
    days: Option<Days>,
    #[serde(default, alias = "target_state")]
    target: Option<Flag>,
    #[serde(default, alias = "is_active")]
    enabled: Option<Flag>,
}

fn parse_time(s: &str) -> Result<TimeOfDay, ConfigInvalid> {
    // "HH:MM:SS" as stored by the dashboard; seconds are ignored.
    let s = s.trim();
    match s.rsplit_once(':') {
        Some((hm, secs)) if hm.contains(':') && secs.len() == 2 => TimeOfDay::parse(hm),
        _ => TimeOfDay::parse(s),
    }
}

impl RuleWire {
    fn into_rule(self) -> Result<ScheduleRule, ConfigInvalid> {
        let days = match self.days {
            None => DaySet::EVERY_DAY,
            Some(Days::One(d)) => {
                let day = parse_weekday(&d).ok_or(ConfigInvalid("wire: bad weekday"))?;
                DaySet::from_days([day])
            }
            Some(Days::Many(list)) => {
                let mut set = DaySet::default();
                for d in &list {
                    set.insert(parse_weekday(d).ok_or(ConfigInvalid("wire: bad weekday"))?);
                }
                set
            }
        };
        Ok(ScheduleRule {
            rule_id: self.id,
            relay_id: self.relay.resolve()?,
            start: parse_time(&self.start_time)?,
            end: parse_time(&self.end_time)?,
            days,
            target_state: self.target.as_ref().is_none_or(Flag::get),
            enabled: self.enabled.as_ref().is_none_or(Flag::get),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CommandWire {
    Relay {
        relay: RelayRef,
        #[serde(alias = "on", alias = "value")]
        state: Flag,
    },
    Release {
        relay: RelayRef,
    },
    Rule {
        rule: RuleWire,
    },
    DeleteRule {
        rule_id: u32,
    },
    AckAlert {
        alert_id: u32,
    },
}

impl CommandWire {
    fn into_command(self) -> Result<Command, ConfigInvalid> {
        Ok(match self {
            Self::Relay { relay, state } => Command::SetRelay {
                relay: relay.resolve()?,
                on: state.get(),
            },
            Self::Release { relay } => Command::ReleaseRelay {
                relay: relay.resolve()?,
            },
            Self::Rule { rule } => Command::UpsertRule(rule.into_rule()?),
            Self::DeleteRule { rule_id } => Command::DeleteRule { rule_id },
            Self::AckAlert { alert_id } => Command::AckAlert { alert_id },
        })
    }
}

/// Parse one command queue entry.
pub fn parse_command(id: &str, value: &Value) -> Result<RemoteCommand, ConfigInvalid> {
    let wire = CommandWire::deserialize(value).map_err(|_| ConfigInvalid("wire: malformed command"))?;
    Ok(RemoteCommand {
        id: id.to_owned(),
        command: wire.into_command()?,
    })
}

/// Parse one schedule rule document.
pub fn parse_rule(value: &Value) -> Result<ScheduleRule, ConfigInvalid> {
    RuleWire::deserialize(value)
        .map_err(|_| ConfigInvalid("wire: malformed rule"))?
        .into_rule()
}

/// Parse the schedules snapshot: an object keyed by rule id, an array
/// (the store returns arrays for dense integer keys, with `null` holes),
/// or `null` for no rules.  Malformed rules are returned as errors so the
/// caller can log and drop them.
pub fn parse_rules(value: &Value) -> Result<Vec<Result<ScheduleRule, ConfigInvalid>>, ConfigInvalid> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map.values().map(parse_rule).collect()),
        Value::Array(items) => Ok(items.iter().filter(|v| !v.is_null()).map(parse_rule).collect()),
        _ => Err(ConfigInvalid("wire: schedules must be an object")),
    }
}
