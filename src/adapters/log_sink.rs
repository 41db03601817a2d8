//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one line per application event to
//! the logger (UART / USB-CDC on the device, stderr on the host).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::model::AlertTarget;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

fn target_label(target: AlertTarget) -> String {
    match target {
        AlertTarget::Channel(ch) => format!("channel {ch}"),
        AlertTarget::Relay(r) => format!("relay {r}"),
        AlertTarget::Device => "device".to_owned(),
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { state, boot_count } => {
                info!("START | state={} | boot={}", state, boot_count);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from, to);
            }
            AppEvent::AlertRaised(a) => {
                warn!(
                    "ALERT | #{} {:?} on {} | value={:.1} limit={:.1}",
                    a.alert_id,
                    a.kind,
                    target_label(a.target),
                    a.value,
                    a.threshold,
                );
            }
            AppEvent::RelayChanged(r) => {
                info!(
                    "RELAY | {} = {} | source={:?}",
                    r.relay_id,
                    if r.actual_state { "ON" } else { "OFF" },
                    r.source,
                );
            }
            AppEvent::SyncCompleted(s) => {
                info!(
                    "SYNC  | sent={} push={} | cmds={} pull={} | queued={}",
                    s.sent,
                    if s.push_failed { "FAIL" } else { "ok" },
                    s.commands,
                    if s.pull_failed { "FAIL" } else { "ok" },
                    s.queue_depth,
                );
            }
            AppEvent::CommandRejected { id, error } => {
                warn!("CMD   | rejected {} | {}", id.as_deref().unwrap_or("<unknown>"), error);
            }
        }
    }
}
