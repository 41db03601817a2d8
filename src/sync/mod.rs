//! Remote synchronisation: upload queue draining and command pulls.
//!
//! The [`SyncClient`] never blocks local control.  Every remote call gets
//! the smaller of the per-call timeout and what is left of the cycle
//! budget, and a cycle stops as soon as its budget is spent.
//!
//! ## Delivery
//!
//! Push is at-least-once: an entry is removed from the queue only after the
//! store acknowledged it, and the first failure ends the cycle with that
//! entry still at the front.  Remote keys are derived from the queue
//! sequence, so a re-send overwrites rather than duplicates.
//!
//! The command path is a work queue.  Each processed entry is deleted from
//! the store; its id is also remembered locally so a failed delete does not
//! cause the command to be applied twice.
//!
//! Failure counting across cycles, and the ConnectivityLoss alert it leads
//! to, belong to the supervisor: a cycle can fail before any pull runs.

pub mod queue;
pub mod wire;

use std::collections::VecDeque;

use log::{debug, info, warn};
use serde_json::Value;

use crate::app::commands::RemoteCommand;
use crate::app::ports::{ClockPort, RemoteStore};
use crate::config::ControllerConfig;
use crate::error::{ConfigInvalid, RemoteError};
use crate::schedule::ScheduleRule;
use queue::UploadQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushReport {
    pub sent: usize,
    /// Set when a put failed; the entry stays queued.
    pub failed: Option<RemoteError>,
}

#[derive(Debug, Default)]
pub struct PullReport {
    pub commands: Vec<RemoteCommand>,
    /// Present only when the remote rule set changed since the last pull.
    pub rules: Option<Vec<ScheduleRule>>,
    /// Entries dropped as malformed, with their queue id when known.
    pub rejected: Vec<(Option<String>, ConfigInvalid)>,
    pub failed: Option<RemoteError>,
}

pub struct SyncClient {
    call_timeout_ms: u64,
    per_cycle_cap: usize,
    processed_capacity: usize,
    processed: VecDeque<String>,
    pull_failures: u32,
    last_schedules: Option<Value>,
}

impl SyncClient {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            call_timeout_ms: config.sync.call_timeout_ms,
            per_cycle_cap: config.sync.per_cycle_cap,
            processed_capacity: config.sync.processed_ids_capacity.max(1),
            processed: VecDeque::new(),
            pull_failures: 0,
            last_schedules: None,
        }
    }

    /// Timeout for the next call, or `None` once the budget is spent.
    fn call_timeout(&self, clock: &impl ClockPort, deadline_ms: u64) -> Option<u64> {
        let remaining = deadline_ms.saturating_sub(clock.monotonic_ms());
        (remaining > 0).then(|| remaining.min(self.call_timeout_ms))
    }

    /// Send queued entries oldest-first, up to the per-cycle cap.
    pub fn push_pending(
        &mut self,
        store: &mut impl RemoteStore,
        queue: &mut UploadQueue,
        config: &ControllerConfig,
        boot: u32,
        clock: &impl ClockPort,
        deadline_ms: u64,
    ) -> PushReport {
        let mut report = PushReport::default();

        while report.sent < self.per_cycle_cap {
            let Some(front) = queue.front() else { break };
            let Some(timeout) = self.call_timeout(clock, deadline_ms) else {
                debug!("Sync: push budget spent after {} entries", report.sent);
                break;
            };

            let doc = match wire::encode_entry(config, boot, front) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Sync: dropping entry {}: {e}", front.seq);
                    queue.ack_front();
                    continue;
                }
            };

            match store.put(&doc.path, &doc.body, timeout) {
                Ok(()) => {
                    queue.ack_front();
                    report.sent += 1;
                }
                Err(e) => {
                    warn!("Sync: push failed at {}: {e}", doc.path);
                    report.failed = Some(e);
                    break;
                }
            }
        }
        report
    }

    /// Read and consume the command queue and the schedule snapshot.
    pub fn pull_commands(
        &mut self,
        store: &mut impl RemoteStore,
        config: &ControllerConfig,
        clock: &impl ClockPort,
        deadline_ms: u64,
    ) -> PullReport {
        let mut report = PullReport::default();

        match self.pull_inner(store, config, clock, deadline_ms, &mut report) {
            Ok(()) => {
                if self.pull_failures > 0 {
                    info!("Sync: pulls recovered after {} failures", self.pull_failures);
                }
                self.pull_failures = 0;
            }
            Err(e) => {
                self.pull_failures = self.pull_failures.saturating_add(1);
                warn!("Sync: pull failed ({e}), {} in a row", self.pull_failures);
                report.failed = Some(e);
            }
        }
        report
    }

    fn pull_inner(
        &mut self,
        store: &mut impl RemoteStore,
        config: &ControllerConfig,
        clock: &impl ClockPort,
        deadline_ms: u64,
        report: &mut PullReport,
    ) -> Result<(), RemoteError> {
        let base = wire::commands_path(config);
        let timeout = self.call_timeout(clock, deadline_ms).ok_or(RemoteError::Timeout)?;
        let entries = match store.get(&base, timeout)? {
            Value::Null => serde_json::Map::new(),
            Value::Object(map) => map,
            _ => return Err(RemoteError::Malformed),
        };

        // Keys sort chronologically for store-generated push ids.
        for (id, value) in &entries {
            let seen = self.processed.iter().any(|p| p == id);
            if !seen {
                match wire::parse_command(id, value) {
                    Ok(cmd) => report.commands.push(cmd),
                    Err(e) => {
                        warn!("Sync: command {id} dropped: {e}");
                        report.rejected.push((Some(id.clone()), e));
                    }
                }
                self.remember(id);
            }

            let Some(timeout) = self.call_timeout(clock, deadline_ms) else {
                // Removal is retried next cycle; the id is remembered.
                continue;
            };
            if let Err(e) = store.remove(&format!("{base}/{id}"), timeout) {
                warn!("Sync: could not remove command {id}: {e}");
            }
        }

        let timeout = self.call_timeout(clock, deadline_ms).ok_or(RemoteError::Timeout)?;
        let snapshot = store.get(&wire::schedules_path(config), timeout)?;
        if self.last_schedules.as_ref() != Some(&snapshot) {
            let parsed = wire::parse_rules(&snapshot).map_err(|_| RemoteError::Malformed)?;
            let mut rules = Vec::with_capacity(parsed.len());
            for rule in parsed {
                match rule {
                    Ok(r) => rules.push(r),
                    Err(e) => {
                        warn!("Sync: schedule rule dropped: {e}");
                        report.rejected.push((None, e));
                    }
                }
            }
            report.rules = Some(rules);
            self.last_schedules = Some(snapshot);
        }
        Ok(())
    }

    fn remember(&mut self, id: &str) {
        if self.processed.len() >= self.processed_capacity {
            self.processed.pop_front();
        }
        self.processed.push_back(id.to_owned());
    }

    #[cfg(test)]
    fn pull_failures(&self) -> u32 {
        self.pull_failures
    }
}
