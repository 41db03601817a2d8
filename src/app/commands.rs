//! Inbound commands to the supervisor.
//!
//! These are actions requested by the outside world (remote command queue,
//! local console) that the [`Supervisor`](super::service::Supervisor)
//! validates and applies.

use crate::model::RelayId;
use crate::schedule::ScheduleRule;

/// Commands that adapters can send into the controller core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Manual relay switch.  Held until it expires or is released.
    SetRelay { relay: RelayId, on: bool },

    /// Drop the manual hold on a relay so the schedule takes over again.
    ReleaseRelay { relay: RelayId },

    /// Insert or replace a schedule rule.
    UpsertRule(ScheduleRule),

    /// Delete a schedule rule by id.
    DeleteRule { rule_id: u32 },

    /// Mark an alert as acknowledged (silences the buzzer).
    AckAlert { alert_id: u32 },
}

/// A command pulled from the remote work queue, with the queue key used to
/// remove it once processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub id: String,
    pub command: Command,
}
