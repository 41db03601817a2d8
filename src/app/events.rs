//! Outbound application events.
//!
//! The [`Supervisor`](super::service::Supervisor) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them (serial log, display, test recorder).

use crate::error::Error;
use crate::fsm::LinkState;
use crate::model::{AlertEvent, RelayState};

/// Structured events emitted by the controller core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The supervisor has started (carries initial state and boot count).
    Started { state: LinkState, boot_count: u32 },

    /// The link-state machine transitioned.
    StateChanged { from: LinkState, to: LinkState },

    /// An alert was raised and queued for upload.
    AlertRaised(AlertEvent),

    /// A relay output acknowledged a new state.
    RelayChanged(RelayState),

    /// A sync cycle finished.
    SyncCompleted(SyncSummary),

    /// A command was refused or could not be parsed.
    CommandRejected { id: Option<String>, error: Error },
}

/// Outcome of one sync cycle, suitable for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncSummary {
    pub sent: usize,
    pub push_failed: bool,
    pub commands: usize,
    pub pull_failed: bool,
    pub queue_depth: usize,
}
