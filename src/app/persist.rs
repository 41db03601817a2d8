//! Controller state that survives a restart.
//!
//! One postcard blob under [`STATE_NAMESPACE`]/[`STATE_KEY`].  Writes go
//! through [`StoragePort::write`], which is atomic, so a power cut leaves
//! either the old or the new snapshot.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::ports::{StorageError, StoragePort};
use crate::model::RelayState;
use crate::schedule::ScheduleRule;
use crate::sync::queue::QueuedEntry;

pub const STATE_NAMESPACE: &str = "ctl";
pub const STATE_KEY: &str = "state";

/// Upper bound on the encoded snapshot.  A full 64-entry queue of status
/// heartbeats stays well under this.
pub const MAX_STATE_BLOB: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub boot_count: u32,
    /// Safe mode was active when this snapshot was taken.
    pub safe_mode: bool,
    pub last_alert_id: u32,
    pub relays: Vec<RelayState>,
    pub rules: Vec<ScheduleRule>,
    pub queue: Vec<QueuedEntry>,
    pub next_seq: u64,
}

impl PersistedState {
    /// Load the last snapshot.  `Ok(None)` on first boot.  A blob that no
    /// longer decodes is discarded with a warning rather than bricking boot.
    pub fn load(storage: &impl StoragePort) -> Result<Option<Self>, StorageError> {
        let mut buf = vec![0u8; MAX_STATE_BLOB];
        let len = match storage.read(STATE_NAMESPACE, STATE_KEY, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        match postcard::from_bytes::<Self>(&buf[..len]) {
            Ok(state) => {
                info!(
                    "Persist: restored boot #{} ({} relays, {} rules, {} queued)",
                    state.boot_count,
                    state.relays.len(),
                    state.rules.len(),
                    state.queue.len()
                );
                Ok(Some(state))
            }
            Err(e) => {
                warn!("Persist: stored state unreadable ({e}), starting fresh");
                Ok(None)
            }
        }
    }

    pub fn save(&self, storage: &mut impl StoragePort) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(self).map_err(|_| StorageError::IoError)?;
        if bytes.len() > MAX_STATE_BLOB {
            return Err(StorageError::Full);
        }
        storage.write(STATE_NAMESPACE, STATE_KEY, &bytes)
    }
}
