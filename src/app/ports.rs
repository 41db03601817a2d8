//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Supervisor (domain)
//! ```
//!
//! Driven adapters (meters, relays, remote store, network, clock, storage)
//! implement these traits.  The [`Supervisor`](super::service::Supervisor)
//! consumes them via generics, so the domain core never touches hardware
//! directly.
//!
//! Every call that can block takes a timeout and must return within it.

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::config::ControllerConfig;
use crate::error::{RemoteError, Result as CtlResult, SensorError};
use crate::model::{ChannelId, RelayId};
use crate::sensors::pzem::RawFrame;

// ───────────────────────────────────────────────────────────────
// Sensor bus (driven adapter: meters → domain)
// ───────────────────────────────────────────────────────────────

/// Access to the metering channels.  One implementation per bus technique.
pub trait SensorBus {
    /// Read the measurement registers of one channel.  Must give up with
    /// [`SensorError::Timeout`] once `timeout_ms` has elapsed.
    fn read_channel(&mut self, channel: ChannelId, timeout_ms: u64) -> Result<RawFrame, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Relay outputs (driven adapter: domain → coils)
// ───────────────────────────────────────────────────────────────

pub trait RelayOutput {
    /// Drive one relay.  `Ok` means the output acknowledged the new level;
    /// a fault is reported as [`Error::Hardware`](crate::error::Error::Hardware).
    fn write_output(&mut self, relay: RelayId, on: bool) -> CtlResult<()>;
}

// ───────────────────────────────────────────────────────────────
// Status indicators (driven adapter: domain → LED / buzzer)
// ───────────────────────────────────────────────────────────────

pub trait IndicatorPort {
    fn set_status_led(&mut self, on: bool);
    fn set_buzzer(&mut self, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Remote store (driven adapter: domain ↔ realtime database)
// ───────────────────────────────────────────────────────────────

/// JSON document store addressed by slash-separated paths.
pub trait RemoteStore {
    /// Write (replace) the document at `path`.
    fn put(&mut self, path: &str, body: &Value, timeout_ms: u64) -> Result<(), RemoteError>;

    /// Read the document at `path`.  A missing document is `Value::Null`.
    fn get(&mut self, path: &str, timeout_ms: u64) -> Result<Value, RemoteError>;

    /// Delete the document at `path`.  Deleting a missing path succeeds.
    fn remove(&mut self, path: &str, timeout_ms: u64) -> Result<(), RemoteError>;
}

// ───────────────────────────────────────────────────────────────
// Connectivity (driven adapter: domain ↔ Wi-Fi station)
// ───────────────────────────────────────────────────────────────

pub trait ConnectivityPort {
    fn is_up(&self) -> bool;

    /// Start or advance a reconnection attempt.  Must not block beyond
    /// `timeout_ms`; returns whether the link is up afterwards.
    fn reconnect(&mut self, timeout_ms: u64) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Milliseconds since boot.  Never goes backwards.
    fn monotonic_ms(&self) -> u64;

    /// Local wall time, or `None` until it has been synchronised.
    /// Only the schedule engine consumes this.
    fn wall_clock(&self) -> Option<NaiveDateTime>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / display)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists controller configuration.
///
/// Implementations must validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], never silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`ControllerConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<ControllerConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &ControllerConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// The caller's buffer is smaller than the stored value.
    BufferTooSmall,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for StorageError {}
