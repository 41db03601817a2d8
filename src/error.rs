//! Unified error types for the controller firmware.
//!
//! A single `Error` enum that every subsystem converts into, mirroring the
//! fault taxonomy the supervisor reasons about:
//!
//! | Variant        | Class              | Policy                              |
//! |----------------|--------------------|-------------------------------------|
//! | `Sensor`       | SensorFault        | retried each poll, alert after N    |
//! | `Hardware`     | HardwareFault      | retried each tick, alert after N    |
//! | `Remote`       | ConnectivityLoss   | never blocks local control          |
//! | `Config`       | ConfigInvalid      | dropped and logged, never applied   |
//! | `Relay`        | (command rejected) | caller decides                      |
//!
//! Threshold violations are not errors: they are alerts with an attached
//! safety action (see [`crate::safety`]).
//!
//! All variants are `Copy` so they pass through the tick loop without
//! allocation.

use core::fmt;

use crate::model::RelayId;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A meter channel could not be read or returned implausible data.
    Sensor(SensorError),
    /// A relay output did not acknowledge a write.
    Hardware(RelayId),
    /// The remote store could not be reached or answered badly.
    Remote(RemoteError),
    /// A rule, command or configuration value is malformed.
    Config(ConfigInvalid),
    /// A relay command was refused by the arbitration policy.
    Relay(RelayError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Hardware(relay) => write!(f, "hardware: relay {relay} write not acknowledged"),
            Self::Remote(e) => write!(f, "remote: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Relay(e) => write!(f, "relay: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The meter did not answer before the read deadline.
    Timeout,
    /// The frame had the wrong length or could not be decoded.
    Malformed,
    /// A decoded field is outside its physically plausible range.
    OutOfRange,
    /// The bus itself reported an I/O failure.
    Bus,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "read timed out"),
            Self::Malformed => write!(f, "malformed frame"),
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::Bus => write!(f, "bus I/O error"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Remote store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteError {
    /// The call did not complete before its deadline.
    Timeout,
    /// The store rejected our credentials.
    Unauthorized,
    /// The response body could not be interpreted.
    Malformed,
    /// Connection-level failure (DNS, TCP, TLS, HTTP 5xx).
    Transport,
    /// The link is down; the call was not attempted.
    Offline,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "deadline exceeded"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Malformed => write!(f, "malformed response"),
            Self::Transport => write!(f, "transport failure"),
            Self::Offline => write!(f, "link down"),
        }
    }
}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        Self::Remote(e)
    }
}

// ---------------------------------------------------------------------------
// Config / payload validation
// ---------------------------------------------------------------------------

/// A value failed validation.  The message names the field and the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigInvalid(pub &'static str);

impl fmt::Display for ConfigInvalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl From<ConfigInvalid> for Error {
    fn from(e: ConfigInvalid) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Relay arbitration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    /// A safety override holds this relay off.
    OverrideActive(RelayId),
    /// The controller is in safe mode; all relays are held off.
    SafeMode,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverrideActive(relay) => write!(f, "safety override active on relay {relay}"),
            Self::SafeMode => write!(f, "safe mode holds all relays off"),
        }
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
