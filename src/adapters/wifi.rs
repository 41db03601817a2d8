//! Wi-Fi station-mode adapter.
//!
//! Implements [`ConnectivityPort`].  The supervisor calls
//! [`reconnect`](ConnectivityPort::reconnect) on its connectivity cadence
//! while the link is down; the adapter never blocks past the timeout it is
//! given.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi` in STA mode.
//! - **all other targets**: a simulated link that tests can drop and restore.
//!
//! ## Reconnection policy
//!
//! After a failed attempt the adapter waits an exponential backoff
//! (2 s → 4 s → 8 s … capped at 60 s) before trying again.

use core::fmt;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::app::ports::ConnectivityPort;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

impl std::error::Error for ConnectivityError {}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32 },
}

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
#[cfg(target_os = "espidf")]
const LINK_POLL: Duration = Duration::from_millis(50);

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff: Duration,
    retry_at: Option<Instant>,
    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::EspWifi<'static>,
    #[cfg(target_os = "espidf")]
    started: bool,
    /// Simulation: whether an access point is reachable.
    #[cfg(not(target_os = "espidf"))]
    sim_link: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: esp_idf_svc::wifi::EspWifi<'static>) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff: INITIAL_BACKOFF,
            retry_at: None,
            wifi,
            started: false,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff: INITIAL_BACKOFF,
            retry_at: None,
            sim_link: true,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password.push_str(password).map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials set (SSID='{}')", self.ssid);
        Ok(())
    }

    /// Simulation: make the access point (un)reachable.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_sim_link(&mut self, available: bool) {
        self.sim_link = available;
    }

    fn schedule_retry(&mut self, attempt: u32) {
        self.retry_at = Some(Instant::now() + self.backoff);
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
        self.state = WifiState::Reconnecting { attempt };
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, timeout: Duration) -> Result<(), ConnectivityError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        if !self.started {
            let auth_method = if self.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            };
            let conf = Configuration::Client(ClientConfiguration {
                ssid: self.ssid.as_str().try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
                password: self
                    .password
                    .as_str()
                    .try_into()
                    .map_err(|_| ConnectivityError::InvalidPassword)?,
                auth_method,
                ..Default::default()
            });
            self.wifi
                .set_configuration(&conf)
                .map_err(|_| ConnectivityError::ConnectionFailed)?;
            self.wifi.start().map_err(|_| ConnectivityError::ConnectionFailed)?;
            self.started = true;
        }

        self.wifi.connect().map_err(|_| ConnectivityError::ConnectionFailed)?;
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.platform_link_up() {
                return Ok(());
            }
            std::thread::sleep(LINK_POLL);
        }
        // Leave the attempt running; a later poll may still see it land.
        Err(ConnectivityError::ConnectionFailed)
    }

    #[cfg(target_os = "espidf")]
    fn platform_link_up(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.sta_netif().is_up().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, _timeout: Duration) -> Result<(), ConnectivityError> {
        if self.sim_link {
            Ok(())
        } else {
            Err(ConnectivityError::ConnectionFailed)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_link_up(&self) -> bool {
        self.sim_link
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn is_up(&self) -> bool {
        self.state == WifiState::Connected && self.platform_link_up()
    }

    fn reconnect(&mut self, timeout_ms: u64) -> bool {
        if self.is_up() {
            return true;
        }
        if self.ssid.is_empty() {
            warn!("WiFi: {}", ConnectivityError::NoCredentials);
            return false;
        }

        let attempt = match self.state {
            WifiState::Connected => {
                warn!("WiFi: connection lost, entering reconnect");
                self.state = WifiState::Reconnecting { attempt: 0 };
                0
            }
            // An attempt left running may have landed since.
            WifiState::Reconnecting { .. } if self.platform_link_up() => {
                info!("WiFi: connected to '{}'", self.ssid);
                self.state = WifiState::Connected;
                self.backoff = INITIAL_BACKOFF;
                self.retry_at = None;
                return true;
            }
            WifiState::Disconnected => 0,
            WifiState::Reconnecting { attempt } => attempt,
        };
        if self.retry_at.is_some_and(|at| Instant::now() < at) {
            return false;
        }

        info!("WiFi: connecting to '{}' (attempt {})", self.ssid, attempt + 1);
        match self.platform_connect(Duration::from_millis(timeout_ms)) {
            Ok(()) => {
                info!("WiFi: connected to '{}'", self.ssid);
                self.state = WifiState::Connected;
                self.backoff = INITIAL_BACKOFF;
                self.retry_at = None;
                true
            }
            Err(e) => {
                warn!("WiFi: {} (retry in {}s)", e, self.backoff.as_secs());
                self.schedule_retry(attempt + 1);
                false
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
