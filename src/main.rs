//! Smart-building controller firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BoardAdapter        LogEventSink   NvsAdapter   SystemClock   │
//! │  (Sensor+Relay+Ind.) (EventSink)    (Config+NVS) (ClockPort)   │
//! │  Uplink<FirebaseStore, WifiAdapter>                            │
//! │  (RemoteStore + Connectivity)                                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Supervisor (pure logic)                   │    │
//! │  │  Sensors · Safety · Relays · Schedule · Sync · FSM     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::{Context, Result};
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Output, PinDriver};
use esp_idf_hal::prelude::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::sntp::EspSntp;
use esp_idf_svc::wifi::EspWifi;
use log::{error, info, warn};

use smartbuilding::adapters::firebase::FirebaseStore;
use smartbuilding::adapters::hardware::BoardAdapter;
use smartbuilding::adapters::log_sink::LogEventSink;
use smartbuilding::adapters::nvs::{CRED_DB_TOKEN, CRED_WIFI_PASS, CRED_WIFI_SSID, NvsAdapter};
use smartbuilding::adapters::pzem_uart::PzemUartBus;
use smartbuilding::adapters::relay_gpio::RelayPins;
use smartbuilding::adapters::time::SystemClock;
use smartbuilding::adapters::uplink::Uplink;
use smartbuilding::adapters::wifi::WifiAdapter;
use smartbuilding::app::ports::{ClockPort, ConfigPort};
use smartbuilding::app::service::Supervisor;
use smartbuilding::config::ControllerConfig;
use smartbuilding::drivers::watchdog::Watchdog;

/// Longest sleep between ticks; bounds status-LED blink jitter.
const MAX_IDLE_MS: u64 = 50;

type Pin = PinDriver<'static, AnyOutputPin, Output>;

fn output_pin(gpio: i32) -> Result<Pin> {
    // SAFETY: GPIO numbers come from a validated config with no duplicates,
    // so each pin is claimed exactly once.
    let pin = unsafe { AnyOutputPin::new(gpio) };
    PinDriver::output(pin).with_context(|| format!("GPIO {gpio} as output"))
}

fn load_config(nvs: &NvsAdapter) -> ControllerConfig {
    match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            ControllerConfig::default()
        }
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SmartBuilding v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. NVS, config and credentials ────────────────────────
    let mut nvs = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init: {e}"))?;
    let config = load_config(&nvs);
    let clock = SystemClock::new(config.device.tz_offset_secs);

    let mut supervisor = match Supervisor::new(config, clock.monotonic_ms()) {
        Ok(s) => s,
        Err(e) => {
            error!("Stored config rejected ({}), falling back to defaults", e);
            Supervisor::new(ControllerConfig::default(), clock.monotonic_ms())
                .map_err(|e| anyhow::anyhow!("default config invalid: {e}"))?
        }
    };
    let config = supervisor.config().clone();
    info!("Device: {} ({})", config.device.device_id, config.device.name);

    let mut watchdog = Watchdog::new(config.timing.watchdog_timeout_ms);

    // ── 3. Board I/O ──────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let hw_cfg = &config.hardware;

    let relay_pins = hw_cfg
        .relay_gpios
        .iter()
        .map(|&gpio| output_pin(gpio))
        .collect::<Result<Vec<_>>>()?;
    let relays = RelayPins::new(relay_pins, hw_cfg.relay_active_low);
    let led = hw_cfg.status_led_gpio.map(output_pin).transpose()?;
    let buzzer = hw_cfg.buzzer_gpio.map(output_pin).transpose()?;

    // The UART starts on the first meter's pins; the bus re-routes per read.
    let first = hw_cfg.meters.first().context("no meters configured")?;
    // SAFETY: as for `output_pin`.
    let (tx, rx) = unsafe { (AnyIOPin::new(first.tx_gpio), AnyIOPin::new(first.rx_gpio)) };
    let uart = UartDriver::new(
        peripherals.uart1,
        tx,
        rx,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(hw_cfg.meter_baud)),
    )?;
    let bus = PzemUartBus::new(uart, hw_cfg.meters.clone());
    let mut board = BoardAdapter::new(bus, relays, led, buzzer);

    // ── 4. Network ────────────────────────────────────────────
    let sysloop = EspSystemEventLoop::take()?;
    let mut wifi = WifiAdapter::new(EspWifi::new(peripherals.modem, sysloop, None)?);
    match (nvs.credential_string(CRED_WIFI_SSID), nvs.credential_string(CRED_WIFI_PASS)) {
        (Some(ssid), pass) => {
            if let Err(e) = wifi.set_credentials(&ssid, pass.as_deref().unwrap_or("")) {
                warn!("WiFi: stored credentials invalid ({e}); running offline");
            }
        }
        (None, _) => warn!("WiFi: no credentials provisioned; running offline"),
    }
    let token = nvs.credential_string(CRED_DB_TOKEN).unwrap_or_else(|| {
        warn!("Database token not provisioned; uploads will be rejected");
        String::new()
    });
    let mut net = Uplink::new(FirebaseStore::new(&config.sync.host, &token), wifi);
    let _sntp = EspSntp::new_default()?;

    // ── 5. Supervisor ─────────────────────────────────────────
    let mut sink = LogEventSink::new();
    supervisor.restore(&nvs);
    supervisor.start(&mut sink);

    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    loop {
        supervisor.tick(&mut board, &mut net, &clock, &mut sink);
        supervisor.persist_if_needed(&mut nvs, clock.monotonic_ms());
        watchdog.feed();

        let now = clock.monotonic_ms();
        let idle = supervisor.next_deadline().saturating_sub(now).min(MAX_IDLE_MS);
        std::thread::sleep(Duration::from_millis(idle));
    }
}
