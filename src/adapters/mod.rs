//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements         | Connects to                     |
//! |---------------|--------------------|---------------------------------|
//! | `firebase`    | RemoteStore        | Realtime database REST / memory |
//! | `hardware`    | SensorBus          | Metering bus                    |
//! |               | RelayOutput        | Relay GPIOs                     |
//! |               | IndicatorPort      | Status LED, buzzer              |
//! | `log_sink`    | EventSink          | Serial log output               |
//! | `nvs`         | ConfigPort         | NVS / in-memory store           |
//! |               | StoragePort        |                                 |
//! | `pzem_uart`   | SensorBus          | PZEM-004T on multiplexed UART   |
//! | `relay_gpio`  | RelayOutput        | `embedded-hal` output pins      |
//! | `sim_meter`   | SensorBus          | Simulated meters                |
//! | `time`        | ClockPort          | ESP32 system timer, SNTP        |
//! | `uplink`      | RemoteStore        | Store gated on the link         |
//! |               | ConnectivityPort   |                                 |
//! | `wifi`        | ConnectivityPort   | ESP-IDF WiFi STA                |

pub mod firebase;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod pzem_uart;
pub mod relay_gpio;
pub mod sim_meter;
pub mod time;
pub mod uplink;
pub mod wifi;
