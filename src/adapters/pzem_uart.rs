//! PZEM-004T v3 over a multiplexed UART.
//!
//! All meters share one hardware UART; before each transaction the UART
//! is routed to the meter's RX/TX pins.  Each read sends a Modbus-RTU
//! "read input registers" request and strips the response envelope,
//! handing the 20 register bytes to [`pzem::decode`](crate::sensors::pzem::decode).
//!
//! ```text
//!  request : addr 04 0000 000A crc_lo crc_hi                 (8 bytes)
//!  response: addr 04 14 <20 register bytes> crc_lo crc_hi    (25 bytes)
//!  error   : addr 84 code crc_lo crc_hi                      (5 bytes)
//! ```

use crate::error::SensorError;
use crate::sensors::pzem::{FRAME_LEN, RawFrame};

const FN_READ_INPUT: u8 = 0x04;
const FN_READ_INPUT_ERR: u8 = 0x84;
const REGISTER_COUNT: u16 = (FRAME_LEN / 2) as u16;

pub const REQUEST_LEN: usize = 8;
pub const RESPONSE_LEN: usize = 3 + FRAME_LEN + 2;
const ERROR_RESPONSE_LEN: usize = 5;

/// Modbus CRC-16 (poly 0xA001 reflected, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in data {
        crc ^= u16::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
        }
    }
    crc
}

/// Request for all ten measurement registers of the meter at `addr`.
pub fn build_read_request(addr: u8) -> [u8; REQUEST_LEN] {
    let count = REGISTER_COUNT.to_be_bytes();
    let mut req = [addr, FN_READ_INPUT, 0x00, 0x00, count[0], count[1], 0, 0];
    let crc = crc16(&req[..6]).to_le_bytes();
    req[6] = crc[0];
    req[7] = crc[1];
    req
}

/// Validate a response and return its register payload.
pub fn parse_response(addr: u8, resp: &[u8]) -> Result<RawFrame, SensorError> {
    if resp.is_empty() {
        return Err(SensorError::Timeout);
    }
    if resp.len() < ERROR_RESPONSE_LEN {
        return Err(SensorError::Malformed);
    }
    let (body, crc) = resp.split_at(resp.len() - 2);
    if crc16(body) != u16::from_le_bytes([crc[0], crc[1]]) {
        return Err(SensorError::Malformed);
    }
    if body[0] != addr {
        return Err(SensorError::Malformed);
    }
    match body[1] {
        FN_READ_INPUT_ERR => Err(SensorError::Bus),
        FN_READ_INPUT if resp.len() == RESPONSE_LEN && usize::from(body[2]) == FRAME_LEN => {
            RawFrame::from_slice(&body[3..]).map_err(|_| SensorError::Malformed)
        }
        _ => Err(SensorError::Malformed),
    }
}

/// Expected length once the function byte is known.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn expected_len(received: &[u8]) -> usize {
    match received.get(1) {
        Some(&FN_READ_INPUT_ERR) => ERROR_RESPONSE_LEN,
        _ => RESPONSE_LEN,
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF UART bus
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::PzemUartBus;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_hal::delay::TickType;
    use esp_idf_hal::uart::UartDriver;
    use esp_idf_svc::sys::{ESP_OK, esp_timer_get_time, uart_set_pin};
    use log::debug;

    use super::{RESPONSE_LEN, build_read_request, expected_len, parse_response};
    use crate::app::ports::SensorBus;
    use crate::config::MeterConfig;
    use crate::error::SensorError;
    use crate::model::ChannelId;
    use crate::sensors::pzem::RawFrame;

    const PIN_NO_CHANGE: i32 = -1;

    pub struct PzemUartBus {
        uart: UartDriver<'static>,
        meters: Vec<MeterConfig>,
        routed: Option<ChannelId>,
    }

    impl PzemUartBus {
        pub fn new(uart: UartDriver<'static>, meters: Vec<MeterConfig>) -> Self {
            Self {
                uart,
                meters,
                routed: None,
            }
        }

        fn now_ms() -> u64 {
            (unsafe { esp_timer_get_time() }) as u64 / 1_000
        }
    }

    impl SensorBus for PzemUartBus {
        fn read_channel(&mut self, channel: ChannelId, timeout_ms: u64) -> Result<RawFrame, SensorError> {
            let meter = *self
                .meters
                .iter()
                .find(|m| m.channel_id == channel)
                .ok_or(SensorError::Bus)?;

            if self.routed != Some(channel) {
                let ret = unsafe {
                    uart_set_pin(self.uart.port(), meter.tx_gpio, meter.rx_gpio, PIN_NO_CHANGE, PIN_NO_CHANGE)
                };
                if ret != ESP_OK {
                    self.routed = None;
                    return Err(SensorError::Bus);
                }
                self.routed = Some(channel);
            }

            self.uart.clear_rx().map_err(|_| SensorError::Bus)?;
            let req = build_read_request(meter.address);
            self.uart.write(&req).map_err(|_| SensorError::Bus)?;

            let deadline = Self::now_ms() + timeout_ms;
            let mut buf = [0u8; RESPONSE_LEN];
            let mut got = 0;
            while got < expected_len(&buf[..got]) {
                let remaining = deadline.saturating_sub(Self::now_ms());
                if remaining == 0 {
                    break;
                }
                let n = self
                    .uart
                    .read(&mut buf[got..], TickType::new_millis(remaining).ticks())
                    .map_err(|_| SensorError::Bus)?;
                got += n;
            }
            debug!("PZEM ch{channel}: {got} bytes");
            if got > 0 && got < expected_len(&buf[..got]) {
                return Err(SensorError::Timeout);
            }
            parse_response(meter.address, &buf[..got])
        }
    }
}
