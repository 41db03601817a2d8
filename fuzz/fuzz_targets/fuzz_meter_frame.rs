//! Fuzz target: meter response parsing
//!
//! Drives arbitrary bytes through the Modbus response parser and the
//! register decoder.  Neither may panic, and an accepted frame must
//! decode.
//!
//! cargo fuzz run fuzz_meter_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartbuilding::adapters::pzem_uart::parse_response;
use smartbuilding::sensors::pzem::{FRAME_LEN, decode};

fuzz_target!(|data: &[u8]| {
    let Some((&addr, resp)) = data.split_first() else {
        return;
    };
    if let Ok(frame) = parse_response(addr, resp) {
        assert_eq!(frame.len(), FRAME_LEN);
        let m = decode(&frame).expect("validated frame must decode");
        let _ = m.check_plausible();
    }

    // The decoder alone must reject anything but a full payload.
    if decode(resp).is_ok() {
        assert_eq!(resp.len(), FRAME_LEN);
    }
});
