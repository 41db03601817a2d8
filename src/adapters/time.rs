//! Clock adapter.
//!
//! Implements [`ClockPort`]:
//!
//! - **`target_os = "espidf"`**: monotonic time from `esp_timer_get_time()`
//!   and wall time from `gettimeofday()` (set by SNTP).
//! - **`not(target_os = "espidf")`**: `std::time::Instant` and
//!   `SystemTime` for host-side simulation.
//!
//! Wall time is shifted by the configured timezone offset and reported as
//! local naive time, which is what schedule windows are written in.

use chrono::{DateTime, NaiveDateTime};

use crate::app::ports::ClockPort;

/// Anything before 2020-01-01 means SNTP has not run yet.
const EPOCH_2020: i64 = 1_577_836_800;

pub struct SystemClock {
    tz_offset_secs: i32,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl SystemClock {
    pub fn new(tz_offset_secs: i32) -> Self {
        Self {
            tz_offset_secs,
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Seconds since the Unix epoch, if the clock has been set.
    #[cfg(target_os = "espidf")]
    fn unix_secs(&self) -> Option<i64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        Some(tv.tv_sec as i64)
    }

    #[cfg(not(target_os = "espidf"))]
    fn unix_secs(&self) -> Option<i64> {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs() as i64)
    }
}

/// Local wall time for `unix_secs`, or `None` if the clock is unset.
pub fn local_time(unix_secs: i64, tz_offset_secs: i32) -> Option<NaiveDateTime> {
    if unix_secs < EPOCH_2020 {
        return None;
    }
    DateTime::from_timestamp(unix_secs + i64::from(tz_offset_secs), 0).map(|t| t.naive_utc())
}

impl ClockPort for SystemClock {
    #[cfg(target_os = "espidf")]
    fn monotonic_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn monotonic_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn wall_clock(&self) -> Option<NaiveDateTime> {
        local_time(self.unix_secs()?, self.tz_offset_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Weekday};

    #[test]
    fn unset_clock_has_no_wall_time() {
        assert_eq!(local_time(0, 25_200), None);
        assert_eq!(local_time(EPOCH_2020 - 1, 0), None);
    }

    #[test]
    fn applies_timezone_offset() {
        // 2024-06-03 05:30:00 UTC is a Monday; GMT+7 makes it 12:30 local.
        let t = local_time(1_717_392_600, 25_200).unwrap();
        assert_eq!((t.hour(), t.minute()), (12, 30));
        assert_eq!(t.weekday(), Weekday::Mon);
    }

    #[test]
    fn offset_can_cross_midnight() {
        // 2024-06-03 20:00 UTC -> Tuesday 03:00 in GMT+7.
        let t = local_time(1_717_444_800, 25_200).unwrap();
        assert_eq!(t.weekday(), Weekday::Tue);
        assert_eq!(t.hour(), 3);
    }

    #[test]
    fn monotonic_never_goes_backwards() {
        let clock = SystemClock::new(0);
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert!(b >= a);
    }
}
