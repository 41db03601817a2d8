//! Status LED and buzzer pattern engine.
//!
//! The board has a single-colour status LED, so supervisor state is shown
//! by blink rate rather than colour.  The supervisor calls
//! [`StatusIndicator::tick`] every loop iteration and the engine decides
//! the LED and buzzer levels from the current time.
//!
//! | Pattern     | Meaning    | Period  |
//! |-------------|------------|---------|
//! | FastBlink   | Booting    | 250 ms  |
//! | Solid       | Connected  | –       |
//! | SlowBlink   | Degraded   | 2 s     |
//! | RapidBlink  | SafeMode   | 125 ms  |
//!
//! The buzzer beeps 200 ms every second while an unacknowledged threshold
//! alert is outstanding.

use crate::app::ports::IndicatorPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedPattern {
    Off,
    Solid,
    SlowBlink,
    FastBlink,
    RapidBlink,
}

impl LedPattern {
    /// Full on/off period in ms; `None` for steady patterns.
    pub const fn period_ms(self) -> Option<u64> {
        match self {
            Self::Off | Self::Solid => None,
            Self::SlowBlink => Some(2_000),
            Self::FastBlink => Some(250),
            Self::RapidBlink => Some(125),
        }
    }

    /// LED level at `now_ms` (50 % duty for blinking patterns).
    pub fn level_at(self, now_ms: u64) -> bool {
        match (self, self.period_ms()) {
            (Self::Off, _) => false,
            (_, None) => true,
            (_, Some(p)) => now_ms % p < p / 2,
        }
    }
}

const BEEP_PERIOD_MS: u64 = 1_000;
const BEEP_ON_MS: u64 = 200;

pub struct StatusIndicator {
    pattern: LedPattern,
    alarm: bool,
    led_on: Option<bool>,
    buzzer_on: Option<bool>,
}

impl StatusIndicator {
    pub fn new() -> Self {
        Self {
            pattern: LedPattern::FastBlink,
            alarm: false,
            led_on: None,
            buzzer_on: None,
        }
    }

    pub fn set_pattern(&mut self, pattern: LedPattern) {
        self.pattern = pattern;
    }

    pub fn set_alarm(&mut self, alarm: bool) {
        self.alarm = alarm;
    }

    pub fn pattern(&self) -> LedPattern {
        self.pattern
    }

    pub fn alarm(&self) -> bool {
        self.alarm
    }

    /// Push the levels for `now_ms` to the hardware.  Only changes are written.
    pub fn tick(&mut self, out: &mut impl IndicatorPort, now_ms: u64) {
        let led = self.pattern.level_at(now_ms);
        if self.led_on != Some(led) {
            out.set_status_led(led);
            self.led_on = Some(led);
        }
        let buzz = self.alarm && now_ms % BEEP_PERIOD_MS < BEEP_ON_MS;
        if self.buzzer_on != Some(buzz) {
            out.set_buzzer(buzz);
            self.buzzer_on = Some(buzz);
        }
    }
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Levels {
        led: Vec<bool>,
        buzzer: Vec<bool>,
    }

    impl IndicatorPort for Levels {
        fn set_status_led(&mut self, on: bool) {
            self.led.push(on);
        }
        fn set_buzzer(&mut self, on: bool) {
            self.buzzer.push(on);
        }
    }

    #[test]
    fn patterns_blink_at_their_rate() {
        assert!(LedPattern::Solid.level_at(12_345));
        assert!(!LedPattern::Off.level_at(0));
        assert!(LedPattern::SlowBlink.level_at(999));
        assert!(!LedPattern::SlowBlink.level_at(1_000));
        assert!(LedPattern::RapidBlink.level_at(125));
        assert!(!LedPattern::RapidBlink.level_at(62));
    }

    #[test]
    fn only_changes_are_written() {
        let mut ind = StatusIndicator::new();
        let mut out = Levels::default();
        ind.set_pattern(LedPattern::Solid);
        ind.tick(&mut out, 0);
        ind.tick(&mut out, 10);
        assert_eq!(out.led, vec![true]);
        assert_eq!(out.buzzer, vec![false]);

        ind.set_alarm(true);
        ind.tick(&mut out, 1_050);
        ind.tick(&mut out, 1_300);
        assert_eq!(out.buzzer, vec![false, true, false]);
    }
}
