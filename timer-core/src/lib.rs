//! Pure timing logic for the cube timer with no platform dependencies.
//! Every call takes `now_ms` from the caller's monotonic clock, so the
//! whole state machine is testable on host with synthetic time.

pub mod gesture;
pub mod machine;

pub use gesture::{classify_start, Gesture, GestureTracker, Ignored, InputEvent, InputKind, InputSource, StartKind};
pub use machine::{MachineConfig, Outcome, Phase, PhaseKind, Step, TimerMachine, Transition};

/// Measures one solve from `start` to `stop`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Stopwatch {
    start_ms: u64,
}

impl Stopwatch {
    pub fn start(now_ms: u64) -> Self {
        Self { start_ms: now_ms }
    }

    pub fn started_at(&self) -> u64 {
        self.start_ms
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.start_ms)
    }

    /// Consumes the stopwatch; the returned value is the authoritative duration.
    pub fn stop(self, now_ms: u64) -> u64 {
        self.elapsed_ms(now_ms)
    }
}

/// Pre-solve countdown in whole seconds.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct InspectionCountdown {
    total_s: u32,
    started_ms: u64,
}

impl InspectionCountdown {
    pub fn new(total_s: u32, now_ms: u64) -> Self {
        Self {
            total_s,
            started_ms: now_ms,
        }
    }

    pub fn total_s(&self) -> u32 {
        self.total_s
    }

    /// Drops by one for every whole second elapsed. Goes to zero or below
    /// once the countdown has run out.
    pub fn remaining_s(&self, now_ms: u64) -> i64 {
        let elapsed_s = now_ms.saturating_sub(self.started_ms) / 1000;
        i64::from(self.total_s) - elapsed_s as i64
    }

    pub fn is_complete(&self, now_ms: u64) -> bool {
        self.remaining_s(now_ms) <= 0
    }
}

/// Format milliseconds as "S.mmm", "M:SS.mmm" or "H:MM:SS.mmm".
/// Only the leading segment is unpadded.
pub fn format_solve_time(ms: u64) -> String {
    let milli = ms % 1000;
    let total_secs = ms / 1000;
    let s = total_secs % 60;
    let total_min = total_secs / 60;
    let m = total_min % 60;
    let h = total_min / 60;

    if h > 0 {
        format!("{}:{:02}:{:02}.{:03}", h, m, s, milli)
    } else if m > 0 {
        format!("{}:{:02}.{:03}", m, s, milli)
    } else {
        format!("{}.{:03}", s, milli)
    }
}

/// Format the inspection display; overtime shows as zero.
pub fn format_countdown(remaining_s: i64) -> String {
    remaining_s.max(0).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_basic() {
        let sw = Stopwatch::start(1000);
        assert_eq!(sw.started_at(), 1000);
        assert_eq!(sw.elapsed_ms(1500), 500);
        assert_eq!(sw.elapsed_ms(2000), 1000);
        assert_eq!(sw.elapsed_ms(500), 0); // Never negative
        assert_eq!(sw.stop(3000), 2000);
    }

    #[test]
    fn test_countdown_basic() {
        let cd = InspectionCountdown::new(15, 1000);
        assert_eq!(cd.total_s(), 15);
        assert_eq!(cd.remaining_s(1000), 15);
        assert_eq!(cd.remaining_s(1999), 15);
        assert_eq!(cd.remaining_s(2000), 14);
        assert!(!cd.is_complete(15_999));
        assert_eq!(cd.remaining_s(16_000), 0);
        assert!(cd.is_complete(16_000));
        assert_eq!(cd.remaining_s(18_000), -2);
    }

    #[test]
    fn test_zero_second_countdown_is_complete_at_once() {
        let cd = InspectionCountdown::new(0, 42);
        assert!(cd.is_complete(42));
    }

    #[test]
    fn test_format_solve_time() {
        assert_eq!(format_solve_time(0), "0.000");
        assert_eq!(format_solve_time(500), "0.500");
        assert_eq!(format_solve_time(950), "0.950");
        assert_eq!(format_solve_time(12_345), "12.345");
        assert_eq!(format_solve_time(61_234), "1:01.234");
        assert_eq!(format_solve_time(600_000), "10:00.000");
        assert_eq!(format_solve_time(3_661_000), "1:01:01.000");
        assert_eq!(format_solve_time(36_000_007), "10:00:00.007");
    }

    #[test]
    fn test_format_keeps_three_decimals_at_any_magnitude() {
        for ms in [1u64, 999, 59_999, 60_001, 3_599_999, 3_600_000, 86_400_123] {
            let text = format_solve_time(ms);
            let frac = text.rsplit('.').next().unwrap();
            assert_eq!(frac.len(), 3, "{}", text);
            assert_eq!(frac.parse::<u64>().unwrap(), ms % 1000);
        }
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(15), "15");
        assert_eq!(format_countdown(0), "0");
        assert_eq!(format_countdown(-3), "0");
    }
}
