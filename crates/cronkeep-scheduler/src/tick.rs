//! Tick cadence and wall-clock skew detection.
//!
//! Checks are scheduled for the middle of a minute (hh:mm:30) so a clock
//! adjustment of less than thirty seconds in either direction never moves a
//! check into a neighbouring minute.

use chrono::{DateTime, FixedOffset, Local, TimeDelta, TimeZone, Timelike, Utc};

/// Second within each minute at which schedules are evaluated.
pub const CHECK_SECOND: u32 = 30;

/// Shortest wait between two checks, in seconds.
const MIN_CHECK_GAP_SECS: i64 = 30;

/// Delay from `from` until the first hh:mm:30.000 at least thirty seconds
/// away, so the result always lies in `[30s, 90s)`.
///
/// hh:mm:30.000 waits a full minute, hh:mm:00.000 waits thirty seconds. A
/// wake that lands just before :30 plans the following minute's check rather
/// than the one a few milliseconds ahead.
pub fn delay_till_next_check<T: Timelike>(from: &T) -> TimeDelta {
    let second = from.second();
    let whole = if second < CHECK_SECOND {
        CHECK_SECOND - second
    } else {
        60 + CHECK_SECOND - second
    };
    // nanosecond() exceeds 1e9 during a leap second.
    let sub = from.nanosecond() % 1_000_000_000;
    let delay = TimeDelta::seconds(whole as i64) - TimeDelta::nanoseconds(sub as i64);
    if delay < TimeDelta::seconds(MIN_CHECK_GAP_SECS) {
        delay + TimeDelta::seconds(60)
    } else {
        delay
    }
}

/// Direction of a detected wall-clock discontinuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeJump {
    /// The clock ran ahead of the loop; firings in between may have been skipped.
    Forward,
    /// The clock went back; firings may repeat.
    Backward,
}

/// Compares each planned check against the one before it.
///
/// Consecutive checks must be exactly one minute apart at one-second
/// resolution; anything else is reported as a jump.
#[derive(Debug, Clone)]
pub struct SkewDetector {
    previous_check: i64,
}

impl SkewDetector {
    /// Seed the detector so that `first_check` itself is never reported.
    pub fn new<Tz: TimeZone>(first_check: &DateTime<Tz>) -> Self {
        Self {
            previous_check: first_check.timestamp() - 60,
        }
    }

    /// Record `next_check` and report whether it is out of step with the
    /// previously recorded one.
    pub fn observe<Tz: TimeZone>(&mut self, next_check: &DateTime<Tz>) -> Option<TimeJump> {
        let expected_previous = next_check.timestamp() - 60;
        let recorded = std::mem::replace(&mut self.previous_check, next_check.timestamp());
        match expected_previous.cmp(&recorded) {
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(TimeJump::Forward),
            std::cmp::Ordering::Less => Some(TimeJump::Backward),
        }
    }
}

/// Source of "now" for the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// The host wall clock, in local time or UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    pub utc: bool,
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        if self.utc {
            Utc::now().fixed_offset()
        } else {
            Local::now().fixed_offset()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32, ms: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 10, h, m, s)
            .unwrap()
            + TimeDelta::milliseconds(ms as i64)
    }

    #[test]
    fn delay_from_half_minute_is_one_minute() {
        assert_eq!(delay_till_next_check(&t(12, 0, 30, 0)), TimeDelta::seconds(60));
    }

    #[test]
    fn delay_from_top_of_minute_is_thirty_seconds() {
        assert_eq!(delay_till_next_check(&t(12, 0, 0, 0)), TimeDelta::seconds(30));
    }

    #[test]
    fn delay_subtracts_sub_second_remainder() {
        assert_eq!(
            delay_till_next_check(&t(12, 0, 10, 250)),
            TimeDelta::milliseconds(79_750)
        );
        assert_eq!(
            delay_till_next_check(&t(12, 0, 45, 500)),
            TimeDelta::milliseconds(44_500)
        );
    }

    #[test]
    fn early_wake_skips_to_next_minute() {
        // Woken 50ms before the check it was aiming for.
        let woke = t(12, 1, 29, 950);
        let delay = delay_till_next_check(&woke);
        assert_eq!(delay, TimeDelta::milliseconds(60_050));
        let next = woke + delay;
        assert_eq!((next.minute(), next.second()), (2, 30));
    }

    #[test]
    fn early_wake_is_not_a_backward_jump() {
        let mut skew = SkewDetector::new(&t(12, 1, 30, 0));
        assert_eq!(skew.observe(&t(12, 1, 30, 0)), None);
        let woke = t(12, 1, 29, 950);
        assert_eq!(skew.observe(&(woke + delay_till_next_check(&woke))), None);
    }

    #[test]
    fn delay_always_lands_on_check_second() {
        for s in 0..60 {
            for ms in [0, 1, 499, 999] {
                let from = t(8, 59, s, ms);
                let next = from + delay_till_next_check(&from);
                assert_eq!(next.second(), CHECK_SECOND);
                assert_eq!(next.nanosecond(), 0);
                assert!(next - from >= TimeDelta::seconds(30));
                assert!(next - from < TimeDelta::seconds(90));
            }
        }
    }

    #[test]
    fn steady_cadence_reports_nothing() {
        let mut skew = SkewDetector::new(&t(12, 0, 30, 0));
        assert_eq!(skew.observe(&t(12, 0, 30, 0)), None);
        assert_eq!(skew.observe(&t(12, 1, 30, 0)), None);
        assert_eq!(skew.observe(&t(12, 2, 30, 0)), None);
    }

    #[test]
    fn forward_jump_reported_once() {
        let mut skew = SkewDetector::new(&t(12, 0, 30, 0));
        assert_eq!(skew.observe(&t(12, 0, 30, 0)), None);
        // The clock leapt past a whole check.
        assert_eq!(skew.observe(&t(12, 2, 30, 0)), Some(TimeJump::Forward));
        assert_eq!(skew.observe(&t(12, 3, 30, 0)), None);
    }

    #[test]
    fn backward_jump_reported_once() {
        let mut skew = SkewDetector::new(&t(12, 5, 30, 0));
        assert_eq!(skew.observe(&t(12, 5, 30, 0)), None);
        assert_eq!(skew.observe(&t(12, 3, 30, 0)), Some(TimeJump::Backward));
        assert_eq!(skew.observe(&t(12, 4, 30, 0)), None);
    }
}
