//! Human-readable durations for `--print-schedule-for`.
//!
//! Accepts one or more `<number><unit>` groups with units `s`, `m`, `h` and
//! `d`, e.g. `90s`, `12h`, `1h30m`, `7d`.

use std::time::Duration;

use crate::error::{Result, SchedulerError};

pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SchedulerError::InvalidDuration("empty duration".into()));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();

    for c in input.chars() {
        let unit: u64 = match c {
            '0'..='9' => {
                digits.push(c);
                continue;
            }
            's' | 'S' => 1,
            'm' | 'M' => 60,
            'h' | 'H' => 60 * 60,
            'd' | 'D' => 24 * 60 * 60,
            other => {
                return Err(SchedulerError::InvalidDuration(format!(
                    "unexpected character {other:?} in duration {input:?}"
                )));
            }
        };
        if digits.is_empty() {
            return Err(SchedulerError::InvalidDuration(format!(
                "missing number before {c:?} in duration {input:?}"
            )));
        }
        let amount: u64 = digits.parse().map_err(|_| {
            SchedulerError::InvalidDuration(format!("number too large in duration {input:?}"))
        })?;
        total = amount
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| {
                SchedulerError::InvalidDuration(format!("duration {input:?} overflows"))
            })?;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(SchedulerError::InvalidDuration(format!(
            "missing unit after {digits:?} in duration {input:?}"
        )));
    }
    if total == 0 {
        return Err(SchedulerError::InvalidDuration(format!(
            "duration {input:?} must be positive"
        )));
    }

    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_units() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("12h").unwrap(), Duration::from_secs(43_200));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
    }

    #[test]
    fn combined_units() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("1d2h3m4s").unwrap(), Duration::from_secs(93_784));
        assert_eq!(parse_duration(" 2H ").unwrap(), Duration::from_secs(7_200));
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "h", "10", "10x", "1h30", "-5m", "1.5h", "0s"] {
            let err = parse_duration(bad).unwrap_err();
            assert!(
                matches!(err, SchedulerError::InvalidDuration(_)),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_duration("99999999999999999999d").is_err());
        assert!(parse_duration("999999999999999999d").is_err());
    }
}
