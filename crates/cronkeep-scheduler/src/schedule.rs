//! Five-field cron expressions and the "is this instant due" predicate.
//!
//! Each field is parsed into a 64-bit membership mask so matching an instant
//! costs five bit tests and no allocation.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Timelike};

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// One of the five positional fields of a schedule expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Minute,
        Field::Hour,
        Field::DayOfMonth,
        Field::Month,
        Field::DayOfWeek,
    ];

    /// Inclusive domain of the field.
    pub fn bounds(self) -> (u32, u32) {
        match self {
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            Field::DayOfWeek => (0, 6),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }

    fn lookup_name(self, token: &str) -> Option<u32> {
        let lower = token.to_ascii_lowercase();
        match self {
            Field::Month => MONTH_NAMES
                .iter()
                .position(|n| *n == lower)
                .map(|i| i as u32 + 1),
            Field::DayOfWeek => WEEKDAY_NAMES
                .iter()
                .position(|n| *n == lower)
                .map(|i| i as u32),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a single field failed to parse. The table parser attaches line context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub token: String,
    pub reason: String,
}

impl FieldError {
    fn new(field: Field, token: &str, reason: impl Into<String>) -> Self {
        Self {
            field,
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} {:?}: {}", self.field, self.token, self.reason)
    }
}

impl std::error::Error for FieldError {}

/// The set of accepted values for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldSet(u64);

impl FieldSet {
    pub fn contains(self, value: u32) -> bool {
        value < 64 && (self.0 >> value) & 1 == 1
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Accepted values in ascending order.
    pub fn values(self) -> impl Iterator<Item = u32> {
        (0..64u32).filter(move |v| (self.0 >> v) & 1 == 1)
    }

    fn insert_range(&mut self, lo: u32, hi: u32, step: u32) {
        let mut v = lo;
        while v <= hi {
            self.0 |= 1u64 << v;
            match v.checked_add(step) {
                Some(next) => v = next,
                None => break,
            }
        }
    }

    /// Parse one field's text: `*`, `N`, `A-B`, `*/S`, `A-B/S`, `N/S`, and
    /// comma-separated lists of those.
    pub fn parse(field: Field, text: &str) -> Result<Self, FieldError> {
        if text.is_empty() {
            return Err(FieldError::new(field, text, "empty field"));
        }
        let mut set = FieldSet::default();
        for item in text.split(',') {
            parse_item(field, item, &mut set)?;
        }
        if set.is_empty() {
            return Err(FieldError::new(field, text, "matches no values"));
        }
        Ok(set)
    }
}

fn parse_item(field: Field, item: &str, set: &mut FieldSet) -> Result<(), FieldError> {
    let (min, max) = field.bounds();
    if item.is_empty() {
        return Err(FieldError::new(field, item, "empty list element"));
    }

    let (range, step) = match item.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| FieldError::new(field, item, "step is not a number"))?;
            if step == 0 {
                return Err(FieldError::new(field, item, "step must be at least 1"));
            }
            (range, Some(step))
        }
        None => (item, None),
    };

    let (lo, hi) = if range == "*" {
        (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
        let lo = parse_value(field, a, item)?;
        let hi = parse_value(field, b, item)?;
        if hi < lo {
            return Err(FieldError::new(
                field,
                item,
                format!("range end {hi} is before start {lo}"),
            ));
        }
        (lo, hi)
    } else {
        let v = parse_value(field, range, item)?;
        // `N/S` runs from N to the end of the domain.
        if step.is_some() {
            (v, max)
        } else {
            (v, v)
        }
    };

    set.insert_range(lo, hi, step.unwrap_or(1));
    Ok(())
}

fn parse_value(field: Field, token: &str, item: &str) -> Result<u32, FieldError> {
    let (min, max) = field.bounds();
    let value = match token.parse::<u32>() {
        Ok(v) => v,
        Err(_) => field
            .lookup_name(token)
            .ok_or_else(|| FieldError::new(field, item, format!("unrecognised value {token:?}")))?,
    };
    if value < min || value > max {
        return Err(FieldError::new(
            field,
            item,
            format!("{value} is outside {min}-{max}"),
        ));
    }
    Ok(value)
}

/// A parsed five-field schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleExpression {
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    day_of_week: FieldSet,
    // A field whose text starts with `*` does not restrict the day.
    dom_restricted: bool,
    dow_restricted: bool,
    source: String,
}

impl ScheduleExpression {
    /// Build an expression from exactly five field texts.
    pub fn from_fields(fields: [&str; 5]) -> Result<Self, FieldError> {
        let [minute, hour, dom, month, dow] = fields;
        Ok(Self {
            minute: FieldSet::parse(Field::Minute, minute)?,
            hour: FieldSet::parse(Field::Hour, hour)?,
            day_of_month: FieldSet::parse(Field::DayOfMonth, dom)?,
            month: FieldSet::parse(Field::Month, month)?,
            day_of_week: FieldSet::parse(Field::DayOfWeek, dow)?,
            dom_restricted: !dom.starts_with('*'),
            dow_restricted: !dow.starts_with('*'),
            source: fields.join(" "),
        })
    }

    pub fn field(&self, field: Field) -> FieldSet {
        match field {
            Field::Minute => self.minute,
            Field::Hour => self.hour,
            Field::DayOfMonth => self.day_of_month,
            Field::Month => self.month,
            Field::DayOfWeek => self.day_of_week,
        }
    }

    /// Whether the minute containing `t` is a firing minute. Seconds are ignored.
    ///
    /// When both day-of-month and day-of-week are restricted either one may
    /// match; otherwise both must (the unrestricted one always does).
    pub fn is_due<T: Datelike + Timelike>(&self, t: &T) -> bool {
        if !(self.minute.contains(t.minute())
            && self.hour.contains(t.hour())
            && self.month.contains(t.month()))
        {
            return false;
        }
        let dom = self.day_of_month.contains(t.day());
        let dow = self
            .day_of_week
            .contains(t.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for ScheduleExpression {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let fields: [&str; 5] = parts.as_slice().try_into().map_err(|_| {
            FieldError::new(
                Field::Minute,
                s,
                format!("expected 5 fields, found {}", parts.len()),
            )
        })?;
        Self::from_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 30)
            .unwrap()
    }

    fn values(field: Field, text: &str) -> Vec<u32> {
        FieldSet::parse(field, text).unwrap().values().collect()
    }

    #[test]
    fn star_covers_domain() {
        assert_eq!(values(Field::Minute, "*"), (0..=59).collect::<Vec<_>>());
        assert_eq!(values(Field::DayOfMonth, "*"), (1..=31).collect::<Vec<_>>());
        assert_eq!(values(Field::DayOfWeek, "*"), (0..=6).collect::<Vec<_>>());
    }

    #[test]
    fn step_over_star() {
        assert_eq!(values(Field::Minute, "*/15"), vec![0, 15, 30, 45]);
        assert_eq!(values(Field::Month, "*/4"), vec![1, 5, 9]);
    }

    #[test]
    fn single_list_range() {
        assert_eq!(values(Field::Hour, "7"), vec![7]);
        assert_eq!(values(Field::Hour, "1,5,9"), vec![1, 5, 9]);
        assert_eq!(values(Field::Hour, "9-12"), vec![9, 10, 11, 12]);
        assert_eq!(values(Field::Minute, "10-30/10"), vec![10, 20, 30]);
        assert_eq!(values(Field::Minute, "50/5"), vec![50, 55]);
        assert_eq!(values(Field::Minute, "1-3,30,58-59"), vec![1, 2, 3, 30, 58, 59]);
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(values(Field::Month, "JAN,mar-May"), vec![1, 3, 4, 5]);
        assert_eq!(values(Field::DayOfWeek, "mon-fri"), vec![1, 2, 3, 4, 5]);
        assert_eq!(values(Field::DayOfWeek, "Sun"), vec![0]);
    }

    #[test]
    fn rejects_out_of_domain() {
        assert!(FieldSet::parse(Field::Minute, "60").is_err());
        assert!(FieldSet::parse(Field::Hour, "24").is_err());
        assert!(FieldSet::parse(Field::DayOfMonth, "0").is_err());
        assert!(FieldSet::parse(Field::Month, "13").is_err());
        assert!(FieldSet::parse(Field::DayOfWeek, "7").is_err());
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in ["", "*/0", "5-1", "1,,2", "a", "1-", "-3", "*/x", "jan"] {
            let err = FieldSet::parse(Field::Minute, bad);
            assert!(err.is_err(), "{bad:?} should be rejected");
        }
        let err = FieldSet::parse(Field::Hour, "3-1").unwrap_err();
        assert_eq!(err.field, Field::Hour);
        assert!(err.reason.contains("before start"));
    }

    #[test]
    fn every_minute_is_always_due() {
        let expr: ScheduleExpression = "* * * * *".parse().unwrap();
        assert!(expr.is_due(&at(2024, 2, 29, 23, 59)));
        assert!(expr.is_due(&at(2023, 1, 1, 0, 0)));
    }

    #[test]
    fn minute_and_hour_must_match() {
        let expr: ScheduleExpression = "15 3 * * *".parse().unwrap();
        assert!(expr.is_due(&at(2024, 5, 10, 3, 15)));
        assert!(!expr.is_due(&at(2024, 5, 10, 3, 16)));
        assert!(!expr.is_due(&at(2024, 5, 10, 4, 15)));
    }

    #[test]
    fn day_of_month_alone_governs() {
        // 2024-05-01 is a Wednesday.
        let expr: ScheduleExpression = "0 0 1 * *".parse().unwrap();
        assert!(expr.is_due(&at(2024, 5, 1, 0, 0)));
        assert!(expr.is_due(&at(2024, 6, 1, 0, 0)));
        assert!(!expr.is_due(&at(2024, 5, 2, 0, 0)));
    }

    #[test]
    fn day_of_week_alone_governs() {
        // 2024-05-06 is a Monday.
        let expr: ScheduleExpression = "0 0 * * 1".parse().unwrap();
        assert!(expr.is_due(&at(2024, 5, 6, 0, 0)));
        assert!(expr.is_due(&at(2024, 5, 13, 0, 0)));
        assert!(!expr.is_due(&at(2024, 5, 7, 0, 0)));
    }

    #[test]
    fn both_days_restricted_is_or() {
        let expr: ScheduleExpression = "0 0 1 * 1".parse().unwrap();
        // 1st, a Wednesday.
        assert!(expr.is_due(&at(2024, 5, 1, 0, 0)));
        // Monday the 6th.
        assert!(expr.is_due(&at(2024, 5, 6, 0, 0)));
        // Tuesday the 7th.
        assert!(!expr.is_due(&at(2024, 5, 7, 0, 0)));
    }

    #[test]
    fn starred_step_does_not_restrict_day() {
        // `*/2` leaves day-of-month unrestricted, so both fields must match.
        // Monday the 6th is not in 1,3,5,...
        let expr: ScheduleExpression = "0 0 */2 * 1".parse().unwrap();
        assert!(!expr.is_due(&at(2024, 5, 6, 0, 0)));
        // Monday 2024-05-13: 13 is in 1,3,5,...
        assert!(expr.is_due(&at(2024, 5, 13, 0, 0)));
        // Wednesday the 1st: day-of-week does not match.
        assert!(!expr.is_due(&at(2024, 5, 1, 0, 0)));
    }

    #[test]
    fn month_filters() {
        let expr: ScheduleExpression = "0 12 * dec *".parse().unwrap();
        assert!(expr.is_due(&at(2024, 12, 25, 12, 0)));
        assert!(!expr.is_due(&at(2024, 11, 25, 12, 0)));
    }

    #[test]
    fn wrong_field_count() {
        assert!("* * * *".parse::<ScheduleExpression>().is_err());
        assert!("* * * * * *".parse::<ScheduleExpression>().is_err());
    }

    #[test]
    fn display_keeps_source() {
        let expr: ScheduleExpression = "*/5  9-17 * * mon-fri".parse().unwrap();
        assert_eq!(expr.to_string(), "*/5 9-17 * * mon-fri");
    }
}
