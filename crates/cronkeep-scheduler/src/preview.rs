//! Dry-run schedule preview.
//!
//! Walks a simulated clock forward with the same cadence as the live loop
//! and lists every firing, without sleeping or spawning anything.

use std::io::Write;

use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta};

use crate::{
    error::{Result, SchedulerError},
    tick::delay_till_next_check,
    types::Job,
};

/// Lookahead used by `--print-schedule`.
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_secs(24 * 60 * 60);

/// One simulated firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    pub at: DateTime<FixedOffset>,
    pub job: String,
}

impl std::fmt::Display for Firing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.at.format("%Y/%m/%d %H:%M"), self.job)
    }
}

/// Every firing from `start` until the simulated clock passes
/// `start + lookahead`, in time order and table order within a minute.
pub fn simulate(
    jobs: &[Job],
    start: DateTime<FixedOffset>,
    lookahead: Duration,
) -> Result<Vec<Firing>> {
    let end = TimeDelta::from_std(lookahead)
        .ok()
        .and_then(|d| start.checked_add_signed(d))
        .ok_or_else(|| SchedulerError::InvalidDuration(format!("{lookahead:?} is too long")))?;
    let mut simulated = start;
    let mut firings = Vec::new();
    while end > simulated {
        simulated += delay_till_next_check(&simulated);
        firings.extend(
            jobs.iter()
                .filter(|j| j.schedule.is_due(&simulated))
                .map(|j| Firing {
                    at: simulated,
                    job: j.name.clone(),
                }),
        );
    }
    Ok(firings)
}

/// Write one `timestamp - job` line per firing.
pub fn write_schedule<W: Write>(out: &mut W, firings: &[Firing]) -> std::io::Result<()> {
    for firing in firings {
        writeln!(out, "{firing}")?;
    }
    out.flush()
}
