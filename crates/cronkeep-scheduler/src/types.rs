use std::fmt;

use crate::schedule::ScheduleExpression;

/// One configured unit of work. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Unique within its table; also the metric name prefix.
    pub name: String,
    pub schedule: ScheduleExpression,
    /// Command line exactly as written after the job name.
    pub command: String,
    /// 1-based line in the job table.
    pub line: usize,
}

impl Job {
    /// Whitespace-split argument vector of the command line.
    pub fn argv(&self) -> Vec<&str> {
        self.command.split_whitespace().collect()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.schedule, self.name, self.command)
    }
}

/// Lifecycle phase of the daemon as driven by termination signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal scheduling.
    Running,
    /// First signal seen: no new dispatches, in-flight jobs are awaited.
    Draining,
    /// Second signal seen: stop waiting for in-flight jobs.
    Aborting,
}

impl fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownPhase::Running => "running",
            ShutdownPhase::Draining => "draining",
            ShutdownPhase::Aborting => "aborting",
        };
        write!(f, "{s}")
    }
}
