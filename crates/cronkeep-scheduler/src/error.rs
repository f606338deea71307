use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job-table line could not be parsed. `line` is 1-based.
    #[error("{table}:{line}: invalid {field} {token:?}: {reason}")]
    Parse {
        table: String,
        line: usize,
        field: &'static str,
        token: String,
        reason: String,
    },

    /// Two lines of the same table declare the same job name.
    #[error("{table}:{line}: duplicate job name {name:?} (first declared on line {first_line})")]
    DuplicateJob {
        table: String,
        line: usize,
        name: String,
        first_line: usize,
    },

    /// A human-readable duration such as `90m` could not be parsed.
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// The job's command could not be launched.
    #[error("spawn failed: {0}")]
    Spawn(#[source] std::io::Error),

    /// Underlying I/O failure (metrics output, process wait).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
