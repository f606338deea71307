use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronkeepError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("error reading {}: {source}", path.display())]
    TableRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CronkeepError {
    /// Short error code string, used as a structured log field at exit.
    pub fn code(&self) -> &'static str {
        match self {
            CronkeepError::Config(_) => "CONFIG_ERROR",
            CronkeepError::TableRead { .. } => "TABLE_READ_ERROR",
            CronkeepError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CronkeepError>;
