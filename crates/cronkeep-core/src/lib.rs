//! `cronkeep-core`: configuration and top-level errors shared by the
//! cronkeep daemon crates.

pub mod config;
pub mod error;

pub use config::CronkeepConfig;
pub use error::{CronkeepError, Result};
