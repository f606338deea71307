//! Command-line flags for the `cronkeep` binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use cronkeep_scheduler::{duration::parse_duration, preview::DEFAULT_LOOKAHEAD};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CRONKEEP_GIT_SHA"), ")");

/// Minute-resolution job scheduler
#[derive(Parser, Debug)]
#[command(name = "cronkeep")]
#[command(version = VERSION)]
pub struct Cli {
    /// Config file (default: $CRONKEEP_CONFIG, then /etc/cronkeep/cronkeep.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Job table to load, overriding `table.path` from the config
    #[arg(long = "cron-tab", value_name = "PATH")]
    pub cron_tab: Option<PathBuf>,

    /// Print the next 24 hours of firings and exit
    #[arg(long)]
    pub print_schedule: bool,

    /// Print firings for the given window (e.g. 90m, 7d) and exit
    #[arg(long, value_name = "DURATION", value_parser = parse_lookahead)]
    pub print_schedule_for: Option<Duration>,
}

impl Cli {
    /// Preview window, when a dry run was requested.
    pub fn lookahead(&self) -> Option<Duration> {
        match (self.print_schedule_for, self.print_schedule) {
            (Some(window), _) => Some(window),
            (None, true) => Some(DEFAULT_LOOKAHEAD),
            (None, false) => None,
        }
    }
}

fn parse_lookahead(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}
