//! `cronkeep-scheduler`: crontab parsing, minute-tick scheduling and
//! process supervision.
//!
//! # Overview
//!
//! A job table is parsed into [`Job`]s by [`parse_jobs`]. The
//! [`SchedulerEngine`] wakes at second 30 of every minute, evaluates each
//! job's [`ScheduleExpression`] against the wall clock and launches the due
//! ones through a [`JobRunner`], unless the previous run is still going.
//! Shutdown is driven by the [`ShutdownCoordinator`].
//!
//! # Modules
//!
//! | Module     | Role                                                  |
//! |------------|-------------------------------------------------------|
//! | `schedule` | Five-field expressions and the due-check              |
//! | `table`    | Job table parsing                                     |
//! | `tick`     | Check cadence, clock source and skew detection        |
//! | `runner`   | Process launch, reaping and exit decoding             |
//! | `engine`   | The scheduling loop and shutdown drain                |
//! | `shutdown` | Two-stage signal handling                             |
//! | `metrics`  | Per-job counters and gauges, periodic reporting       |
//! | `preview`  | Dry-run schedule listing                              |
//! | `duration` | `1h30m`-style lookahead parsing                       |

pub mod duration;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod preview;
pub mod runner;
pub mod schedule;
pub mod shutdown;
pub mod table;
pub mod tick;
pub mod types;

pub use engine::{DrainOutcome, SchedulerEngine, SchedulerState};
pub use error::{Result, SchedulerError};
pub use metrics::{JsonFileSink, LogSink, MetricsRegistry, MetricsSink, MetricsSnapshot};
pub use runner::{CommandMode, JobExit, JobRunner};
pub use schedule::ScheduleExpression;
pub use shutdown::ShutdownCoordinator;
pub use table::parse_jobs;
pub use tick::{Clock, SystemClock};
pub use types::{Job, ShutdownPhase};
