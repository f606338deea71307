use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    metrics::{JobMetrics, MetricsRegistry},
    runner::{CommandMode, JobExit, JobRunner},
    tick::{delay_till_next_check, Clock, SkewDetector, TimeJump},
    types::{Job, ShutdownPhase},
};

/// Lifecycle of the scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Draining,
    Stopped,
}

/// How the post-loop drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight job finished.
    Completed,
    /// A second signal arrived first; in-flight jobs were left running.
    Aborted,
}

/// Jobs started and skipped during one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub started: usize,
    pub overdue: usize,
}

/// A job bundled with its runtime state.
#[derive(Debug)]
struct ScheduledJob {
    runner: JobRunner,
    metrics: Arc<JobMetrics>,
}

/// Core scheduler: evaluates every job once per minute and launches the due
/// ones, tolerating wall-clock jumps.
pub struct SchedulerEngine {
    jobs: Vec<ScheduledJob>,
    registry: Arc<MetricsRegistry>,
    clock: Arc<dyn Clock>,
    state: AtomicU8,
}

impl SchedulerEngine {
    /// Build runners and metrics for `jobs`, keeping table order.
    pub fn new(jobs: Vec<Job>, mode: CommandMode, clock: Arc<dyn Clock>) -> Self {
        let mut registry = MetricsRegistry::new();
        let jobs = jobs
            .into_iter()
            .map(|job| ScheduledJob {
                metrics: registry.register(&job.name),
                runner: JobRunner::new(Arc::new(job), mode.clone()),
            })
            .collect();
        Self {
            jobs,
            registry: Arc::new(registry),
            clock,
            state: AtomicU8::new(SchedulerState::Running as u8),
        }
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> + '_ {
        self.jobs.iter().map(|j| j.runner.job().as_ref())
    }

    pub fn state(&self) -> SchedulerState {
        match self.state.load(Ordering::SeqCst) {
            0 => SchedulerState::Running,
            1 => SchedulerState::Draining,
            _ => SchedulerState::Stopped,
        }
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Names of jobs whose previous run has not finished.
    pub fn running_jobs(&self) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|j| j.runner.is_running())
            .map(|j| j.runner.job().name.as_str())
            .collect()
    }

    /// Main loop. Wakes at hh:mm:30 every minute until `shutdown` leaves
    /// `Running` (or its sender is dropped). In-flight jobs are not awaited
    /// here; see [`drain`](Self::drain).
    pub async fn run(&self, mut shutdown: watch::Receiver<ShutdownPhase>) {
        info!("scheduling {} jobs", self.jobs.len());
        self.set_state(SchedulerState::Running);

        let now = self.clock.now();
        let mut skew = SkewDetector::new(&(now + delay_till_next_check(&now)));

        while *shutdown.borrow_and_update() == ShutdownPhase::Running {
            let now = self.clock.now();
            let delay = delay_till_next_check(&now);
            self.record_skew(skew.observe(&(now + delay)));

            tokio::select! {
                _ = tokio::time::sleep(delay.to_std().unwrap_or_default()) => {}
                _ = shutdown.changed() => break,
            }

            self.dispatch_due(&self.clock.now());
        }

        info!("scheduler loop stopped");
        self.set_state(SchedulerState::Draining);
    }

    /// Count and log a detected clock jump.
    pub fn record_skew(&self, jump: Option<TimeJump>) {
        match jump {
            Some(TimeJump::Forward) => {
                warn!("forward time jump detected, jobs may have been skipped");
                self.registry.scheduler.forward_time_skips.inc();
            }
            Some(TimeJump::Backward) => {
                warn!("backward time jump detected, jobs may be run multiple times");
                self.registry.scheduler.backward_time_skips.inc();
            }
            None => {}
        }
    }

    /// Start every job due at `now` in table order. A due job whose last run
    /// is still in flight is counted as overdue and skipped.
    pub fn dispatch_due(&self, now: &DateTime<FixedOffset>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for scheduled in &self.jobs {
            let job = scheduled.runner.job();
            if !job.schedule.is_due(now) {
                continue;
            }
            if scheduled.runner.is_running() {
                warn!(job = %job.name, "job is overdue");
                scheduled.metrics.overdue.inc();
                summary.overdue += 1;
                continue;
            }

            info!(job = %job.name, "starting job");
            scheduled.metrics.is_running.set(1.0);
            let metrics = Arc::clone(&scheduled.metrics);
            scheduled
                .runner
                .start(move |exit| record_exit(&metrics, &exit));
            summary.started += 1;
        }
        summary
    }

    /// Wait for every in-flight job to finish.
    pub async fn drain(&self) {
        self.set_state(SchedulerState::Draining);
        for scheduled in &self.jobs {
            if scheduled.runner.is_running() {
                info!(job = %scheduled.runner.job().name, "waiting for job");
            }
            scheduled.runner.wait().await;
        }
        self.set_state(SchedulerState::Stopped);
    }

    /// Drain, unless `shutdown` reaches `Aborting` first.
    pub async fn drain_or_abort(
        &self,
        mut shutdown: watch::Receiver<ShutdownPhase>,
    ) -> DrainOutcome {
        let aborted = async {
            if shutdown
                .wait_for(|p| *p == ShutdownPhase::Aborting)
                .await
                .is_err()
            {
                // Nobody can abort any more.
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = self.drain() => DrainOutcome::Completed,
            _ = aborted => {
                let left = self.running_jobs();
                error!(jobs = ?left, "abandoning in-flight jobs");
                DrainOutcome::Aborted
            }
        }
    }
}

/// Completion side effects for one run: running gauge, outcome counters,
/// duration and, when available, resource usage.
fn record_exit(metrics: &JobMetrics, exit: &JobExit) {
    let status = exit.exit_status();
    if let Err(e) = &exit.status {
        warn!(job = %exit.job, error = %e, "job could not be run");
    }
    info!(
        job = %exit.job,
        exit_status = status,
        elapsed_ms = exit.elapsed.as_millis() as u64,
        "job finished"
    );

    metrics.is_running.set(0.0);
    if status == 0 {
        metrics.success.inc();
    } else {
        metrics.failure.inc();
    }
    metrics.duration.set(exit.elapsed.as_secs_f64());

    if let Some(usage) = exit.usage {
        metrics.maxrss_bytes.set(usage.maxrss_bytes as f64);
        metrics.utime.set(usage.user_time.as_secs_f64());
        metrics.stime.set(usage.system_time.as_secs_f64());
    }
}
