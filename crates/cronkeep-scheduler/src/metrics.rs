//! Per-job counters and gauges, plus periodic reporting to a [`MetricsSink`].
//!
//! Every metric is an atomic, so the scheduler loop and completion tasks can
//! update them without a lock. Metric names follow `<job>-<metric>`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{error::Result, types::ShutdownPhase};

/// Monotonically increasing count.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Last-written value. Reads as `None` until first set.
#[derive(Debug, Default)]
pub struct Gauge {
    bits: AtomicU64,
    set: AtomicBool,
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
        self.set.store(true, Ordering::Release);
    }

    pub fn get(&self) -> Option<f64> {
        self.set
            .load(Ordering::Acquire)
            .then(|| f64::from_bits(self.bits.load(Ordering::Relaxed)))
    }
}

/// Everything recorded about one job.
#[derive(Debug, Default)]
pub struct JobMetrics {
    pub overdue: Counter,
    pub failure: Counter,
    pub success: Counter,
    pub duration: Gauge,
    pub maxrss_bytes: Gauge,
    pub utime: Gauge,
    pub stime: Gauge,
    pub is_running: Gauge,
}

impl JobMetrics {
    fn write_into(&self, job: &str, out: &mut BTreeMap<String, f64>) {
        let counters = [
            ("overdue", &self.overdue),
            ("failure", &self.failure),
            ("success", &self.success),
        ];
        for (suffix, c) in counters {
            out.insert(format!("{job}-{suffix}"), c.get() as f64);
        }
        let gauges = [
            ("duration", &self.duration),
            ("maxrss-bytes", &self.maxrss_bytes),
            ("utime", &self.utime),
            ("stime", &self.stime),
            ("is-running", &self.is_running),
        ];
        for (suffix, g) in gauges {
            if let Some(v) = g.get() {
                out.insert(format!("{job}-{suffix}"), v);
            }
        }
    }
}

/// Process-wide clock anomaly counters.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    pub forward_time_skips: Counter,
    pub backward_time_skips: Counter,
}

/// All metrics of one daemon instance, built once at startup.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    pub scheduler: SchedulerMetrics,
    jobs: Vec<(String, Arc<JobMetrics>)>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and return the handle its runner and callback share.
    pub fn register(&mut self, job: &str) -> Arc<JobMetrics> {
        let metrics = Arc::new(JobMetrics::default());
        self.jobs.push((job.to_string(), Arc::clone(&metrics)));
        metrics
    }

    pub fn job(&self, name: &str) -> Option<&Arc<JobMetrics>> {
        self.jobs.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn snapshot(&self, plugin: &str) -> MetricsSnapshot {
        let mut values = BTreeMap::new();
        values.insert(
            "forward-time-skips".to_string(),
            self.scheduler.forward_time_skips.get() as f64,
        );
        values.insert(
            "backward-time-skips".to_string(),
            self.scheduler.backward_time_skips.get() as f64,
        );
        for (name, m) in &self.jobs {
            m.write_into(name, &mut values);
        }
        MetricsSnapshot {
            plugin: plugin.to_string(),
            taken_at: Utc::now(),
            values,
        }
    }
}

/// Point-in-time copy of every set metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub plugin: String,
    pub taken_at: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

/// Destination for metric reports.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, snapshot: &MetricsSnapshot) -> Result<()>;
}

/// Emits each report as a structured log event.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn emit(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let values = serde_json::to_string(&snapshot.values).unwrap_or_default();
        info!(plugin = %snapshot.plugin, %values, "metrics");
        Ok(())
    }
}

/// Writes each report as a JSON document, replacing the previous one.
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsSink for JsonFileSink {
    fn emit(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let body = serde_json::to_vec_pretty(snapshot).map_err(std::io::Error::from)?;
        // Write beside the target and rename so readers never see a partial file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Emit a snapshot every `interval` until the shutdown phase leaves
/// `Running`, then emit once more.
pub async fn run_reporter(
    registry: Arc<MetricsRegistry>,
    sink: Arc<dyn MetricsSink>,
    plugin: String,
    interval: Duration,
    mut shutdown: watch::Receiver<ShutdownPhase>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => report(&registry, sink.as_ref(), &plugin),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() != ShutdownPhase::Running {
                    break;
                }
            }
        }
    }
    report(&registry, sink.as_ref(), &plugin);
}

fn report(registry: &MetricsRegistry, sink: &dyn MetricsSink, plugin: &str) {
    if let Err(e) = sink.emit(&registry.snapshot(plugin)) {
        warn!("metrics report failed: {e}");
    }
}
