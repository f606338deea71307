use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cronkeep_core::{CronkeepConfig, CronkeepError};
use cronkeep_scheduler::{
    metrics::run_reporter,
    preview::{simulate, write_schedule},
    Clock, CommandMode, DrainOutcome, Job, JsonFileSink, LogSink, MetricsSink, SchedulerEngine,
    ShutdownCoordinator, SystemClock,
};
use tracing::{error, info};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cronkeep=info,cronkeep_scheduler=info".into()),
        )
        .init();

    let cli = cli::Cli::parse();

    let config = load_config(&cli).inspect_err(|e| error!(code = e.code(), "{e}"))?;
    let table = config.table.path.display().to_string();
    let text = config
        .table
        .read()
        .inspect_err(|e| error!(code = e.code(), "{e}"))?;
    let jobs = cronkeep_scheduler::parse_jobs(&table, &text)
        .with_context(|| format!("failed to load job table {table}"))?;

    let clock = SystemClock {
        utc: config.clock.utc,
    };

    if let Some(lookahead) = cli.lookahead() {
        let firings = simulate(&jobs, clock.now(), lookahead)?;
        write_schedule(&mut std::io::stdout().lock(), &firings)?;
        return Ok(());
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("CRONKEEP_GIT_SHA"),
        table = %table,
        "cronkeep starting"
    );
    run_daemon(&config, jobs, clock).await
}

/// Config file plus the `--cron-tab` override.
fn load_config(cli: &cli::Cli) -> Result<CronkeepConfig, CronkeepError> {
    let mut config = CronkeepConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.cron_tab {
        config.table.path = path.clone();
    }
    Ok(config)
}

async fn run_daemon(config: &CronkeepConfig, jobs: Vec<Job>, clock: SystemClock) -> anyhow::Result<()> {
    let mode = match &config.runner.shell {
        Some(shell) => CommandMode::Shell(shell.clone()),
        None => CommandMode::Direct,
    };
    let engine = SchedulerEngine::new(jobs, mode, Arc::new(clock));

    let shutdown = Arc::new(ShutdownCoordinator::new());
    tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move {
            if let Err(e) = shutdown.listen().await {
                error!("failed to install signal handlers: {e}");
            }
        }
    });

    let sink: Arc<dyn MetricsSink> = match &config.metrics.output {
        Some(path) => Arc::new(JsonFileSink::new(path)),
        None => Arc::new(LogSink),
    };
    let reporter = tokio::spawn(run_reporter(
        engine.metrics(),
        Arc::clone(&sink),
        config.metrics.prefix.clone(),
        config.metrics_interval(),
        shutdown.subscribe(),
    ));

    engine.run(shutdown.subscribe()).await;

    match engine.drain_or_abort(shutdown.subscribe()).await {
        DrainOutcome::Completed => {
            let _ = reporter.await;
            // Counters now include the runs that finished while draining.
            if let Err(e) = sink.emit(&engine.metrics().snapshot(&config.metrics.prefix)) {
                error!("final metrics report failed: {e}");
            }
            info!("all jobs finished, exiting");
            Ok(())
        }
        // Blocking reapers would hold the runtime open on drop.
        DrainOutcome::Aborted => std::process::exit(1),
    }
}
