//! `JobRunner`: launches one job's command and tracks whether it is still
//! in flight.
//!
//! Each run executes on a blocking-pool thread: the process is spawned, then
//! reaped with `wait4(2)` so the kernel's resource accounting for that child
//! can be captured. The scheduler loop never waits on it.

use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{error::SchedulerError, types::Job};

/// Exit status reported for a command that could not be launched or reaped.
pub const UNLAUNCHABLE_STATUS: i32 = 127;

/// How a job's command line becomes a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CommandMode {
    /// Split on whitespace and execute the first word directly.
    #[default]
    Direct,
    /// Hand the whole line to `<shell> -c`.
    Shell(String),
}

impl CommandMode {
    fn build(&self, job: &Job) -> std::io::Result<Command> {
        let mut cmd = match self {
            CommandMode::Direct => {
                let argv = job.argv();
                let (program, args) = argv.split_first().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
                })?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            CommandMode::Shell(shell) => {
                let mut cmd = Command::new(shell);
                cmd.arg("-c").arg(&job.command);
                cmd
            }
        };
        cmd.stdin(Stdio::null());
        Ok(cmd)
    }
}

/// Kernel resource accounting for one finished child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub maxrss_bytes: u64,
    pub user_time: Duration,
    pub system_time: Duration,
}

/// Outcome of one run, handed to the completion callback exactly once.
#[derive(Debug)]
pub struct JobExit {
    pub job: String,
    pub elapsed: Duration,
    /// `Err` when the command could not be launched or reaped.
    pub status: Result<ExitStatus, SchedulerError>,
    /// `None` where the platform does not expose per-child accounting.
    pub usage: Option<ResourceUsage>,
}

impl JobExit {
    /// Decoded exit status: the exit code, `128 + signal` for a child killed
    /// by a signal, or [`UNLAUNCHABLE_STATUS`].
    pub fn exit_status(&self) -> i32 {
        match &self.status {
            Ok(status) => decode_status(status),
            Err(_) => UNLAUNCHABLE_STATUS,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status() == 0
    }
}

fn decode_status(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    UNLAUNCHABLE_STATUS
}

/// Runtime state of one job: the in-flight flag and the handle of the
/// current run, if any.
#[derive(Debug)]
pub struct JobRunner {
    job: Arc<Job>,
    mode: CommandMode,
    running: Arc<AtomicBool>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl JobRunner {
    pub fn new(job: Arc<Job>, mode: CommandMode) -> Self {
        Self {
            job,
            mode,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Mutex::new(None),
        }
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Launch the job's command without blocking the caller.
    ///
    /// `on_exit` runs exactly once when the process finishes or fails to
    /// launch; the running flag is cleared after it returns or panics. Must
    /// be called from within a Tokio runtime.
    pub fn start<F>(&self, on_exit: F)
    where
        F: FnOnce(JobExit) + Send + 'static,
    {
        self.running.store(true, Ordering::Release);

        let job = Arc::clone(&self.job);
        let mode = self.mode.clone();
        let running = Arc::clone(&self.running);

        let handle = tokio::task::spawn_blocking(move || {
            let _running = ClearOnDrop(running);
            let started = Instant::now();
            let (status, usage) = match mode.build(&job).and_then(|mut cmd| cmd.spawn()) {
                Ok(child) => {
                    debug!(job = %job.name, pid = child.id(), "process spawned");
                    match wait_with_usage(child) {
                        Ok((status, usage)) => (Ok(status), usage),
                        Err(e) => (Err(SchedulerError::Io(e)), None),
                    }
                }
                Err(e) => (Err(SchedulerError::Spawn(e)), None),
            };
            on_exit(JobExit {
                job: job.name.clone(),
                elapsed: started.elapsed(),
                status,
                usage,
            });
        });

        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Wait until the current run, if any, has completed and its callback
    /// has returned.
    pub async fn wait(&self) {
        let handle = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(job = %self.job.name, error = %e, "job completion task failed");
            }
        }
    }
}

/// Clears the running flag when the reaper task ends, panicking callback
/// included.
struct ClearOnDrop(Arc<AtomicBool>);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(unix)]
fn wait_with_usage(
    child: std::process::Child,
) -> std::io::Result<(ExitStatus, Option<ResourceUsage>)> {
    use std::os::unix::process::ExitStatusExt;

    let pid = child.id() as libc::pid_t;
    let mut status: libc::c_int = 0;
    // SAFETY: rusage is plain old data; all-zero is a valid value.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        // SAFETY: `pid` is our own unreaped child and both out-pointers are
        // valid for writes for the duration of the call.
        let rc = unsafe { libc::wait4(pid, &mut status, 0, &mut usage) };
        if rc == pid {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    // Linux reports ru_maxrss in KiB, macOS in bytes.
    let rss_unit: u64 = if cfg!(target_os = "macos") { 1 } else { 1024 };
    let usage = ResourceUsage {
        maxrss_bytes: (usage.ru_maxrss.max(0) as u64) * rss_unit,
        user_time: timeval_to_duration(&usage.ru_utime),
        system_time: timeval_to_duration(&usage.ru_stime),
    };
    Ok((ExitStatus::from_raw(status), Some(usage)))
}

#[cfg(unix)]
fn timeval_to_duration(tv: &libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
}

#[cfg(not(unix))]
fn wait_with_usage(
    mut child: std::process::Child,
) -> std::io::Result<(ExitStatus, Option<ResourceUsage>)> {
    Ok((child.wait()?, None))
}
