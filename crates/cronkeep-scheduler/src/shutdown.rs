//! Two-stage signal-driven shutdown.
//!
//! ```text
//! Running --signal--> Draining --signal--> Aborting
//! ```
//!
//! The first SIGINT/SIGTERM stops new dispatches and lets in-flight jobs
//! finish. A second one gives up waiting for them. Child processes are never
//! killed on either path.

use tokio::sync::watch;
use tracing::{error, info};

use crate::types::ShutdownPhase;

/// Owns the shutdown phase and broadcasts every transition.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<ShutdownPhase>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShutdownPhase::Running);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.tx.subscribe()
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.tx.borrow()
    }

    /// Apply one termination signal and return the resulting phase.
    pub fn signal(&self) -> ShutdownPhase {
        let next = match self.phase() {
            ShutdownPhase::Running => {
                info!("shutting down due to signal");
                ShutdownPhase::Draining
            }
            ShutdownPhase::Draining | ShutdownPhase::Aborting => {
                error!("forcing shutdown due to signal");
                ShutdownPhase::Aborting
            }
        };
        self.tx.send_replace(next);
        next
    }

    /// Feed OS termination signals into [`signal`](Self::signal) until the
    /// phase reaches `Aborting`.
    pub async fn listen(&self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut interrupt = signal(SignalKind::interrupt())?;
            let mut terminate = signal(SignalKind::terminate())?;
            loop {
                let name = tokio::select! {
                    _ = interrupt.recv() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                };
                info!(signal = name, "received termination signal");
                if self.signal() == ShutdownPhase::Aborting {
                    return Ok(());
                }
            }
        }

        #[cfg(not(unix))]
        loop {
            tokio::signal::ctrl_c().await?;
            info!(signal = "ctrl-c", "received termination signal");
            if self.signal() == ShutdownPhase::Aborting {
                return Ok(());
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let c = ShutdownCoordinator::new();
        assert_eq!(c.phase(), ShutdownPhase::Running);
    }

    #[test]
    fn first_signal_drains_second_aborts() {
        let c = ShutdownCoordinator::new();
        assert_eq!(c.signal(), ShutdownPhase::Draining);
        assert_eq!(c.signal(), ShutdownPhase::Aborting);
        // Further signals are absorbed.
        assert_eq!(c.signal(), ShutdownPhase::Aborting);
        assert_eq!(c.phase(), ShutdownPhase::Aborting);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let c = ShutdownCoordinator::new();
        let mut rx = c.subscribe();
        assert_eq!(*rx.borrow(), ShutdownPhase::Running);

        c.signal();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ShutdownPhase::Draining);

        c.signal();
        let phase = *rx
            .wait_for(|p| *p == ShutdownPhase::Aborting)
            .await
            .unwrap();
        assert_eq!(phase, ShutdownPhase::Aborting);
    }

    #[tokio::test]
    async fn late_subscriber_sees_current_phase() {
        let c = ShutdownCoordinator::new();
        c.signal();
        let rx = c.subscribe();
        assert_eq!(*rx.borrow(), ShutdownPhase::Draining);
    }
}
