//! Task supervision and OS signal handling.
//!
//! Every long-running task is spawned into one [`JoinSet`] and watches the
//! same [`CancellationToken`]. A shutdown signal or the early exit of any task
//! cancels the token; the remaining tasks then get [`SHUTDOWN_GRACE`] to stop
//! before they are aborted.

use std::future::Future;
use std::io;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::signal::ctrl_c;
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Supervisor {
    tasks: JoinSet<&'static str>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn `task` under `name`. The name is reported if the task ends first.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(async move {
            task.await;
            name
        });
        tracing::debug!(task = name, "Task spawned");
    }

    /// Run until `shutdown` resolves or a task exits, then stop everything.
    ///
    /// Returns an error when a task ended on its own or panicked.
    pub async fn run<S>(mut self, shutdown: S) -> Result<()>
    where
        S: Future<Output = io::Result<()>>,
    {
        let early_exit = tokio::select! {
            signal = shutdown => {
                match signal {
                    Ok(()) => tracing::info!("Shutdown signal received"),
                    Err(e) => tracing::error!(error = %e, "Signal handling failed; shutting down"),
                }
                None
            }
            Some(joined) = self.tasks.join_next() => Some(joined),
        };

        self.cancel.cancel();
        self.drain().await;

        match early_exit {
            None => Ok(()),
            Some(joined) => Err(unexpected_exit(joined)),
        }
    }

    async fn drain(&mut self) {
        let graceful = timeout(SHUTDOWN_GRACE, async {
            while let Some(joined) = self.tasks.join_next().await {
                match joined {
                    Ok(name) => tracing::debug!(task = name, "Task stopped"),
                    Err(e) => log_join_error(&e),
                }
            }
        })
        .await;

        if graceful.is_err() {
            tracing::warn!(
                remaining = self.tasks.len(),
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Tasks did not stop in time; aborting"
            );
            self.tasks.shutdown().await;
        }
    }
}

fn unexpected_exit(joined: Result<&'static str, JoinError>) -> anyhow::Error {
    match joined {
        Ok(name) => {
            tracing::error!(task = name, "Task exited unexpectedly");
            anyhow!("{name} task exited unexpectedly")
        }
        Err(e) => {
            log_join_error(&e);
            anyhow!("task failed: {e}")
        }
    }
}

fn log_join_error(e: &JoinError) {
    if e.is_panic() {
        tracing::error!(error = %e, "Task panicked");
    } else {
        tracing::debug!(error = %e, "Task cancelled");
    }
}

/// Resolve on SIGINT, SIGTERM, SIGQUIT, or Ctrl-C.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> io::Result<()> {
    ctrl_c().await
}
