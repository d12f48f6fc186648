use super::scanner::DecayScanner;
use crate::core::{DocumentKind, PhantomError, Result};
use crate::host::IdleSource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{Level, event};

/// Handle to a background decay task.
///
/// A scan that has already started runs to completion; the stop signal is
/// only observed between scans.
pub struct DecayWorker {
    name: &'static str,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl DecayWorker {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Signals the worker to stop and waits for it to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle.await.map_err(|err| {
                PhantomError::Execution(format!("{} worker join: {}", self.name, err))
            })?;
        }
        Ok(())
    }
}

impl Drop for DecayWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the periodic scan loop for one document class.
///
/// Each cycle sleeps for `interval`, then waits for the host to go idle (at
/// most `idle_ceiling`), then scans. The next cycle is scheduled only after
/// the scan returns.
pub fn spawn_decay_worker(
    scanner: Arc<DecayScanner>,
    idle: Arc<dyn IdleSource>,
    interval: Duration,
    idle_ceiling: Duration,
) -> DecayWorker {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let kind = scanner.kind();
    let name = match kind {
        DocumentKind::Actor => "actor-decay",
        DocumentKind::Scene => "scene-decay",
    };

    let join_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = sleep(interval) => {}
            }
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = timeout(idle_ceiling, idle.wait_for_idle()) => {}
            }

            match scanner.process_decay().await {
                Ok(report) if report.swapped_out > 0 || !report.failures.is_empty() => {
                    event!(
                        Level::INFO,
                        kind = %kind,
                        swapped_out = report.swapped_out,
                        failures = report.failures.len(),
                        "decay scan finished"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    event!(Level::ERROR, kind = %kind, error = %err, "decay scan failed");
                }
            }
        }
        event!(Level::DEBUG, kind = %kind, "decay worker stopped");
    });

    DecayWorker {
        name,
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}

/// Runs `task` once after `delay`, unless stopped first.
pub fn spawn_delayed<F>(name: &'static str, delay: Duration, task: F) -> DecayWorker
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let join_handle = tokio::spawn(async move {
        tokio::select! {
            _ = stop_rx => {}
            _ = sleep(delay) => task.await,
        }
    });

    DecayWorker {
        name,
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
