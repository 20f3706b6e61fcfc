//! Graceful shutdown coordinator for crosspost.
//!
//! Handles SIGINT/SIGTERM signals and coordinates cleanup of:
//! - The dispatcher ticker
//! - The lease sweeper
//! - The credential look-ahead sweeper

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};

use crate::Result;

/// Shutdown signal that can be sent to all background loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Graceful shutdown requested (SIGINT/SIGTERM)
    Graceful,
    /// Force shutdown requested (timeout exceeded)
    Force,
}

/// Coordinator for graceful shutdown across all services
pub struct ShutdownCoordinator {
    /// Channel to broadcast shutdown signals
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    /// Spawned loops that need cleanup, with their names
    tasks: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutting_down: AtomicBool,
    /// Timeout for graceful shutdown before aborting
    shutdown_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx,
            tasks: Arc::new(Mutex::new(Vec::new())),
            shutting_down: AtomicBool::new(false),
            shutdown_timeout,
        }
    }

    /// Get a receiver for shutdown signals
    ///
    /// Background loops call this and `select!` on it next to their timers.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// Register a task for cleanup on shutdown
    pub async fn register_task(&self, name: &'static str, task: JoinHandle<()>) {
        self.tasks.lock().await.push((name, task));
    }

    /// Spawn a named background loop and register it.
    ///
    /// The closure receives its own shutdown receiver.
    pub async fn spawn<F, Fut>(&self, name: &'static str, make: F)
    where
        F: FnOnce(broadcast::Receiver<ShutdownSignal>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(make(self.subscribe()));
        tracing::debug!(task = name, "Background task started");
        self.register_task(name, handle).await;
    }

    /// Initiate graceful shutdown
    ///
    /// Loops get `shutdown_timeout` to observe the signal and return; whatever
    /// is still running afterwards is aborted.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Initiating graceful shutdown...");

        let _ = self.shutdown_tx.send(ShutdownSignal::Graceful);

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        let aborts: Vec<_> = tasks
            .iter()
            .map(|(name, task)| (*name, task.abort_handle()))
            .collect();

        let joined = tokio::time::timeout(self.shutdown_timeout, async {
            for (name, task) in tasks {
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        tracing::error!(task = name, "Background task panicked: {e}");
                    }
                }
            }
        })
        .await;

        if joined.is_err() {
            tracing::warn!("Shutdown timeout exceeded, forcing shutdown");
            let _ = self.shutdown_tx.send(ShutdownSignal::Force);
            for (name, abort) in aborts {
                if !abort.is_finished() {
                    tracing::warn!(task = name, "Aborting background task");
                    abort.abort();
                }
            }
        } else {
            tracing::info!("Graceful shutdown completed");
        }
        Ok(())
    }

    /// Check if shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Create signal channels for SIGINT and SIGTERM
///
/// Returns receivers that will receive a value when the signal is detected
pub async fn signal_channels() -> Result<(broadcast::Receiver<()>, broadcast::Receiver<()>)> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| crate::Error::Io(format!("Failed to setup SIGINT: {e}")))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| crate::Error::Io(format!("Failed to setup SIGTERM: {e}")))?;

        let (sigint_tx, sigint_rx) = broadcast::channel(1);
        let (sigterm_tx, sigterm_rx) = broadcast::channel(1);

        tokio::spawn(async move {
            let _ = sigint.recv().await;
            tracing::info!("Received SIGINT");
            let _ = sigint_tx.send(());
        });

        tokio::spawn(async move {
            let _ = sigterm.recv().await;
            tracing::info!("Received SIGTERM");
            let _ = sigterm_tx.send(());
        });

        Ok((sigint_rx, sigterm_rx))
    }

    #[cfg(not(unix))]
    {
        let (sigint_tx, sigint_rx) = broadcast::channel(1);
        let (sigterm_tx, sigterm_rx) = broadcast::channel(1);

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl-C");
            let _ = sigint_tx.send(());
            let _ = sigterm_tx.send(());
        });

        Ok((sigint_rx, sigterm_rx))
    }
}

/// Resolve once either SIGINT or SIGTERM arrives.
pub async fn wait_for_signal() -> Result<()> {
    let (mut sigint, mut sigterm) = signal_channels().await?;
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_shutdown_coordinator_creation() {
        let coordinator = ShutdownCoordinator::default();
        assert!(!coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_shutdown_subscription() {
        let coordinator = ShutdownCoordinator::default();
        let mut rx = coordinator.subscribe();

        let shutdown_result = coordinator.shutdown().await;
        assert!(shutdown_result.is_ok(), "shutdown should succeed");
        assert!(coordinator.is_shutting_down());

        match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Ok(signal)) => assert_eq!(signal, ShutdownSignal::Graceful),
            Ok(Err(e)) => unreachable!("should not receive broadcast error: {e}"),
            Err(e) => unreachable!("should receive signal within timeout: {e}"),
        }
    }

    #[tokio::test]
    async fn test_cooperative_loop_exits_on_signal() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator
            .spawn("ticker", |mut rx| async move {
                loop {
                    tokio::select! {
                        _ = rx.recv() => break,
                        () = tokio::time::sleep(Duration::from_millis(10)) => {}
                    }
                }
            })
            .await;

        let started = std::time::Instant::now();
        assert!(coordinator.shutdown().await.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(coordinator.tasks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_stuck_task_is_aborted_after_timeout() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
        let mut rx = coordinator.subscribe();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        let abort = task.abort_handle();
        coordinator.register_task("stuck", task).await;

        assert!(coordinator.shutdown().await.is_ok());
        assert_eq!(rx.recv().await.ok(), Some(ShutdownSignal::Graceful));
        assert_eq!(rx.recv().await.ok(), Some(ShutdownSignal::Force));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(abort.is_finished());
    }
}
