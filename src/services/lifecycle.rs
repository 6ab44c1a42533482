//! Process lifecycle: one owner object created in `main` that hands out the
//! listener slot, tracks background tasks and coordinates graceful shutdown.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("a notification listener is already running in this process")]
    ListenerAlreadyRunning,
    #[error("shutdown has already begun")]
    ShuttingDown,
    #[error("{0} task(s) still running after the {1:?} grace period")]
    GraceExpired(usize, Duration),
}

pub struct LifecycleOwner {
    token: CancellationToken,
    tracker: TaskTracker,
    listener_active: Arc<AtomicBool>,
    grace: Duration,
}

/// Proof of holding the process's single listener slot. Released on drop.
#[derive(Debug)]
pub struct ListenerSlot {
    active: Arc<AtomicBool>,
}

impl Drop for ListenerSlot {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl LifecycleOwner {
    pub fn new(grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            listener_active: Arc::new(AtomicBool::new(false)),
            grace,
        }
    }

    /// Token cancelled when shutdown begins. Child tokens can be cancelled
    /// independently without affecting the owner.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn acquire_listener_slot(&self) -> Result<ListenerSlot, LifecycleError> {
        if self.is_shutting_down() {
            return Err(LifecycleError::ShuttingDown);
        }
        self.listener_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| LifecycleError::ListenerAlreadyRunning)?;
        Ok(ListenerSlot {
            active: self.listener_active.clone(),
        })
    }

    pub fn listener_running(&self) -> bool {
        self.listener_active.load(Ordering::SeqCst)
    }

    /// Spawn a task that shutdown waits for.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("🧵 Starting {}", name);
        self.tracker.spawn(async move {
            task.await;
            info!("🧵 {} stopped", name);
        })
    }

    pub fn begin_shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("🛑 Shutdown requested, draining background tasks");
            self.token.cancel();
        }
    }

    /// Cancel everything and wait up to the grace period for tracked tasks.
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        self.begin_shutdown();
        self.tracker.close();

        match tokio::time::timeout(self.grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("✅ All background tasks finished");
                Ok(())
            }
            Err(_) => {
                let remaining = self.tracker.len();
                warn!(
                    "⚠️ {} task(s) still running after {:?}; exiting anyway",
                    remaining, self.grace
                );
                Err(LifecycleError::GraceExpired(remaining, self.grace))
            }
        }
    }
}

/// Resolve on SIGINT (Ctrl-C) or, on unix, SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
