//! Graceful shutdown handling

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    notify: Notify,
    triggered: AtomicBool,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            notify: Notify::new(),
            triggered: AtomicBool::new(false),
        })
    }

    /// Get a shutdown notifier
    pub fn subscribe(self: &Arc<Self>) -> ShutdownNotifier {
        ShutdownNotifier {
            inner: self.clone(),
        }
    }

    /// Wait for Ctrl+C or SIGTERM, then notify every subscriber
    pub async fn wait_for_signal(&self) {
        shutdown_signal().await;
        self.shutdown();
    }

    /// Trigger shutdown manually
    pub fn shutdown(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            info!("Shutdown triggered");
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

/// Shutdown notifier for components
#[derive(Clone)]
pub struct ShutdownNotifier {
    inner: Arc<ShutdownCoordinator>,
}

impl ShutdownNotifier {
    /// Resolve once shutdown has been triggered, even if that already happened
    pub async fn wait(self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.is_shutdown() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
