//! Cooperative cancellation. One coordinator owns the shutdown flag;
//! every suspension point (the inter-tick wait, gateway calls, git and
//! agent subprocesses) holds a [`ShutdownSignal`] and races against it.

use tokio::sync::watch;
use tracing::info;

/// Cloneable handle observed by long-running operations.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been requested. If the coordinator is
    /// gone the process is tearing down anyway, which counts too.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A signal that never fires. For tools that run outside the loop,
    /// like the status command.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive forever so the signal stays pending.
        std::mem::forget(tx);
        Self { rx }
    }
}

/// Owns the shutdown flag and the signal handlers that flip it.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Spawn a task that flips the flag on SIGINT or, on unix, SIGTERM.
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        let tx = self.tx.clone();

        #[cfg(unix)]
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::spawn(async move {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received interrupt, shutting down"),
                    _ = sigterm.recv() => info!("Received terminate signal, shutting down"),
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
                info!("Received interrupt, shutting down");
            }
            let _ = tx.send(true);
        });

        Ok(())
    }
}
