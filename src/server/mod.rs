//! Rendezvous server
//!
//! Hosts the request store behind a localhost-only HTTP surface, with a
//! watchdog that evicts stale answers and shuts the process down once
//! nothing is left to serve.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{Config, ServerConfig};
use crate::notify;
use crate::store::RequestStore;

mod coordinator;
pub mod routes;
mod watchdog;

pub use coordinator::{AskError, Coordinator, NewQuestion, StatusEntry};
pub use watchdog::{SweepOutcome, Watchdog};

/// Why the server is going down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The store has been empty past the idle timeout
    Idle,
    /// A caller asked over the protocol
    Requested,
}

/// Shared state behind every protocol handler
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub config: ServerConfig,
    /// Set once shutdown begins; creation is refused from then on
    pub shutting_down: Arc<AtomicBool>,
    pub shutdown_tx: mpsc::Sender<ShutdownReason>,
}

/// Run the server until it is idle, asked to stop, or signalled
pub async fn run(config: &Config) -> Result<()> {
    let server_config = config.server.clone();
    let store = Arc::new(RequestStore::new(server_config.max_pending));
    let notifier = notify::create_notifier(&config.notify);
    let coordinator = Arc::new(Coordinator::new(server_config.clone(), store.clone(), notifier));

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<ShutdownReason>(1);
    let shutting_down = Arc::new(AtomicBool::new(false));

    let watchdog = Watchdog::new(server_config.clone(), store.clone(), shutdown_tx.clone());
    let watchdog_handle = tokio::spawn(watchdog.run());

    let state = AppState {
        coordinator,
        config: server_config.clone(),
        shutting_down: shutting_down.clone(),
        shutdown_tx,
    };
    let app = routes::router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], server_config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind {addr}"))?;
    info!(%addr, "askdaemon server listening");

    #[cfg(unix)]
    let shutdown = {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let shutting_down = shutting_down.clone();
        async move {
            tokio::select! {
                reason = shutdown_rx.recv() => info!(?reason, "Shutdown requested"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            }
            shutting_down.store(true, Ordering::SeqCst);
        }
    };

    #[cfg(not(unix))]
    let shutdown = {
        let shutting_down = shutting_down.clone();
        async move {
            tokio::select! {
                reason = shutdown_rx.recv() => info!(?reason, "Shutdown requested"),
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
            }
            shutting_down.store(true, Ordering::SeqCst);
        }
    };

    // In-flight requests drain before serve returns; long-polls are capped
    // at max_wait, so the drain is bounded.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    watchdog_handle.abort();
    info!("askdaemon server stopped");
    Ok(())
}
