//! Idle and eviction watchdog
//!
//! Periodically evicts stale answered requests and asks for a graceful
//! shutdown once the store has been empty for the idle timeout.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::ShutdownReason;
use crate::config::ServerConfig;
use crate::store::RequestStore;

/// What a single sweep did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Answered requests dropped this sweep
    pub evicted: usize,
    /// Whether the idle timeout has been reached
    pub shutdown: bool,
}

/// The Watchdog enforces the store's time-based lifecycle rules
pub struct Watchdog {
    config: ServerConfig,
    store: Arc<RequestStore>,
    shutdown_tx: mpsc::Sender<ShutdownReason>,
    /// Set while the store has been empty at every sweep since this instant
    empty_since: Option<Instant>,
}

impl Watchdog {
    /// Create a new Watchdog over the given store
    pub fn new(config: ServerConfig, store: Arc<RequestStore>, shutdown_tx: mpsc::Sender<ShutdownReason>) -> Self {
        Self {
            config,
            store,
            shutdown_tx,
            empty_since: None,
        }
    }

    /// Run a single sweep against the given clock
    ///
    /// Separated from `run` so the ten-minute idle progression can be
    /// tested without waiting ten minutes.
    pub fn sweep_at(&mut self, now: Instant) -> SweepOutcome {
        let evicted = self.store.evict_older_than(self.config.answered_ttl(), now);

        let shutdown = if self.store.is_empty() {
            let since = *self.empty_since.get_or_insert(now);
            now.saturating_duration_since(since) >= self.config.idle_timeout()
        } else {
            // Observed activity resets the idle window
            self.empty_since = None;
            false
        };

        SweepOutcome { evicted, shutdown }
    }

    /// When the current empty stretch started, if one is being counted
    pub fn empty_since(&self) -> Option<Instant> {
        self.empty_since
    }

    /// Run the watchdog loop until the idle timeout fires
    pub async fn run(mut self) {
        info!(
            sweep_interval_secs = self.config.sweep_interval_secs,
            answered_ttl_secs = self.config.answered_ttl_secs,
            idle_timeout_secs = self.config.idle_timeout_secs,
            "Watchdog started"
        );

        loop {
            let outcome = self.sweep_at(Instant::now());
            if outcome.evicted > 0 {
                info!(evicted = outcome.evicted, "Evicted stale answered requests");
            }
            if outcome.shutdown {
                info!("Store idle past timeout, requesting shutdown");
                if self.shutdown_tx.send(ShutdownReason::Idle).await.is_err() {
                    error!("Shutdown channel closed before idle shutdown could be requested");
                }
                return;
            }

            // Sleep until next sweep
            tokio::time::sleep(self.config.sweep_interval()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::Request;

    fn test_watchdog(store: Arc<RequestStore>) -> (Watchdog, mpsc::Receiver<ShutdownReason>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let watchdog = Watchdog::new(ServerConfig::default(), store, shutdown_tx);
        (watchdog, shutdown_rx)
    }

    #[tokio::test]
    async fn test_sweep_evicts_stale_answered() {
        let store = Arc::new(RequestStore::new(10));
        let request = Request::new("done already");
        let id = request.id.clone();
        store.insert(request).unwrap();
        store.answer(&id, "yes").unwrap();

        let (mut watchdog, _rx) = test_watchdog(store.clone());

        // Within the 300s retention window: kept
        let outcome = watchdog.sweep_at(Instant::now() + Duration::from_secs(200));
        assert_eq!(outcome.evicted, 0);
        assert!(!outcome.shutdown);
        assert!(store.get(&id).is_some());

        // Past it: gone
        let outcome = watchdog.sweep_at(Instant::now() + Duration::from_secs(400));
        assert_eq!(outcome.evicted, 1);
        assert!(store.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_idle_progression_to_shutdown() {
        let store = Arc::new(RequestStore::new(10));
        let (mut watchdog, _rx) = test_watchdog(store);
        let base = Instant::now();

        // First sweep of an empty store starts the idle clock
        assert!(!watchdog.sweep_at(base).shutdown);
        assert_eq!(watchdog.empty_since(), Some(base));

        // Nine minutes in: still waiting
        assert!(!watchdog.sweep_at(base + Duration::from_secs(540)).shutdown);

        // Ten minutes in: time to go
        assert!(watchdog.sweep_at(base + Duration::from_secs(600)).shutdown);
    }

    #[tokio::test]
    async fn test_activity_resets_idle_window() {
        let store = Arc::new(RequestStore::new(10));
        let (mut watchdog, _rx) = test_watchdog(store.clone());
        let base = Instant::now();

        assert!(!watchdog.sweep_at(base).shutdown);

        // A request arrives at minute nine
        let request = Request::new("still here?");
        let id = request.id.clone();
        store.insert(request).unwrap();
        let outcome = watchdog.sweep_at(base + Duration::from_secs(540));
        assert!(!outcome.shutdown);
        assert!(watchdog.empty_since().is_none());

        // It gets answered and eventually evicted; the idle clock restarts
        // from the sweep that observed the store empty again
        store.answer(&id, "yes").unwrap();
        let restart = base + Duration::from_secs(900);
        let outcome = watchdog.sweep_at(restart);
        assert_eq!(outcome.evicted, 1);
        assert!(!outcome.shutdown);
        assert_eq!(watchdog.empty_since(), Some(restart));

        // Ten minutes from the minute-15 restart, not from base
        assert!(!watchdog.sweep_at(restart + Duration::from_secs(599)).shutdown);
        assert!(watchdog.sweep_at(restart + Duration::from_secs(600)).shutdown);
    }

    #[tokio::test]
    async fn test_answered_request_blocks_idle_shutdown_until_evicted() {
        let store = Arc::new(RequestStore::new(10));
        let (mut watchdog, _rx) = test_watchdog(store.clone());
        let base = Instant::now();

        let request = Request::new("q");
        let id = request.id.clone();
        store.insert(request).unwrap();
        store.answer(&id, "a").unwrap();

        // Answered-but-retained still counts as activity
        let outcome = watchdog.sweep_at(base + Duration::from_secs(100));
        assert!(!outcome.shutdown);
        assert!(watchdog.empty_since().is_none());

        // Eviction and idle counting happen in the same sweep
        let evicting = base + Duration::from_secs(400);
        let outcome = watchdog.sweep_at(evicting);
        assert_eq!(outcome.evicted, 1);
        assert_eq!(watchdog.empty_since(), Some(evicting));
        assert!(watchdog.sweep_at(evicting + Duration::from_secs(600)).shutdown);
    }

    #[tokio::test]
    async fn test_run_requests_shutdown_when_idle() {
        let store = Arc::new(RequestStore::new(10));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let config = ServerConfig {
            sweep_interval_secs: 1,
            idle_timeout_secs: 0,
            ..Default::default()
        };
        let watchdog = Watchdog::new(config, store, shutdown_tx);

        tokio::spawn(watchdog.run());

        let reason = tokio::time::timeout(Duration::from_secs(2), shutdown_rx.recv())
            .await
            .expect("watchdog should request shutdown promptly")
            .expect("channel open");
        assert_eq!(reason, ShutdownReason::Idle);
    }
}
