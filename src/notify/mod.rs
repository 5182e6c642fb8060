//! Operator notification channels
//!
//! Notifications are best-effort by contract: delivery failures are logged
//! and swallowed, the request that triggered them is never failed.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::NotifyConfig;

mod desktop;

pub use desktop::{DesktopNotifier, StderrNotifier};

/// Errors from notification delivery
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification command failed: {0}")]
    Command(#[from] std::io::Error),

    #[error("Notification command timed out")]
    TimedOut,

    #[error("No desktop notifier available on this platform")]
    Unsupported,
}

/// A channel that tells the operator an agent is waiting for input
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce a new question and where to respond to it
    async fn notify(&self, agent: Option<&str>, question: &str, url: &str) -> Result<(), NotifyError>;
}

/// Notifier that swallows everything, for headless setups
pub struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _agent: Option<&str>, _question: &str, _url: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Create a notifier based on the channel specified in config
///
/// Supports "desktop", "stderr" and "none". An unknown channel falls back
/// to "stderr" rather than refusing to start.
pub fn create_notifier(config: &NotifyConfig) -> Arc<dyn Notifier> {
    debug!(channel = %config.channel, "create_notifier: called");
    match config.channel.as_str() {
        "desktop" => Arc::new(DesktopNotifier),
        "stderr" => Arc::new(StderrNotifier),
        "none" => Arc::new(SilentNotifier),
        other => {
            warn!(channel = %other, "Unknown notification channel, using stderr");
            Arc::new(StderrNotifier)
        }
    }
}

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Mock notifier for unit tests, records every delivery
    pub struct MockNotifier {
        call_count: AtomicUsize,
        last: Mutex<Option<(Option<String>, String, String)>>,
    }

    impl MockNotifier {
        pub fn new() -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                last: Mutex::new(None),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn last_question(&self) -> Option<String> {
            self.last.lock().unwrap().as_ref().map(|(_, q, _)| q.clone())
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify(&self, agent: Option<&str>, question: &str, url: &str) -> Result<(), NotifyError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some((agent.map(str::to_string), question.to_string(), url.to_string()));
            Ok(())
        }
    }
}
