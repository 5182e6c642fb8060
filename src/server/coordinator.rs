//! Request validation and answer coordination
//!
//! The Coordinator sits between the protocol boundary and the RequestStore:
//! it validates incoming submissions, enforces the permission/command rule,
//! fires notifications, and runs the wait-for-answer poll loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::notify::Notifier;
use crate::store::{Request, RequestId, RequestKind, RequestStore, StoreError, is_valid_id};
use crate::{MAX_AGENT_LEN, MAX_ANSWER_LEN, MAX_COMMAND_LEN, MAX_CONTEXT_LEN, MAX_QUESTION_LEN, MAX_TASK_LEN};

/// Errors surfaced to protocol callers
#[derive(Debug, Error)]
pub enum AskError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("No answer within {0:?}")]
    Timeout(Duration),
}

/// A question as submitted, before validation
#[derive(Debug, Clone, Default)]
pub struct NewQuestion {
    pub question: String,
    pub context: Option<String>,
    pub agent: Option<String>,
    pub task: Option<String>,
    pub kind: RequestKind,
    pub command: Option<String>,
}

/// One pending request as shown by a status display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub agent: Option<String>,
    pub task: Option<String>,
    pub question: String,
    /// Seconds since the request was created, computed at call time
    pub elapsed_secs: u64,
}

/// Mediates every exchange between callers and the store
pub struct Coordinator {
    config: ServerConfig,
    store: Arc<RequestStore>,
    notifier: Arc<dyn Notifier>,
}

impl Coordinator {
    /// Create a new Coordinator over the given store and notifier
    pub fn new(config: ServerConfig, store: Arc<RequestStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            store,
            notifier,
        }
    }

    /// Where the operator can respond to pending requests
    pub fn respond_url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.config.port)
    }

    /// Validate and store a new question, returning its ID
    ///
    /// The notification is fire-and-forget: delivery failures are logged
    /// and never affect the submission.
    pub async fn submit_question(&self, input: NewQuestion) -> Result<RequestId, AskError> {
        if input.question.trim().is_empty() {
            return Err(AskError::Validation("question is required".to_string()));
        }
        check_len("question", &input.question, MAX_QUESTION_LEN)?;
        check_opt_len("context", input.context.as_deref(), MAX_CONTEXT_LEN)?;
        check_opt_len("agent", input.agent.as_deref(), MAX_AGENT_LEN)?;
        check_opt_len("task", input.task.as_deref(), MAX_TASK_LEN)?;
        check_opt_len("command", input.command.as_deref(), MAX_COMMAND_LEN)?;
        if input.kind == RequestKind::Permission && input.command.as_deref().is_none_or(|c| c.trim().is_empty()) {
            return Err(AskError::Validation("permission requests require a command".to_string()));
        }

        let mut request = Request::new(input.question);
        request.kind = input.kind;
        request.context = input.context;
        request.agent = input.agent;
        request.task = input.task;
        request.command = input.command;

        let id = request.id.clone();
        let agent = request.agent.clone();
        let question = request.question.clone();
        self.store.insert(request)?;
        info!(id = %id, agent = ?agent, kind = ?input.kind, "Request submitted");

        let notifier = self.notifier.clone();
        let url = self.respond_url();
        tokio::spawn(async move {
            if let Err(error) = notifier.notify(agent.as_deref(), &question, &url).await {
                debug!(error = %error, "Notification failed");
            }
        });

        Ok(id)
    }

    /// Wait until the request is answered or `timeout` elapses
    ///
    /// Re-checks the store at the configured poll interval plus a little
    /// jitter. A timeout leaves the request pending; a late answer is
    /// still picked up by the next wait.
    pub async fn await_answer(&self, id: &str, timeout: Duration) -> Result<String, AskError> {
        if !is_valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()).into());
        }

        let deadline = Instant::now() + timeout;
        let interval = self.config.answer_poll_interval();

        loop {
            match self.store.get(id) {
                None => return Err(StoreError::NotFound(id.to_string()).into()),
                Some(request) if !request.is_pending() => {
                    debug!(id, "Answer picked up");
                    return Ok(request.answer.unwrap_or_default());
                }
                Some(_) => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AskError::Timeout(timeout));
            }

            let jitter = Duration::from_millis(rand::random_range(0..150));
            sleep((interval + jitter).min(remaining)).await;
        }
    }

    /// Record the answer for a pending request
    pub fn submit_answer(&self, id: &str, text: &str) -> Result<(), AskError> {
        if !is_valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()).into());
        }
        if text.trim().is_empty() {
            return Err(AskError::Validation("answer is required".to_string()));
        }
        check_len("answer", text, MAX_ANSWER_LEN)?;

        self.store.answer(id, text)?;
        info!(id, "Answer submitted");
        Ok(())
    }

    /// Snapshot of a single request
    pub fn get_status(&self, id: &str) -> Result<Request, AskError> {
        if !is_valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()).into());
        }
        self.store
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()).into())
    }

    /// All pending requests, oldest first
    pub fn list_pending(&self) -> Vec<Request> {
        self.store.list_pending()
    }

    /// Pending requests as display entries, oldest first
    pub fn list_status(&self) -> Vec<StatusEntry> {
        let now = Instant::now();
        self.store
            .list_pending()
            .into_iter()
            .map(|request| StatusEntry {
                agent: request.agent,
                task: request.task,
                question: request.question,
                elapsed_secs: now.saturating_duration_since(request.created_at).as_secs(),
            })
            .collect()
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), AskError> {
    if value.chars().count() > max {
        return Err(AskError::Validation(format!("{field} too long (max {max} chars)")));
    }
    Ok(())
}

fn check_opt_len(field: &str, value: Option<&str>, max: usize) -> Result<(), AskError> {
    match value {
        Some(value) => check_len(field, value, max),
        None => Ok(()),
    }
}
