//! Askdaemon - rendezvous server for agent questions awaiting human answers
//!
//! Automated agents hit questions only a human can answer: "which database?",
//! "may I run this migration?". Askdaemon gives them somewhere to put the
//! question and block. `ad ask` lands the question in a short-lived localhost
//! server, the operator is notified, and the agent's call returns once
//! `ad answer` (or any protocol client) supplies the answer.
//!
//! # Core Concepts
//!
//! - **Rendezvous, not queue**: Both sides meet on one pending request; the
//!   answer is handed to exactly the caller that asked
//! - **Server on demand**: The first `ad ask` spawns the server; it shuts
//!   itself down once it has been empty for the idle timeout
//! - **Everything in memory**: Requests never touch disk and die with the
//!   process
//! - **Localhost only**: The server binds 127.0.0.1 and trusts its callers
//!
//! # Modules
//!
//! - [`store`] - In-memory request store and lifecycle types
//! - [`server`] - HTTP surface, coordinator, and idle watchdog
//! - [`client`] - Protocol client used by the CLI
//! - [`daemon`] - Port probing and detached server spawning
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod notify;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use client::AskClient;
pub use config::{AskConfig, Config, NotifyConfig, ServerConfig};
pub use daemon::ServerBootstrap;
pub use notify::{NotifyError, Notifier};
pub use server::{AskError, Coordinator, NewQuestion, ShutdownReason, StatusEntry, SweepOutcome, Watchdog};
pub use store::{Request, RequestId, RequestKind, RequestStatus, RequestStore, StoreError};

/// Largest accepted request body, in bytes
pub const MAX_REQUEST_BODY: usize = 64 * 1024;

/// Longest accepted question, in chars
pub const MAX_QUESTION_LEN: usize = 2000;

/// Longest accepted context, in chars
pub const MAX_CONTEXT_LEN: usize = 5000;

/// Longest accepted agent name, in chars
pub const MAX_AGENT_LEN: usize = 100;

/// Longest accepted task description, in chars
pub const MAX_TASK_LEN: usize = 200;

/// Longest accepted command, in chars
pub const MAX_COMMAND_LEN: usize = 2000;

/// Longest accepted answer, in chars
pub const MAX_ANSWER_LEN: usize = 10_000;
