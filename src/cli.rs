//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Askdaemon - ask a human, get an answer
#[derive(Parser)]
#[command(
    name = "ad",
    about = "Rendezvous server for agent questions awaiting human answers",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/askdaemon/logs/askdaemon.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Ask a question and block until it is answered
    Ask {
        /// The question to ask
        question: String,

        /// Additional context shown alongside the question
        #[arg(short, long)]
        context: Option<String>,

        /// Name of the asking agent
        #[arg(short, long)]
        agent: Option<String>,

        /// What the agent is working on
        #[arg(short, long)]
        task: Option<String>,

        /// Command awaiting approval (makes this a permission request)
        #[arg(long)]
        command: Option<String>,

        /// Seconds to wait for an answer
        #[arg(long)]
        timeout: Option<u64>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show pending requests
    Status {
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Answer a pending request
    Answer {
        /// Request ID
        id: String,

        /// Answer text
        text: String,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start the server in the background
    Serve {
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Don't detach (run in foreground)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop a running server
    Stop {
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Internal: Run the server in this process (used by `serve`)
    #[command(hide = true)]
    RunServer {
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Output format for the status command
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
