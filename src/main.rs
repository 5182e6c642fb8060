//! Askdaemon - rendezvous server for agent questions awaiting human answers
//!
//! CLI entry point for asking, answering, and running the server.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use eyre::{Context, Result};
use tokio::time::sleep;
use tracing::{info, warn};

use askdaemon::cli::{Cli, Command, OutputFormat};
use askdaemon::client::AskClient;
use askdaemon::config::Config;
use askdaemon::daemon::ServerBootstrap;
use askdaemon::server;
use askdaemon::server::routes::{CreateRequest, PendingEntry};
use askdaemon::store::RequestStatus;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("askdaemon")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("askdaemon.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    // Dispatch command
    match cli.command {
        Some(Command::Ask {
            question,
            context,
            agent,
            task,
            command,
            timeout,
            port,
        }) => {
            // A command to approve makes this a permission request
            let request_type = command.is_some().then(|| "permission".to_string());
            let body = CreateRequest {
                question,
                context,
                agent,
                task,
                request_type,
                command,
            };
            cmd_ask(&config, body, timeout, port).await
        }
        Some(Command::Status { port, format }) => cmd_status(&config, port, format).await,
        Some(Command::Answer { id, text, port }) => cmd_answer(&config, &id, &text, port).await,
        Some(Command::Serve { port, foreground }) => cmd_serve(&config, port, foreground).await,
        Some(Command::Stop { port }) => cmd_stop(&config, port).await,
        Some(Command::RunServer { port }) => run_server(&config, port).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Submit a question and block until it is answered
///
/// The answer goes to stdout and nothing else does; progress chatter is
/// kept on stderr so callers can capture the answer cleanly.
async fn cmd_ask(config: &Config, body: CreateRequest, timeout: Option<u64>, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server.port);
    let timeout = timeout.map(Duration::from_secs).unwrap_or(config.ask.timeout());

    let bootstrap = ServerBootstrap::new(port);
    bootstrap.ensure_running().await?;

    let client = AskClient::new(port);
    let id = client.create(&body).await?;
    eprintln!("askdaemon: waiting for answer, respond at http://127.0.0.1:{port}/");

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let slice = config.ask.wait_slice().min(remaining);
        match client.status_wait(&id, slice).await {
            Ok(status) if status.status == RequestStatus::Answered => {
                println!("{}", status.answer.unwrap_or_default());
                return Ok(());
            }
            Ok(_) => {}
            Err(error) => {
                // Transient failures don't abort the wait; the deadline does
                warn!(id, error = %error, "Status poll failed, retrying");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    eprintln!("askdaemon: timed out waiting for answer");
    std::process::exit(1);
}

/// Show pending requests
async fn cmd_status(config: &Config, port: Option<u16>, format: OutputFormat) -> Result<()> {
    let port = port.unwrap_or(config.server.port);

    if !ServerBootstrap::new(port).is_listening().await {
        println!("No askdaemon server running.");
        return Ok(());
    }

    let pending = AskClient::new(port).pending().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        OutputFormat::Text => {
            if pending.is_empty() {
                println!("No pending requests.");
            } else {
                println!("Pending requests:");
                let now = Utc::now();
                for entry in &pending {
                    println!("{}", render_pending(entry, now));
                }
            }
        }
    }

    Ok(())
}

/// One status line: "  [agent] (12s ago) question"
fn render_pending(entry: &PendingEntry, now: DateTime<Utc>) -> String {
    let agent = entry.agent.as_deref().unwrap_or("unknown");
    let elapsed = (now - entry.created_at).num_seconds().max(0);
    format!("  [{}] ({}s ago) {}", agent, elapsed, entry.question)
}

/// Record an answer for a pending request
async fn cmd_answer(config: &Config, id: &str, text: &str, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server.port);

    AskClient::new(port).answer(id, text).await?;
    println!("Answer recorded for {}", id);
    Ok(())
}

/// Start the server, detached unless asked otherwise
async fn cmd_serve(config: &Config, port: Option<u16>, foreground: bool) -> Result<()> {
    let port = port.unwrap_or(config.server.port);
    let bootstrap = ServerBootstrap::new(port);

    if bootstrap.is_listening().await {
        println!("askdaemon server already running on port {}", port);
        return Ok(());
    }

    if foreground {
        println!("Starting askdaemon server on port {}...", port);
        run_server(config, Some(port)).await
    } else {
        let pid = bootstrap.spawn_detached()?;
        if bootstrap.wait_ready().await {
            println!("askdaemon server started on port {} (PID: {})", port, pid);
        }
        Ok(())
    }
}

/// Stop a running server
async fn cmd_stop(config: &Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server.port);

    if !ServerBootstrap::new(port).is_listening().await {
        println!("No askdaemon server running.");
        return Ok(());
    }

    AskClient::new(port).shutdown().await?;
    println!("askdaemon server on port {} stopping", port);
    Ok(())
}

/// Run the server in this process (internal command)
async fn run_server(config: &Config, port: Option<u16>) -> Result<()> {
    let mut config = config.clone();
    if let Some(port) = port {
        config.server.port = port;
    }
    server::run(&config).await
}
