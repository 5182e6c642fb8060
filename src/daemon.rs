//! Server process bootstrap
//!
//! The asking side needs a server listening before it can submit, so this
//! module provides the "start one if nothing answers" precondition. There
//! are no PID files: whether something accepts connections on the port is
//! the only state consulted.

use std::process::{Command, Stdio};
use std::time::Duration;

use eyre::{Context, Result};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Current version from git describe (set at compile time)
pub const VERSION: &str = env!("GIT_DESCRIBE");

/// How long a single connection probe may take
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Probe attempts while waiting for a spawned server to come up
const READINESS_ATTEMPTS: u32 = 50;

/// Pause between readiness probes
const READINESS_INTERVAL: Duration = Duration::from_millis(100);

/// Ensures a server process is listening on a local port
#[derive(Debug, Clone)]
pub struct ServerBootstrap {
    port: u16,
}

impl ServerBootstrap {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether something is accepting connections on the port
    pub async fn is_listening(&self) -> bool {
        let result = matches!(
            timeout(PROBE_TIMEOUT, TcpStream::connect(("127.0.0.1", self.port))).await,
            Ok(Ok(_))
        );
        debug!(port = self.port, result, "Probed for a listening server");
        result
    }

    /// Make sure a server is running, spawning one detached if needed
    ///
    /// Returns true when a new process was spawned. A spawned server that
    /// never comes up is reported but not fatal; the next protocol call
    /// surfaces the real error.
    pub async fn ensure_running(&self) -> Result<bool> {
        if self.is_listening().await {
            debug!(port = self.port, "Server already listening");
            return Ok(false);
        }

        self.spawn_detached()?;
        self.wait_ready().await;
        Ok(true)
    }

    /// Spawn the hidden server subcommand as a detached background process
    ///
    /// The child gets its own process group (or detached console) so it
    /// outlives the invoking shell.
    pub fn spawn_detached(&self) -> Result<u32> {
        let exe = std::env::current_exe().context("Failed to get current executable")?;
        debug!(?exe, port = self.port, "Spawning server process");

        let mut command = Command::new(&exe);
        command
            .args(["run-server", "--port", &self.port.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            command.creation_flags(CREATE_NO_WINDOW | DETACHED_PROCESS);
        }

        let child = command.spawn().context("Failed to spawn server process")?;
        let pid = child.id();
        info!(pid, port = self.port, "Spawned detached server");
        Ok(pid)
    }

    /// Poll until a spawned server accepts connections
    ///
    /// Returns false if it never comes up within the probe window.
    pub async fn wait_ready(&self) -> bool {
        for attempt in 0..READINESS_ATTEMPTS {
            if self.is_listening().await {
                debug!(port = self.port, attempt, "Server is up");
                return true;
            }
            sleep(READINESS_INTERVAL).await;
        }

        warn!(port = self.port, "Server did not come up within the probe window");
        eprintln!("askdaemon: warning: server may not have started");
        false
    }
}
