//! Native desktop notifications via per-platform commands

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{Notifier, NotifyError};

/// How long a notification command may run before being abandoned
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest notification body shown to the operator, in chars
const MAX_BODY_LEN: usize = 120;

/// Strip input to safe characters only before it reaches any shell.
///
/// Allows word chars, whitespace and minimal punctuation; blocks quoting,
/// substitution and redirection characters outright.
pub(crate) fn sanitize(s: &str) -> String {
    s.chars()
        .filter(|c| {
            c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '-' | '.' | ',' | '?' | ':' | '(' | ')')
        })
        .collect()
}

/// Clamp a notification body to something a toast can display
pub(crate) fn truncate_body(body: &str) -> String {
    if body.chars().count() > MAX_BODY_LEN {
        let head: String = body.chars().take(MAX_BODY_LEN - 3).collect();
        format!("{head}...")
    } else {
        body.to_string()
    }
}

/// Title line for a notification, tagged with the asking agent when known
pub(crate) fn notification_title(agent: Option<&str>) -> String {
    match agent {
        Some(agent) => format!("askdaemon: {}", sanitize(agent)),
        None => "askdaemon".to_string(),
    }
}

/// Last-resort delivery: print the question and respond-at URL to stderr
pub(crate) fn print_fallback(title: &str, body: &str, url: &str) {
    eprintln!("\n*** {title}: {body}");
    eprintln!("*** Respond at: {url}");
}

/// Notifier that only ever prints the fallback lines
pub struct StderrNotifier;

#[async_trait]
impl Notifier for StderrNotifier {
    async fn notify(&self, agent: Option<&str>, question: &str, url: &str) -> Result<(), NotifyError> {
        let title = notification_title(agent);
        let body = truncate_body(&sanitize(question));
        print_fallback(&title, &body, url);
        Ok(())
    }
}

/// Send native OS desktop notifications via subprocess calls
pub struct DesktopNotifier;

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, agent: Option<&str>, question: &str, url: &str) -> Result<(), NotifyError> {
        let title = notification_title(agent);
        let body = truncate_body(&sanitize(question));

        if let Err(error) = dispatch(&title, &body, url).await {
            debug!(error = %error, "Desktop notification failed, falling back to stderr");
            print_fallback(&title, &body, url);
        }
        Ok(())
    }
}

async fn dispatch(title: &str, body: &str, url: &str) -> Result<(), NotifyError> {
    match std::env::consts::OS {
        "linux" => notify_linux(title, body).await,
        "macos" => notify_macos(title, body).await,
        "windows" => notify_windows(title, body, url).await,
        _ => Err(NotifyError::Unsupported),
    }
}

async fn notify_linux(title: &str, body: &str) -> Result<(), NotifyError> {
    // List args only, nothing passes through a shell
    let mut command = Command::new("notify-send");
    command.args([title, body, "--app-name=askdaemon"]);
    run(command).await
}

async fn notify_macos(title: &str, body: &str) -> Result<(), NotifyError> {
    // Values travel via environment variables to keep them out of the script
    let script = r#"display notification (system attribute "ASKDAEMON_BODY") with title (system attribute "ASKDAEMON_TITLE")"#;
    let mut command = Command::new("osascript");
    command.args(["-e", script]);
    command.env("ASKDAEMON_TITLE", title);
    command.env("ASKDAEMON_BODY", body);
    run(command).await
}

async fn notify_windows(title: &str, body: &str, url: &str) -> Result<(), NotifyError> {
    let safe_title = xml_escape(title);
    let safe_body = xml_escape(body);
    let safe_url = xml_escape(url);

    let script = format!(
        r#"
[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null
[Windows.Data.Xml.Dom.XmlDocument, Windows.Data.Xml.Dom, ContentType = WindowsRuntime] | Out-Null

$template = @"
<toast activationType="protocol" launch="{safe_url}">
    <visual>
        <binding template="ToastGeneric">
            <text>{safe_title}</text>
            <text>{safe_body}</text>
        </binding>
    </visual>
    <audio silent="false"/>
</toast>
"@

$xml = New-Object Windows.Data.Xml.Dom.XmlDocument
$xml.LoadXml($template)
$toast = [Windows.UI.Notifications.ToastNotification]::new($xml)
$notifier = [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier("askdaemon")
$notifier.Show($toast)
"#
    );

    let mut command = Command::new("powershell");
    command.args(["-NoProfile", "-Command", &script]);
    run(command).await
}

async fn run(mut command: Command) -> Result<(), NotifyError> {
    let output = timeout(COMMAND_TIMEOUT, command.output())
        .await
        .map_err(|_| NotifyError::TimedOut)??;
    if !output.status.success() {
        debug!(status = ?output.status, "Notification command exited nonzero");
    }
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
