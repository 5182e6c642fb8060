//! HTTP client for the rendezvous protocol
//!
//! Used by the CLI side of `ad`: one client per invocation, talking to a
//! server on 127.0.0.1. Server-reported errors come back with the
//! `{"error": "..."}` message intact.

use std::time::Duration;

use eyre::{Context, Result, eyre};
use reqwest::StatusCode;
use tracing::debug;

use crate::server::routes::{Ack, AnswerBody, CreateRequest, Created, ErrorBody, PendingEntry, StatusBody};

/// Default timeout for instantaneous protocol calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for a rendezvous server on 127.0.0.1
#[derive(Debug, Clone)]
pub struct AskClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl AskClient {
    /// Create a client for the given local port
    pub fn new(port: u16) -> Self {
        Self::with_base_url(format!("http://127.0.0.1:{port}"))
    }

    /// Create a client against an explicit base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            http: reqwest::Client::new(),
        }
    }

    /// Set a custom timeout for instantaneous calls
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a new question, returning its ID
    pub async fn create(&self, body: &CreateRequest) -> Result<String> {
        debug!(url = %self.base_url, "Submitting request");
        let response = self
            .http
            .post(format!("{}/requests", self.base_url))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .context("Failed to reach server")?;
        let created: Created = expect_status(response, StatusCode::CREATED).await?;
        Ok(created.id)
    }

    /// All pending requests, oldest first
    pub async fn pending(&self) -> Result<Vec<PendingEntry>> {
        let response = self
            .http
            .get(format!("{}/requests", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach server")?;
        expect_status(response, StatusCode::OK).await
    }

    /// Current status of a request
    pub async fn status(&self, id: &str) -> Result<StatusBody> {
        let response = self
            .http
            .get(format!("{}/requests/{id}", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach server")?;
        expect_status(response, StatusCode::OK).await
    }

    /// Status of a request, long-polling the server for up to `wait`
    ///
    /// The HTTP timeout is stretched past `wait` so the server can hold the
    /// connection open for the whole slice.
    pub async fn status_wait(&self, id: &str, wait: Duration) -> Result<StatusBody> {
        let response = self
            .http
            .get(format!("{}/requests/{id}?wait={}", self.base_url, wait.as_secs()))
            .timeout(wait + self.timeout)
            .send()
            .await
            .context("Failed to reach server")?;
        expect_status(response, StatusCode::OK).await
    }

    /// Record an answer for a pending request
    pub async fn answer(&self, id: &str, text: &str) -> Result<()> {
        let body = AnswerBody {
            answer: text.to_string(),
        };
        let response = self
            .http
            .post(format!("{}/requests/{id}/answer", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("Failed to reach server")?;
        let _: Ack = expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    /// Check the server is alive
    pub async fn health(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach server")?;
        let _: Ack = expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    /// Ask the server to shut down gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/shutdown", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach server")?;
        let _: Ack = expect_status(response, StatusCode::OK).await?;
        Ok(())
    }
}

/// Decode the expected status, turning anything else into the server's
/// error message
async fn expect_status<T>(response: reqwest::Response, expected: StatusCode) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if status != expected {
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| "unrecognized response".to_string());
        return Err(eyre!("Server error ({status}): {message}"));
    }
    response.json::<T>().await.context("Failed to parse server response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_base_url() {
        let client = AskClient::new(9131);
        assert_eq!(client.base_url(), "http://127.0.0.1:9131");

        let client = AskClient::with_base_url("http://127.0.0.1:8000/");
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn test_client_with_timeout() {
        let client = AskClient::new(9131).with_timeout(Duration::from_secs(1));
        assert_eq!(client.timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_client_errors_when_nothing_listens() {
        // Port 1 is never bound on a dev box
        let client = AskClient::new(1).with_timeout(Duration::from_millis(200));
        let err = client.health().await.unwrap_err();
        assert!(err.to_string().contains("Failed to reach server"));
    }
}
