//! HTTP protocol surface
//!
//! Thin wire layer over the Coordinator. Handlers translate between JSON
//! bodies and domain calls; every failure comes back as `{"error": "..."}`
//! with the matching status code.

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::coordinator::{AskError, NewQuestion};
use super::{AppState, ShutdownReason};
use crate::store::{Request, RequestKind, RequestStatus, StoreError};

/// Body of `POST /requests`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Defaulted so a missing question fails validation, not deserialization
    #[serde(default)]
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// A successful `POST /requests` response
#[derive(Debug, Serialize, Deserialize)]
pub struct Created {
    pub id: String,
}

/// One entry in the `GET /requests` listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: String,
    pub agent: Option<String>,
    pub task: Option<String>,
    pub question: String,
    pub request_type: RequestKind,
    pub command: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Request> for PendingEntry {
    fn from(request: Request) -> Self {
        Self {
            id: request.id,
            agent: request.agent,
            task: request.task,
            question: request.question,
            request_type: request.kind,
            command: request.command,
            created_at: request.created_at_utc,
        }
    }
}

/// `GET /requests/{id}` response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    /// Seconds to hold the request open waiting for an answer
    pub wait: Option<u64>,
}

/// Body of `POST /requests/{id}/answer`
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerBody {
    pub answer: String,
}

/// Acknowledgement payload for health, answer, and shutdown
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

/// Error payload for every non-2xx response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type Rejection = (StatusCode, Json<ErrorBody>);

fn reject(error: &AskError) -> Rejection {
    let status = match error {
        AskError::Validation(_) => StatusCode::BAD_REQUEST,
        AskError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        AskError::Store(StoreError::AlreadyAnswered(_)) => StatusCode::CONFLICT,
        AskError::Store(StoreError::AtCapacity(_)) => StatusCode::TOO_MANY_REQUESTS,
        AskError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
    };
    (status, Json(ErrorBody { error: error.to_string() }))
}

fn bad_request(message: impl Into<String>) -> Rejection {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message.into() }))
}

/// Router serving the full protocol
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/requests", post(create_request).get(list_pending))
        .route("/requests/{id}", get(request_status))
        .route("/requests/{id}/answer", post(submit_answer))
        .route("/health", get(health))
        .route("/shutdown", post(shutdown))
        .layer(DefaultBodyLimit::max(crate::MAX_REQUEST_BODY))
        .with_state(state)
}

async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequest>,
) -> Result<(StatusCode, Json<Created>), Rejection> {
    if state.shutting_down.load(Ordering::SeqCst) {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "server is shutting down".to_string(),
            }),
        ));
    }

    let kind = match body.request_type.as_deref() {
        None => RequestKind::default(),
        Some(raw) => raw.parse().map_err(bad_request)?,
    };
    let input = NewQuestion {
        question: body.question,
        context: body.context,
        agent: body.agent,
        task: body.task,
        kind,
        command: body.command,
    };

    let id = state
        .coordinator
        .submit_question(input)
        .await
        .map_err(|error| reject(&error))?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

async fn list_pending(State(state): State<AppState>) -> Json<Vec<PendingEntry>> {
    let entries = state
        .coordinator
        .list_pending()
        .into_iter()
        .map(PendingEntry::from)
        .collect();
    Json(entries)
}

async fn request_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StatusParams>,
) -> Result<Json<StatusBody>, Rejection> {
    if let Some(wait_secs) = params.wait {
        let wait = Duration::from_secs(wait_secs).min(state.config.max_wait());
        match state.coordinator.await_answer(&id, wait).await {
            Ok(answer) => {
                return Ok(Json(StatusBody {
                    status: RequestStatus::Answered,
                    answer: Some(answer),
                }));
            }
            // Still pending after the wait, fall through to the snapshot
            Err(AskError::Timeout(_)) => {}
            Err(error) => return Err(reject(&error)),
        }
    }

    let request = state.coordinator.get_status(&id).map_err(|error| reject(&error))?;
    Ok(Json(StatusBody {
        status: request.status,
        answer: request.answer,
    }))
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<Ack>, Rejection> {
    state
        .coordinator
        .submit_answer(&id, &body.answer)
        .map_err(|error| reject(&error))?;
    Ok(Json(Ack {
        status: "ok".to_string(),
    }))
}

async fn health() -> Json<Ack> {
    Json(Ack {
        status: "ok".to_string(),
    })
}

async fn shutdown(State(state): State<AppState>) -> Json<Ack> {
    info!("Shutdown requested over the protocol");
    state.shutting_down.store(true, Ordering::SeqCst);
    // A full channel means shutdown is already underway
    let _ = state.shutdown_tx.try_send(ShutdownReason::Requested);
    Json(Ack {
        status: "shutting-down".to_string(),
    })
}
