//! Core RequestStore implementation

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier for a request (12 lowercase hex chars)
pub type RequestId = String;

/// Length of request identifiers
pub const ID_LEN: usize = 12;

/// Errors from store operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Request not found: {0}")]
    NotFound(String),

    #[error("Request already answered: {0}")]
    AlreadyAnswered(String),

    #[error("Pending request limit reached: {0}")]
    AtCapacity(usize),
}

/// What a request is asking for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Free-form question expecting a text answer
    #[default]
    Question,
    /// Approval request for a specific command
    Permission,
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "question" => Ok(RequestKind::Question),
            "permission" => Ok(RequestKind::Permission),
            other => Err(format!("unknown request type: {other}")),
        }
    }
}

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Answered,
}

/// A single question/answer exchange
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique request ID
    pub id: RequestId,
    /// Question or permission kind
    pub kind: RequestKind,
    /// The question text
    pub question: String,
    /// Optional free-form context
    pub context: Option<String>,
    /// Name of the submitting agent
    pub agent: Option<String>,
    /// Task the agent is working on
    pub task: Option<String>,
    /// Command awaiting approval (permission requests only)
    pub command: Option<String>,
    /// Current lifecycle state
    pub status: RequestStatus,
    /// Answer text, set exactly once
    pub answer: Option<String>,
    /// Monotonic creation time, drives ordering
    pub created_at: Instant,
    /// Wall-clock creation time for the wire
    pub created_at_utc: DateTime<Utc>,
    /// Monotonic answer time, drives eviction
    pub answered_at: Option<Instant>,
}

impl Request {
    /// Create a pending question with a fresh random ID
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: new_request_id(),
            kind: RequestKind::Question,
            question: question.into(),
            context: None,
            agent: None,
            task: None,
            command: None,
            status: RequestStatus::Pending,
            answer: None,
            created_at: Instant::now(),
            created_at_utc: Utc::now(),
            answered_at: None,
        }
    }

    /// Whether this request is still awaiting an answer
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// Generate a fresh request ID: first 12 hex chars of a UUIDv4
pub fn new_request_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..ID_LEN].to_string()
}

/// Check an externally supplied ID before it reaches the store
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// In-memory store of requests, shared across server tasks
pub struct RequestStore {
    /// All live requests keyed by ID
    requests: Mutex<HashMap<RequestId, Request>>,
    /// Maximum number of pending requests held at once
    capacity: usize,
}

impl RequestStore {
    /// Create an empty store holding at most `capacity` pending requests
    pub fn new(capacity: usize) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    // Recover from a poisoned lock; operations never leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Request>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a request, rejecting it when the pending limit is reached
    pub fn insert(&self, request: Request) -> Result<(), StoreError> {
        let mut requests = self.lock();
        if request.is_pending() {
            let pending = requests.values().filter(|r| r.is_pending()).count();
            if pending >= self.capacity {
                return Err(StoreError::AtCapacity(self.capacity));
            }
        }
        debug!(id = %request.id, "Storing request");
        requests.insert(request.id.clone(), request);
        Ok(())
    }

    /// Fetch a snapshot of a request by ID
    pub fn get(&self, id: &str) -> Option<Request> {
        self.lock().get(id).cloned()
    }

    /// All pending requests, oldest first
    pub fn list_pending(&self) -> Vec<Request> {
        let requests = self.lock();
        let mut pending: Vec<Request> = requests.values().filter(|r| r.is_pending()).cloned().collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    /// Record the answer for a pending request
    pub fn answer(&self, id: &str, text: impl Into<String>) -> Result<(), StoreError> {
        let mut requests = self.lock();
        let request = requests.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if request.status == RequestStatus::Answered {
            return Err(StoreError::AlreadyAnswered(id.to_string()));
        }
        request.answer = Some(text.into());
        request.answered_at = Some(Instant::now());
        request.status = RequestStatus::Answered;
        debug!(id, "Request answered");
        Ok(())
    }

    /// Drop answered requests whose answer is older than `retention`.
    ///
    /// Pending requests are never touched. Returns the number evicted.
    /// `now` is passed in so sweeps can be driven by a forged clock in tests.
    pub fn evict_older_than(&self, retention: Duration, now: Instant) -> usize {
        let mut requests = self.lock();
        let before = requests.len();
        requests.retain(|_, r| match r.answered_at {
            Some(answered_at) => now.saturating_duration_since(answered_at) < retention,
            None => true,
        });
        let evicted = before - requests.len();
        if evicted > 0 {
            debug!(evicted, "Evicted stale answered requests");
        }
        evicted
    }

    /// Whether no requests remain at all, answered or pending
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of requests currently awaiting an answer
    pub fn pending_count(&self) -> usize {
        self.lock().values().filter(|r| r.is_pending()).count()
    }

    /// Total number of requests held, including answered ones
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let store = RequestStore::new(10);
        let request = Request::new("Which database should I use?");
        let id = request.id.clone();
        store.insert(request).unwrap();

        let found = store.get(&id).unwrap();
        assert_eq!(found.question, "Which database should I use?");
        assert_eq!(found.status, RequestStatus::Pending);
        assert!(found.answer.is_none());
        assert!(found.answered_at.is_none());
    }

    #[test]
    fn test_get_unknown_is_none() {
        let store = RequestStore::new(10);
        assert!(store.get("ffffffffffff").is_none());
    }

    #[test]
    fn test_capacity_rejects_pending() {
        let store = RequestStore::new(2);
        store.insert(Request::new("one")).unwrap();
        store.insert(Request::new("two")).unwrap();

        let err = store.insert(Request::new("three")).unwrap_err();
        assert_eq!(err, StoreError::AtCapacity(2));
        assert_eq!(store.pending_count(), 2);
    }

    #[test]
    fn test_answered_do_not_count_toward_capacity() {
        let store = RequestStore::new(2);
        let first = Request::new("one");
        let first_id = first.id.clone();
        store.insert(first).unwrap();
        store.insert(Request::new("two")).unwrap();
        store.answer(&first_id, "done").unwrap();

        store.insert(Request::new("three")).unwrap();
        assert_eq!(store.pending_count(), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_answer_sets_fields() {
        let store = RequestStore::new(10);
        let request = Request::new("Which database should I use?");
        let id = request.id.clone();
        store.insert(request).unwrap();

        store.answer(&id, "Postgres").unwrap();

        let found = store.get(&id).unwrap();
        assert_eq!(found.status, RequestStatus::Answered);
        assert_eq!(found.answer.as_deref(), Some("Postgres"));
        assert!(found.answered_at.is_some());
    }

    #[test]
    fn test_answer_unknown_not_found() {
        let store = RequestStore::new(10);
        let err = store.answer("abcdefabcdef", "nope").unwrap_err();
        assert_eq!(err, StoreError::NotFound("abcdefabcdef".to_string()));
    }

    #[test]
    fn test_answer_twice_already_answered() {
        let store = RequestStore::new(10);
        let request = Request::new("q");
        let id = request.id.clone();
        store.insert(request).unwrap();

        store.answer(&id, "first").unwrap();
        let err = store.answer(&id, "second").unwrap_err();
        assert_eq!(err, StoreError::AlreadyAnswered(id.clone()));

        // First answer survives
        assert_eq!(store.get(&id).unwrap().answer.as_deref(), Some("first"));
    }

    #[test]
    fn test_list_pending_oldest_first() {
        let store = RequestStore::new(10);
        let base = Instant::now();

        // Forge distinct creation times, insert out of order
        let mut ids = Vec::new();
        for offset_ms in [20u64, 0, 10] {
            let mut request = Request::new(format!("q-{offset_ms}"));
            request.created_at = base + Duration::from_millis(offset_ms);
            ids.push((offset_ms, request.id.clone()));
            store.insert(request).unwrap();
        }
        ids.sort_by_key(|(offset_ms, _)| *offset_ms);

        let pending = store.list_pending();
        let got: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
        let want: Vec<&str> = ids.iter().map(|(_, id)| id.as_str()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_list_pending_excludes_answered() {
        let store = RequestStore::new(10);
        let answered = Request::new("answered");
        let answered_id = answered.id.clone();
        store.insert(answered).unwrap();
        store.insert(Request::new("still pending")).unwrap();
        store.answer(&answered_id, "yes").unwrap();

        let pending = store.list_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].question, "still pending");
    }

    #[test]
    fn test_evict_only_stale_answered() {
        let store = RequestStore::new(10);
        let base = Instant::now();
        let retention = Duration::from_secs(300);

        let mut stale = Request::new("stale");
        let stale_id = stale.id.clone();
        stale.status = RequestStatus::Answered;
        stale.answer = Some("old".to_string());
        stale.answered_at = Some(base);
        store.insert(stale).unwrap();

        let mut fresh = Request::new("fresh");
        let fresh_id = fresh.id.clone();
        fresh.status = RequestStatus::Answered;
        fresh.answer = Some("new".to_string());
        fresh.answered_at = Some(base + Duration::from_secs(350));
        store.insert(fresh).unwrap();

        let pending = Request::new("pending");
        let pending_id = pending.id.clone();
        store.insert(pending).unwrap();

        // 400s past base: stale is over the 300s window, fresh is 50s in
        let evicted = store.evict_older_than(retention, base + Duration::from_secs(400));
        assert_eq!(evicted, 1);
        assert!(store.get(&stale_id).is_none());
        assert!(store.get(&fresh_id).is_some());
        assert!(store.get(&pending_id).is_some());
    }

    #[test]
    fn test_evict_is_idempotent() {
        let store = RequestStore::new(10);
        let base = Instant::now();

        let mut request = Request::new("q");
        request.status = RequestStatus::Answered;
        request.answer = Some("a".to_string());
        request.answered_at = Some(base);
        store.insert(request).unwrap();

        let now = base + Duration::from_secs(600);
        assert_eq!(store.evict_older_than(Duration::from_secs(300), now), 1);
        assert_eq!(store.evict_older_than(Duration::from_secs(300), now), 0);
    }

    #[test]
    fn test_is_empty_counts_answered() {
        let store = RequestStore::new(10);
        assert!(store.is_empty());

        let request = Request::new("q");
        let id = request.id.clone();
        store.insert(request).unwrap();
        assert!(!store.is_empty());

        // An answered request still keeps the store non-empty
        store.answer(&id, "a").unwrap();
        assert!(!store.is_empty());

        store.evict_older_than(Duration::ZERO, Instant::now() + Duration::from_secs(1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        let store = RequestStore::new(10);

        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for _ in 0..8 {
                handles.push(scope.spawn(|| {
                    let mut rejected = 0;
                    for _ in 0..5 {
                        if store.insert(Request::new("q")).is_err() {
                            rejected += 1;
                        }
                    }
                    rejected
                }));
            }
            let rejected: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
            assert_eq!(rejected, 30);
        });

        assert_eq!(store.pending_count(), 10);
    }

    #[test]
    fn test_id_shape_and_uniqueness() {
        let ids: std::collections::HashSet<String> = (0..200).map(|_| new_request_id()).collect();
        assert_eq!(ids.len(), 200);
        for id in &ids {
            assert!(is_valid_id(id), "bad id: {id}");
        }

        assert!(!is_valid_id("short"));
        assert!(!is_valid_id("ABCDEFABCDEF"));
        assert!(!is_valid_id("abcdefabcde!"));
        assert!(!is_valid_id("abcdefabcdef0"));
        assert!(!is_valid_id("../etc/passwd"));
    }
}
