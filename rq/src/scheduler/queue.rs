//! Queue types for the scheduler

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error};
use uuid::Uuid;

use crate::limits::RateLimitParseError;
use crate::transport::{Method, Params, RawResponse, TransportError};

/// A submission was malformed and never entered the queue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRequestError {
    #[error("Endpoint must be a non-empty string")]
    EmptyEndpoint,
}

/// Check a submission before it is accepted
pub fn validate(endpoint: &str) -> Result<(), InvalidRequestError> {
    if endpoint.trim().is_empty() {
        return Err(InvalidRequestError::EmptyEndpoint);
    }
    Ok(())
}

/// Identifier assigned to every accepted request (time-ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a request's completion receives
///
/// `transport_error` and `parse_error` are independent: a failed call can
/// still carry readable rate-limit headers, and a successful call can carry
/// unreadable ones. When both are set the caller can tell "the call failed"
/// apart from "quota can no longer be tracked".
#[derive(Debug, Default)]
pub struct Outcome {
    pub transport_error: Option<TransportError>,
    pub parse_error: Option<RateLimitParseError>,
    pub result: Option<Value>,
    pub response: Option<RawResponse>,
}

impl Outcome {
    /// Outcome for a request that was still queued when the scheduler stopped
    pub fn abandoned() -> Self {
        Self {
            transport_error: Some(TransportError::Abandoned),
            ..Default::default()
        }
    }

    /// No transport error and readable rate-limit metadata
    pub fn is_success(&self) -> bool {
        self.transport_error.is_none() && self.parse_error.is_none()
    }
}

enum CompletionKind {
    Callback(Box<dyn FnOnce(Outcome) + Send>),
    Channel(oneshot::Sender<Outcome>),
}

/// Single-shot completion for a request
///
/// Consumed when invoked, so it can fire at most once; the scheduler
/// guarantees it fires for every accepted request.
pub struct Completion(CompletionKind);

impl Completion {
    /// Complete by calling `f` on the scheduler task
    ///
    /// Callbacks should be quick; the scheduler is blocked while one runs.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        Self(CompletionKind::Callback(Box::new(f)))
    }

    /// Complete by sending on a oneshot channel
    pub fn channel() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Self(CompletionKind::Channel(tx)), rx)
    }

    pub(crate) fn complete(self, outcome: Outcome) {
        match self.0 {
            CompletionKind::Callback(f) => {
                // A panicking callback must not take the scheduler down with it
                if panic::catch_unwind(AssertUnwindSafe(|| f(outcome))).is_err() {
                    error!("Completion callback panicked");
                }
            }
            CompletionKind::Channel(tx) => {
                if tx.send(outcome).is_err() {
                    debug!("complete: receiver dropped");
                }
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            CompletionKind::Callback(_) => f.write_str("Completion::Callback"),
            CompletionKind::Channel(_) => f.write_str("Completion::Channel"),
        }
    }
}

/// One pending operation
#[derive(Debug)]
pub struct QueueEntry {
    pub id: EntryId,
    pub method: Method,
    pub endpoint: String,
    pub params: Option<Params>,
    pub completion: Completion,
    pub submitted_at: Instant,
}

impl QueueEntry {
    /// Create a validated entry
    pub fn new(
        method: Method,
        endpoint: impl Into<String>,
        params: Option<Params>,
        completion: Completion,
    ) -> Result<Self, InvalidRequestError> {
        let endpoint = endpoint.into();
        validate(&endpoint)?;

        Ok(Self {
            id: EntryId::new(),
            method,
            endpoint,
            params,
            completion,
            submitted_at: Instant::now(),
        })
    }

    /// Fire the completion, consuming the entry
    pub(crate) fn complete(self, outcome: Outcome) {
        debug!(id = %self.id, endpoint = %self.endpoint, success = outcome.is_success(), "complete: called");
        self.completion.complete(outcome);
    }
}

/// Pending operations in submission order
///
/// Entries are appended at the tail and may be removed from any position.
#[derive(Debug, Default)]
pub struct RequestQueue {
    entries: VecDeque<QueueEntry>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry at the tail
    pub fn enqueue(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    /// Get the entry at a position
    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    /// Remove and return the entry at a position, keeping the order of the rest
    pub fn remove(&mut self, index: usize) -> Option<QueueEntry> {
        self.entries.remove(index)
    }

    /// Remove every entry, in order
    pub fn drain(&mut self) -> impl Iterator<Item = QueueEntry> + '_ {
        self.entries.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(endpoint: &str) -> QueueEntry {
        QueueEntry::new(Method::Read, endpoint, None, Completion::callback(|_| {})).unwrap()
    }

    #[test]
    fn test_validate() {
        assert!(validate("help/privacy").is_ok());
        assert_eq!(validate(""), Err(InvalidRequestError::EmptyEndpoint));
        assert_eq!(validate("   "), Err(InvalidRequestError::EmptyEndpoint));
    }

    #[test]
    fn test_entry_rejects_empty_endpoint() {
        let result = QueueEntry::new(Method::Write, "", None, Completion::callback(|_| {}));
        assert_eq!(result.unwrap_err(), InvalidRequestError::EmptyEndpoint);
    }

    #[test]
    fn test_entry_ids_are_unique() {
        let first = entry("a");
        let second = entry("a");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_remove_from_middle_keeps_order() {
        let mut queue = RequestQueue::new();
        for endpoint in ["a", "b", "c", "d"] {
            queue.enqueue(entry(endpoint));
        }

        let removed = queue.remove(1).unwrap();
        assert_eq!(removed.endpoint, "b");

        let rest: Vec<_> = queue.iter().map(|e| e.endpoint.as_str()).collect();
        assert_eq!(rest, vec!["a", "c", "d"]);
        assert!(queue.remove(10).is_none());
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = RequestQueue::new();
        queue.enqueue(entry("a"));
        queue.enqueue(entry("b"));

        let drained: Vec<_> = queue.drain().map(|e| e.endpoint).collect();
        assert_eq!(drained, vec!["a", "b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_callback_completion_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let entry = QueueEntry::new(
            Method::Read,
            "help/privacy",
            None,
            Completion::callback(move |outcome| {
                assert!(outcome.is_success());
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        entry.complete(Outcome::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let entry = QueueEntry::new(
            Method::Read,
            "help/privacy",
            None,
            Completion::callback(|_| panic!("caller bug")),
        )
        .unwrap();

        entry.complete(Outcome::default());
    }

    #[tokio::test]
    async fn test_channel_completion() {
        let (completion, rx) = Completion::channel();
        let entry = QueueEntry::new(Method::Read, "help/privacy", None, completion).unwrap();

        entry.complete(Outcome::abandoned());

        let outcome = rx.await.unwrap();
        assert!(matches!(outcome.transport_error, Some(TransportError::Abandoned)));
        assert!(!outcome.is_success());
    }
}
