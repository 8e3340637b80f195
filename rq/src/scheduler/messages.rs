//! Scheduler messages
//!
//! Requests and replies for the actor pattern.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use super::queue::{InvalidRequestError, QueueEntry};
use crate::limits::EndpointLimitState;

/// Errors returned synchronously to a submitting caller
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] InvalidRequestError),

    #[error("Scheduler is not running")]
    Closed,
}

/// Requests sent to the Scheduler actor
#[derive(Debug)]
pub enum SchedulerRequest {
    Submit(QueueEntry),
    Status {
        reply: oneshot::Sender<SchedulerStatus>,
    },
    Limits {
        endpoint: String,
        reply: oneshot::Sender<Option<EndpointLimitState>>,
    },
    Shutdown,
}

/// Externally visible scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Nothing queued, nothing in flight, no timer armed
    Idle,

    /// A request is in flight or the post-request delay is running
    Running,

    /// Every queued request targets an exhausted endpoint; a reset timer is armed
    Waiting,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
        }
    }
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub total_dispatched: u64,
    pub total_deferred_passes: u64,
    pub total_transport_errors: u64,
    pub total_parse_failures: u64,
    pub total_abandoned: u64,
    pub total_wait_time_ms: u64,
    pub peak_queue_depth: usize,
}

/// Snapshot of the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub queued: usize,
    pub in_flight: bool,
    /// Time until the armed timer fires, if one is armed
    pub next_wake: Option<Duration>,
    pub stats: SchedulerStats,
}
