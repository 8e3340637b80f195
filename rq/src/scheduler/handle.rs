//! SchedulerHandle - Client interface for submitting requests

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{SchedulerRequest, SchedulerStatus, SubmitError};
use super::queue::{Completion, EntryId, Outcome, QueueEntry};
use crate::limits::EndpointLimitState;
use crate::transport::{Method, Params};

/// Handle for submitting requests to a running Scheduler
///
/// Cloneable; the scheduler stops once every handle is dropped. Submission
/// is synchronous and returns as soon as the request is validated and queued.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerRequest>,
}

impl SchedulerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SchedulerRequest>) -> Self {
        Self { tx }
    }

    /// Queue a read operation
    pub fn submit_read(
        &self,
        endpoint: impl Into<String>,
        params: Option<Params>,
        completion: Completion,
    ) -> Result<EntryId, SubmitError> {
        self.submit(Method::Read, endpoint, params, completion)
    }

    /// Queue a write operation
    pub fn submit_write(
        &self,
        endpoint: impl Into<String>,
        params: Option<Params>,
        completion: Completion,
    ) -> Result<EntryId, SubmitError> {
        self.submit(Method::Write, endpoint, params, completion)
    }

    /// Queue an operation
    ///
    /// A malformed request fails here, synchronously, and is never queued.
    pub fn submit(
        &self,
        method: Method,
        endpoint: impl Into<String>,
        params: Option<Params>,
        completion: Completion,
    ) -> Result<EntryId, SubmitError> {
        let entry = QueueEntry::new(method, endpoint, params, completion)?;
        let id = entry.id;
        debug!(%id, %method, endpoint = %entry.endpoint, "submit: called");

        self.tx
            .send(SchedulerRequest::Submit(entry))
            .map_err(|_| SubmitError::Closed)?;
        Ok(id)
    }

    /// Queue a read operation and get a future for its outcome
    pub fn read(&self, endpoint: impl Into<String>, params: Option<Params>) -> Result<Pending, SubmitError> {
        self.pending(Method::Read, endpoint, params)
    }

    /// Queue a write operation and get a future for its outcome
    pub fn write(&self, endpoint: impl Into<String>, params: Option<Params>) -> Result<Pending, SubmitError> {
        self.pending(Method::Write, endpoint, params)
    }

    fn pending(&self, method: Method, endpoint: impl Into<String>, params: Option<Params>) -> Result<Pending, SubmitError> {
        let (completion, rx) = Completion::channel();
        let id = self.submit(method, endpoint, params, completion)?;
        Ok(Pending { id, rx })
    }

    /// Get a snapshot of the scheduler
    pub async fn status(&self) -> Result<SchedulerStatus, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SchedulerRequest::Status { reply })
            .map_err(|_| SubmitError::Closed)?;
        rx.await.map_err(|_| SubmitError::Closed)
    }

    /// Get the rate-limit state last recorded for an endpoint
    pub async fn limits(&self, endpoint: &str) -> Result<Option<EndpointLimitState>, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SchedulerRequest::Limits {
                endpoint: endpoint.to_string(),
                reply,
            })
            .map_err(|_| SubmitError::Closed)?;
        rx.await.map_err(|_| SubmitError::Closed)
    }

    /// Request shutdown of the Scheduler
    pub fn shutdown(&self) -> Result<(), SubmitError> {
        debug!("shutdown: called");
        self.tx
            .send(SchedulerRequest::Shutdown)
            .map_err(|_| SubmitError::Closed)
    }
}

/// Future for the outcome of a submitted request
#[derive(Debug)]
pub struct Pending {
    id: EntryId,
    rx: oneshot::Receiver<Outcome>,
}

impl Pending {
    pub fn id(&self) -> EntryId {
        self.id
    }
}

impl Future for Pending {
    type Output = Result<Outcome, SubmitError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.map_err(|_| SubmitError::Closed))
    }
}
