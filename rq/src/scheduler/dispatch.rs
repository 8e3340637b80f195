//! Dispatcher - runs one request through the transport

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error, warn};

use super::queue::{Outcome, QueueEntry};
use crate::config::LimitHeaders;
use crate::limits::{RateLimitTable, parse_limits};
use crate::transport::{Transport, TransportError, TransportReply};

/// A request whose transport call has finished but whose completion has not fired yet
#[derive(Debug)]
pub struct Dispatched {
    pub entry: QueueEntry,
    pub reply: TransportReply,
}

/// What settling a request did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleReport {
    pub transport_failed: bool,
    pub parse_failed: bool,
}

/// Executes requests against the transport and folds their rate-limit
/// metadata back into the table
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    headers: LimitHeaders,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, headers: LimitHeaders) -> Self {
        Self { transport, headers }
    }

    /// Start the transport call for an entry
    ///
    /// The returned future always resolves; failures travel inside the reply.
    /// A panicking transport is reported as a failed call.
    pub fn dispatch(&self, entry: QueueEntry) -> BoxFuture<'static, Dispatched> {
        debug!(id = %entry.id, method = %entry.method, endpoint = %entry.endpoint, "dispatch: called");
        let transport = Arc::clone(&self.transport);
        async move {
            let call = transport.call(entry.method, &entry.endpoint, entry.params.as_ref());
            let reply = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(reply) => reply,
                Err(_) => {
                    error!(id = %entry.id, endpoint = %entry.endpoint, "Transport panicked");
                    TransportReply::failed(TransportError::Other("transport panicked".to_string()), None)
                }
            };
            Dispatched { entry, reply }
        }
        .boxed()
    }

    /// Record the reply's rate-limit metadata, then fire the entry's completion
    ///
    /// The table is updated only when the metadata parses; otherwise the
    /// endpoint's previous state is left untouched and the parse error is
    /// reported next to any transport error.
    pub fn settle(&self, dispatched: Dispatched, table: &mut RateLimitTable) -> SettleReport {
        let Dispatched { entry, reply } = dispatched;
        let TransportReply {
            error: transport_error,
            result,
            response,
        } = reply;

        if let Some(e) = &transport_error {
            warn!(id = %entry.id, endpoint = %entry.endpoint, error = %e, "Transport error");
        }

        let parse_error = match parse_limits(response.as_ref(), &self.headers) {
            Ok(state) => {
                table.record(&entry.endpoint, state);
                None
            }
            Err(e) => {
                warn!(id = %entry.id, endpoint = %entry.endpoint, error = %e, "Could not read rate-limit headers");
                Some(e)
            }
        };

        let report = SettleReport {
            transport_failed: transport_error.is_some(),
            parse_failed: parse_error.is_some(),
        };

        entry.complete(Outcome {
            transport_error,
            parse_error,
            result,
            response,
        });

        report
    }
}
