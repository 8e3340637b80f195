//! RateQueue - FIFO request queue for rate-limited APIs
//!
//! RateQueue sits between callers and a remote API whose endpoints each carry
//! their own rate-limit window. Requests are executed one at a time in
//! submission order; a request whose endpoint is known to be exhausted is
//! held back (without blocking requests for other endpoints) and dispatched
//! automatically once that endpoint's window resets.
//!
//! # Core Concepts
//!
//! - **Single Flight**: At most one request is in flight at any instant
//! - **Header-Driven Limits**: Quota state comes from each response's rate-limit headers
//! - **Self-Healing**: A stale exhausted record whose reset time has passed is treated as available
//! - **Exactly-Once Completion**: Every accepted request gets exactly one [`Outcome`]
//!
//! # Modules
//!
//! - [`scheduler`] - Queue, dispatcher and the scheduling actor
//! - [`limits`] - Per-endpoint rate-limit table and header parsing
//! - [`transport`] - Transport trait and the reqwest-based HTTP implementation
//! - [`config`] - Configuration types and loading
//! - [`logging`] - Tracing subscriber setup

pub mod config;
pub mod limits;
pub mod logging;
pub mod scheduler;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, HttpConfig, LimitHeaders, SchedulerConfig};
pub use limits::{EndpointLimitState, Exhaustion, RateLimitParseError, RateLimitTable, parse_limits};
pub use scheduler::{
    Completion, EntryId, InvalidRequestError, Outcome, Pending, QueueEntry, RequestQueue, Scheduler, SchedulerHandle,
    SchedulerState, SchedulerStats, SchedulerStatus, SubmitError,
};
pub use transport::{HttpTransport, Method, Params, RawResponse, Scalar, Transport, TransportError, TransportReply};
