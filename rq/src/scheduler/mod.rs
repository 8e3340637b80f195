//! Scheduler for rate-limited requests
//!
//! Holds submitted requests in FIFO order and dispatches them one at a time,
//! skipping (but keeping) requests whose endpoint is exhausted and sleeping
//! until the earliest reset when nothing can go out.

mod core;
mod dispatch;
mod handle;
mod messages;
mod queue;

pub use self::core::Scheduler;
pub use dispatch::{Dispatched, Dispatcher, SettleReport};
pub use handle::{Pending, SchedulerHandle};
pub use messages::{SchedulerRequest, SchedulerState, SchedulerStats, SchedulerStatus, SubmitError};
pub use queue::{Completion, EntryId, InvalidRequestError, Outcome, QueueEntry, RequestQueue, validate};
