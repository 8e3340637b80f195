//! Scheduler implementation

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tracing::{debug, info};

use super::dispatch::{Dispatched, Dispatcher};
use super::handle::SchedulerHandle;
use super::messages::{SchedulerRequest, SchedulerState, SchedulerStats, SchedulerStatus};
use super::queue::{Outcome, QueueEntry, RequestQueue};
use crate::config::SchedulerConfig;
use crate::limits::{Exhaustion, RateLimitTable};
use crate::transport::Transport;

/// What woke the actor
enum Event {
    Request(SchedulerRequest),
    Dispatched(Dispatched),
    Wake,
    Closed,
}

/// The Scheduler owns the queue, the rate-limit table, the single in-flight
/// request and the single wake timer, and runs as one task
///
/// Each pass scans the queue front to back and dispatches the first request
/// whose endpoint is not exhausted. When every queued endpoint is exhausted a
/// timer is armed for the earliest reset instead.
pub struct Scheduler {
    config: SchedulerConfig,
    rx: mpsc::UnboundedReceiver<SchedulerRequest>,
    queue: RequestQueue,
    table: RateLimitTable,
    dispatcher: Dispatcher,
    state: SchedulerState,
    in_flight: Option<BoxFuture<'static, Dispatched>>,
    wake: Option<Pin<Box<Sleep>>>,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Create a new scheduler and the handle used to talk to it
    ///
    /// The scheduler does nothing until [`Scheduler::run`] is awaited.
    pub fn new(config: SchedulerConfig, transport: Arc<dyn Transport>) -> (Self, SchedulerHandle) {
        debug!(?config, "Scheduler::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(transport, config.headers.clone());

        let scheduler = Self {
            config,
            rx,
            queue: RequestQueue::new(),
            table: RateLimitTable::new(),
            dispatcher,
            state: SchedulerState::Idle,
            in_flight: None,
            wake: None,
            stats: SchedulerStats::default(),
        };
        (scheduler, SchedulerHandle::new(tx))
    }

    /// Create a scheduler and spawn it onto the current tokio runtime
    pub fn spawn(config: SchedulerConfig, transport: Arc<dyn Transport>) -> (SchedulerHandle, JoinHandle<()>) {
        let (scheduler, handle) = Self::new(config, transport);
        let task = tokio::spawn(scheduler.run());
        (handle, task)
    }

    /// Run the Scheduler task
    ///
    /// Runs until shutdown is requested or every handle is dropped. The
    /// in-flight request, if any, is allowed to finish; requests still queued
    /// are completed with [`Outcome::abandoned`].
    pub async fn run(mut self) {
        info!(request_delay_ms = self.config.request_delay_ms, "Scheduler started");

        loop {
            let event = tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => Event::Request(request),
                    None => Event::Closed,
                },
                dispatched = next_dispatched(&mut self.in_flight) => Event::Dispatched(dispatched),
                () = next_wake(&mut self.wake) => Event::Wake,
            };

            match event {
                Event::Request(SchedulerRequest::Submit(entry)) => self.enqueue(entry),
                Event::Request(SchedulerRequest::Status { reply }) => {
                    let _ = reply.send(self.status());
                }
                Event::Request(SchedulerRequest::Limits { endpoint, reply }) => {
                    let _ = reply.send(self.table.get(&endpoint).cloned());
                }
                Event::Request(SchedulerRequest::Shutdown) => {
                    info!("Scheduler shutdown requested");
                    break;
                }
                Event::Closed => {
                    debug!("run: all handles dropped");
                    break;
                }
                Event::Dispatched(dispatched) => {
                    self.in_flight = None;
                    self.settle(dispatched);
                    // Throttle below the API's own limit before looking at the queue again
                    self.arm_wake(self.config.request_delay());
                }
                Event::Wake => {
                    self.wake = None;
                    self.run_pass();
                }
            }
        }

        self.stop().await;
        info!(stats = ?self.stats, "Scheduler stopped");
    }

    fn enqueue(&mut self, entry: QueueEntry) {
        debug!(id = %entry.id, endpoint = %entry.endpoint, state = %self.state, "enqueue: called");
        self.queue.enqueue(entry);
        self.stats.total_submitted += 1;
        self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(self.queue.len());

        match self.state {
            // A waiting scheduler rescans so a request for a free endpoint is not
            // held behind the reset timer of an exhausted one
            SchedulerState::Idle | SchedulerState::Waiting => self.run_pass(),
            SchedulerState::Running => debug!("enqueue: pass in progress, entry picked up later"),
        }
    }

    /// One scan-and-dispatch pass over the queue
    fn run_pass(&mut self) {
        debug!(queued = self.queue.len(), "run_pass: called");
        debug_assert!(self.in_flight.is_none(), "pass started with a request in flight");
        self.wake = None;

        let now = Utc::now();
        let mut earliest_reset: Option<Duration> = None;
        let mut index = 0;

        while let Some(entry) = self.queue.get(index) {
            match self.table.is_exhausted(&entry.endpoint, now) {
                Exhaustion::Available => {
                    if let Some(entry) = self.queue.remove(index) {
                        self.start_dispatch(entry);
                        return;
                    }
                }
                Exhaustion::Exhausted { reset_in } => {
                    debug!(id = %entry.id, endpoint = %entry.endpoint, ?reset_in, "run_pass: endpoint exhausted, skipping");
                    earliest_reset = Some(earliest_reset.map_or(reset_in, |earliest| earliest.min(reset_in)));
                    index += 1;
                }
            }
        }

        match earliest_reset {
            Some(reset_in) => {
                info!(queued = self.queue.len(), ?reset_in, "All queued endpoints exhausted, waiting for reset");
                self.stats.total_deferred_passes += 1;
                self.state = SchedulerState::Waiting;
                self.arm_wake(reset_in);
            }
            None => {
                debug!("run_pass: queue empty, going idle");
                self.state = SchedulerState::Idle;
            }
        }
    }

    fn start_dispatch(&mut self, entry: QueueEntry) {
        info!(id = %entry.id, method = %entry.method, endpoint = %entry.endpoint, "Dispatching request");
        self.stats.total_dispatched += 1;
        self.stats.total_wait_time_ms += entry.submitted_at.elapsed().as_millis() as u64;
        self.state = SchedulerState::Running;
        self.in_flight = Some(self.dispatcher.dispatch(entry));
    }

    fn settle(&mut self, dispatched: Dispatched) {
        let report = self.dispatcher.settle(dispatched, &mut self.table);
        if report.transport_failed {
            self.stats.total_transport_errors += 1;
        }
        if report.parse_failed {
            self.stats.total_parse_failures += 1;
        }
    }

    /// Arm the single wake timer, replacing (and so cancelling) any armed one
    fn arm_wake(&mut self, after: Duration) {
        debug!(?after, "arm_wake: called");
        self.wake = Some(Box::pin(tokio::time::sleep(after)));
    }

    fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state,
            queued: self.queue.len(),
            in_flight: self.in_flight.is_some(),
            next_wake: self
                .wake
                .as_ref()
                .map(|sleep| sleep.deadline().saturating_duration_since(Instant::now())),
            stats: self.stats.clone(),
        }
    }

    async fn stop(&mut self) {
        debug!(queued = self.queue.len(), in_flight = self.in_flight.is_some(), "stop: called");
        self.wake = None;

        if let Some(in_flight) = self.in_flight.take() {
            let dispatched = in_flight.await;
            self.settle(dispatched);
        }

        // Refuse new submissions, then abandon everything already accepted
        self.rx.close();
        while let Ok(request) = self.rx.try_recv() {
            match request {
                SchedulerRequest::Submit(entry) => self.queue.enqueue(entry),
                SchedulerRequest::Status { reply } => {
                    let _ = reply.send(self.status());
                }
                SchedulerRequest::Limits { endpoint, reply } => {
                    let _ = reply.send(self.table.get(&endpoint).cloned());
                }
                SchedulerRequest::Shutdown => {}
            }
        }

        let abandoned: Vec<QueueEntry> = self.queue.drain().collect();
        for entry in abandoned {
            debug!(id = %entry.id, endpoint = %entry.endpoint, "stop: abandoning queued request");
            self.stats.total_abandoned += 1;
            entry.complete(Outcome::abandoned());
        }
        self.state = SchedulerState::Idle;
    }
}

async fn next_dispatched(in_flight: &mut Option<BoxFuture<'static, Dispatched>>) -> Dispatched {
    match in_flight {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_wake(wake: &mut Option<Pin<Box<Sleep>>>) {
    match wake {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::queue::Completion;
    use crate::transport::mock::{MockTransport, limited_reply};
    use crate::transport::{Method, TransportReply};
    use serde_json::json;

    fn config(request_delay_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            request_delay_ms,
            ..Default::default()
        }
    }

    fn plenty(_: usize, _: &str) -> TransportReply {
        limited_reply(15, 14, Utc::now() + chrono::Duration::minutes(15), json!({"ok": true}))
    }

    #[tokio::test]
    async fn test_idle_after_draining() {
        let transport = Arc::new(MockTransport::new(plenty));
        let (handle, _task) = Scheduler::spawn(config(1), transport.clone());

        let outcome = handle.read("help/privacy", None).unwrap().await.unwrap();
        assert!(outcome.is_success());

        // Wait out the post-request delay
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, SchedulerState::Idle);
        assert_eq!(status.queued, 0);
        assert!(!status.in_flight);
        assert!(status.next_wake.is_none());
        assert_eq!(status.stats.total_dispatched, 1);
    }

    #[tokio::test]
    async fn test_running_while_in_flight() {
        let transport = Arc::new(MockTransport::new(plenty).with_latency(Duration::from_millis(200)));
        let (handle, _task) = Scheduler::spawn(config(1), transport.clone());

        let first = handle.read("a", None).unwrap();
        let _second = handle.read("b", None).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, SchedulerState::Running);
        assert!(status.in_flight);
        assert_eq!(status.queued, 1);

        first.await.unwrap();
    }

    #[tokio::test]
    async fn test_waiting_arms_timer_for_earliest_reset() {
        let transport = Arc::new(MockTransport::new(|index, endpoint| {
            let reset_in = match endpoint {
                "slow" => chrono::Duration::seconds(60),
                _ => chrono::Duration::seconds(30),
            };
            let remaining = if index < 2 { 0 } else { 10 };
            limited_reply(15, remaining, Utc::now() + reset_in, json!({}))
        }));
        let (handle, _task) = Scheduler::spawn(config(1), transport.clone());

        // Exhaust both endpoints
        handle.read("slow", None).unwrap().await.unwrap();
        handle.read("fast", None).unwrap().await.unwrap();

        let _a = handle.read("slow", None).unwrap();
        let _b = handle.read("fast", None).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, SchedulerState::Waiting);
        assert_eq!(status.queued, 2);
        let next_wake = status.next_wake.unwrap();
        assert!(next_wake <= Duration::from_secs(30));
        assert!(next_wake > Duration::from_secs(25));
        assert!(status.stats.total_deferred_passes >= 1);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_waiting_scheduler_dispatches_new_free_endpoint() {
        let transport = Arc::new(MockTransport::new(|index, _| {
            let remaining = if index == 0 { 0 } else { 10 };
            limited_reply(15, remaining, Utc::now() + chrono::Duration::seconds(60), json!({}))
        }));
        let (handle, _task) = Scheduler::spawn(config(1), transport.clone());

        handle.read("search/tweets", None).unwrap().await.unwrap();
        let _blocked = handle.read("search/tweets", None).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.status().await.unwrap().state, SchedulerState::Waiting);

        let outcome = handle.read("help/privacy", None).unwrap().await.unwrap();
        assert!(outcome.is_success());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, SchedulerState::Waiting);
        assert_eq!(status.queued, 1);
    }

    #[tokio::test]
    async fn test_request_delay_spaces_dispatches() {
        let transport = Arc::new(MockTransport::new(plenty));
        let (handle, _task) = Scheduler::spawn(config(100), transport.clone());

        let first = handle.read("a", None).unwrap();
        let second = handle.read("b", None).unwrap();
        first.await.unwrap();
        second.await.unwrap();

        let calls = transport.calls();
        let gap = calls[1].at - calls[0].at;
        assert!(gap >= chrono::Duration::milliseconds(95), "gap was {gap}");
    }

    #[tokio::test]
    async fn test_single_flight_across_endpoints() {
        let transport = Arc::new(MockTransport::new(plenty).with_latency(Duration::from_millis(20)));
        let (handle, _task) = Scheduler::spawn(config(1), transport.clone());

        let mut params = crate::transport::Params::new();
        params.insert("id".to_string(), 42i64.into());
        let pending = vec![
            handle.read("statuses/show", Some(params.clone())).unwrap(),
            handle.write("statuses/update", None).unwrap(),
            handle.read("help/privacy", None).unwrap(),
        ];
        for p in pending {
            assert!(p.await.unwrap().is_success());
        }

        assert_eq!(transport.max_in_flight(), 1);
        let calls = transport.calls();
        let methods: Vec<_> = calls.iter().map(|c| c.method).collect();
        assert_eq!(methods, vec![Method::Read, Method::Write, Method::Read]);
        assert_eq!(calls[0].params, Some(params));
        assert!(calls[1].params.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_abandons_queue_after_in_flight() {
        let transport = Arc::new(MockTransport::new(plenty).with_latency(Duration::from_millis(100)));
        let (handle, task) = Scheduler::spawn(config(1), transport.clone());

        let in_flight = handle.read("a", None).unwrap();
        let queued = handle.read("b", None).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown().unwrap();

        assert!(in_flight.await.unwrap().is_success());
        let abandoned = queued.await.unwrap();
        assert!(matches!(
            abandoned.transport_error,
            Some(crate::transport::TransportError::Abandoned)
        ));
        task.await.unwrap();
        assert_eq!(transport.call_count(), 1);
        assert!(matches!(
            handle.read("c", None),
            Err(crate::scheduler::SubmitError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_scheduler() {
        let transport = Arc::new(MockTransport::new(plenty));
        let (handle, task) = Scheduler::spawn(config(1), transport);

        drop(handle);
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_callback_completion_runs_on_scheduler() {
        let transport = Arc::new(MockTransport::new(plenty));
        let (handle, _task) = Scheduler::spawn(config(1), transport);
        let (tx, rx) = tokio::sync::oneshot::channel();

        handle
            .submit(
                Method::Write,
                "statuses/update",
                None,
                Completion::callback(move |outcome| {
                    let _ = tx.send(outcome.is_success());
                }),
            )
            .unwrap();

        assert!(rx.await.unwrap());
    }
}
