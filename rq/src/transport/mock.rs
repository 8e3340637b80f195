//! Mock transport for unit tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::debug;

use super::{Method, Params, RawResponse, Transport, TransportReply};

type Responder = Box<dyn Fn(usize, &str) -> TransportReply + Send + Sync>;

/// A call the mock received
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: Method,
    pub endpoint: String,
    pub params: Option<Params>,
    pub at: DateTime<Utc>,
}

/// Scripted transport: answers each call with `responder(call_index, endpoint)`
/// after an optional latency, tracking how many calls overlap
pub struct MockTransport {
    responder: Responder,
    latency: Duration,
    calls: Mutex<Vec<MockCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(usize, &str) -> TransportReply + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn handle(&self, method: Method, endpoint: &str, params: Option<&Params>) -> TransportReply {
        debug!(%method, %endpoint, "MockTransport::handle: called");
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(MockCall {
                method,
                endpoint: endpoint.to_string(),
                params: params.cloned(),
                at: Utc::now(),
            });
            calls.len() - 1
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = (self.responder)(index, endpoint);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read(&self, endpoint: &str, params: Option<&Params>) -> TransportReply {
        self.handle(Method::Read, endpoint, params).await
    }

    async fn write(&self, endpoint: &str, params: Option<&Params>) -> TransportReply {
        self.handle(Method::Write, endpoint, params).await
    }
}

/// A 200 reply carrying rate-limit headers
pub fn limited_reply(limit: u64, remaining: u64, reset_at: DateTime<Utc>, body: Value) -> TransportReply {
    let mut headers = HeaderMap::new();
    headers.insert("x-rate-limit-limit", limit.to_string().parse().unwrap());
    headers.insert("x-rate-limit-remaining", remaining.to_string().parse().unwrap());
    let reset = format!("{:.3}", reset_at.timestamp_millis() as f64 / 1000.0);
    headers.insert("x-rate-limit-reset", reset.parse().unwrap());

    TransportReply::ok(
        body.clone(),
        RawResponse {
            status: 200,
            headers,
            body: body.to_string(),
        },
    )
}
