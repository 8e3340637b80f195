//! Transport module for RateQueue
//!
//! The scheduler never talks to the network itself; it is handed a
//! [`Transport`] and calls it for one request at a time.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod error;
pub mod http;
#[cfg(test)]
pub mod mock;

pub use error::TransportError;
pub use http::HttpTransport;

/// Kind of operation performed against an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Read,
    Write,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// A single request parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Request parameters, opaque to the scheduler
pub type Params = BTreeMap<String, Scalar>;

/// The raw response as received from the remote API
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    /// Get a header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Everything a transport call produced
///
/// An error, a decoded result and a raw response can all be present at once,
/// e.g. a 404 with a JSON error body and rate-limit headers.
#[derive(Debug, Default)]
pub struct TransportReply {
    pub error: Option<TransportError>,
    pub result: Option<Value>,
    pub response: Option<RawResponse>,
}

impl TransportReply {
    /// A successful call
    pub fn ok(result: Value, response: RawResponse) -> Self {
        Self {
            error: None,
            result: Some(result),
            response: Some(response),
        }
    }

    /// A failed call, with whatever response was received
    pub fn failed(error: TransportError, response: Option<RawResponse>) -> Self {
        Self {
            error: Some(error),
            result: None,
            response,
        }
    }
}

/// Capability for executing requests against the remote API
///
/// Implementations report every failure inside the returned [`TransportReply`];
/// a call always completes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a read operation
    async fn read(&self, endpoint: &str, params: Option<&Params>) -> TransportReply;

    /// Execute a write operation
    async fn write(&self, endpoint: &str, params: Option<&Params>) -> TransportReply;

    /// Execute an operation of the given kind
    async fn call(&self, method: Method, endpoint: &str, params: Option<&Params>) -> TransportReply {
        match method {
            Method::Read => self.read(endpoint, params).await,
            Method::Write => self.write(endpoint, params).await,
        }
    }
}
