//! Rate-limit table

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Quota state reported by the most recent response for an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimitState {
    /// Total quota for the current window
    pub limit: u64,

    /// Requests left in the current window
    pub remaining: u64,

    /// When the window rolls over
    pub reset_at: DateTime<Utc>,
}

/// Answer to "may a request for this endpoint go out now?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// No known reason to hold the request back
    Available,

    /// Quota used up; the window resets after `reset_in`
    Exhausted { reset_in: Duration },
}

impl Exhaustion {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Exhaustion::Exhausted { .. })
    }
}

/// Per-endpoint rate-limit records, keyed by endpoint
///
/// Records are created on the first successfully parsed response for an
/// endpoint and then overwritten by every later one. They are never removed.
#[derive(Debug, Default)]
pub struct RateLimitTable {
    endpoints: HashMap<String, EndpointLimitState>,
}

impl RateLimitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest state for an endpoint, replacing any previous record
    pub fn record(&mut self, endpoint: &str, state: EndpointLimitState) {
        debug!(%endpoint, ?state, "record: called");
        self.endpoints.insert(endpoint.to_string(), state);
    }

    /// Get the stored state for an endpoint
    pub fn get(&self, endpoint: &str) -> Option<&EndpointLimitState> {
        self.endpoints.get(endpoint)
    }

    /// Check whether an endpoint is exhausted at `now`
    ///
    /// A record whose reset time has already passed is healed in place to at
    /// least one remaining request, so an endpoint that went quiet after being
    /// exhausted can never stay blocked forever.
    pub fn is_exhausted(&mut self, endpoint: &str, now: DateTime<Utc>) -> Exhaustion {
        let Some(state) = self.endpoints.get_mut(endpoint) else {
            return Exhaustion::Available;
        };

        let reset_in = state.reset_at - now;
        if reset_in < chrono::Duration::zero() {
            state.remaining = state.remaining.max(1);
        }

        if state.remaining == 0 {
            // reset_in is non-negative here, so the conversion cannot fail
            let reset_in = reset_in.to_std().unwrap_or_default();
            debug!(%endpoint, ?reset_in, "is_exhausted: exhausted");
            Exhaustion::Exhausted { reset_in }
        } else {
            Exhaustion::Available
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
