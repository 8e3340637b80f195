//! Per-endpoint rate-limit state
//!
//! The table remembers the quota each endpoint reported in its most recent
//! response and answers whether the endpoint is currently exhausted.

mod parse;
mod table;

pub use parse::{RateLimitParseError, parse_limits};
pub use table::{EndpointLimitState, Exhaustion, RateLimitTable};
