//! Rate-limit metadata extraction

use chrono::DateTime;
use thiserror::Error;
use tracing::debug;

use super::EndpointLimitState;
use crate::config::LimitHeaders;
use crate::transport::RawResponse;

/// Rate-limit metadata could not be read from a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitParseError {
    #[error("No response to read rate-limit headers from")]
    MissingResponse,

    #[error("Missing rate-limit header: {0}")]
    MissingHeader(String),

    #[error("Rate-limit header {header} is not a number: {value:?}")]
    NotNumeric { header: String, value: String },

    #[error("Rate-limit reset is not a valid timestamp: {0:?}")]
    InvalidReset(String),
}

fn header<'a>(response: &'a RawResponse, name: &str) -> Result<&'a str, RateLimitParseError> {
    response
        .header(name)
        .map(str::trim)
        .ok_or_else(|| RateLimitParseError::MissingHeader(name.to_string()))
}

fn count(response: &RawResponse, name: &str) -> Result<u64, RateLimitParseError> {
    let value = header(response, name)?;
    value.parse::<u64>().map_err(|_| RateLimitParseError::NotNumeric {
        header: name.to_string(),
        value: value.to_string(),
    })
}

/// Extract `{limit, remaining, reset_at}` from a response's headers
///
/// The reset header holds seconds since the Unix epoch; fractional seconds
/// are honoured to the millisecond.
pub fn parse_limits(
    response: Option<&RawResponse>,
    headers: &LimitHeaders,
) -> Result<EndpointLimitState, RateLimitParseError> {
    let response = response.ok_or(RateLimitParseError::MissingResponse)?;

    let limit = count(response, &headers.limit)?;
    let remaining = count(response, &headers.remaining)?;

    let raw_reset = header(response, &headers.reset)?;
    let reset_secs = raw_reset.parse::<f64>().map_err(|_| RateLimitParseError::NotNumeric {
        header: headers.reset.clone(),
        value: raw_reset.to_string(),
    })?;
    if !reset_secs.is_finite() || reset_secs < 0.0 {
        return Err(RateLimitParseError::InvalidReset(raw_reset.to_string()));
    }
    let reset_at = DateTime::from_timestamp_millis((reset_secs * 1000.0).round() as i64)
        .ok_or_else(|| RateLimitParseError::InvalidReset(raw_reset.to_string()))?;

    debug!(limit, remaining, %reset_at, "parse_limits: parsed");
    Ok(EndpointLimitState {
        limit,
        remaining,
        reset_at,
    })
}
