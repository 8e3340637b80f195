//! HTTP transport over reqwest
//!
//! Reads become GET requests with parameters in the query string, writes
//! become POST requests with a form-encoded body. Any response that arrives
//! is handed back whole, so rate-limit headers are visible even on errors.

use async_trait::async_trait;
use eyre::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use super::{Method, Params, RawResponse, Transport, TransportError, TransportReply};
use crate::config::HttpConfig;

/// Transport for a JSON REST API with bearer-token authentication
pub struct HttpTransport {
    base_url: String,
    endpoint_suffix: String,
    bearer_token: Option<String>,
    http: Client,
}

impl HttpTransport {
    /// Create a new transport from configuration
    ///
    /// Reads the bearer token from the environment variable named in config.
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        debug!(?config, "from_config: called");
        let token = config.get_bearer_token()?;
        Self::with_token(config, Some(token))
    }

    /// Create a new transport with an explicit token (or none)
    pub fn with_token(config: &HttpConfig, bearer_token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoint_suffix: config.endpoint_suffix.clone(),
            bearer_token,
            http,
        })
    }

    /// Build the full URL for an endpoint
    pub fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}{}",
            self.base_url,
            endpoint.trim_start_matches('/'),
            self.endpoint_suffix
        )
    }

    fn build_request(&self, method: Method, endpoint: &str, params: Option<&Params>) -> RequestBuilder {
        let url = self.url(endpoint);
        debug!(%method, %url, "build_request: called");

        let mut request = match method {
            Method::Read => self.http.get(url),
            Method::Write => self.http.post(url),
        };

        if let Some(params) = params {
            let pairs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.to_string())).collect();
            request = match method {
                Method::Read => request.query(&pairs),
                Method::Write => request.form(&pairs),
            };
        }

        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        request
    }

    async fn send(&self, method: Method, endpoint: &str, params: Option<&Params>) -> TransportReply {
        let response = match self.build_request(method, endpoint, params).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(%endpoint, error = %e, "send: network error");
                return TransportReply::failed(TransportError::Network(e), None);
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(%endpoint, error = %e, "send: failed reading body");
                let raw = RawResponse {
                    status: status.as_u16(),
                    headers,
                    body: String::new(),
                };
                return TransportReply::failed(TransportError::Network(e), Some(raw));
            }
        };
        let raw = RawResponse {
            status: status.as_u16(),
            headers,
            body,
        };

        if !status.is_success() {
            debug!(%endpoint, status = raw.status, "send: API error");
            return TransportReply {
                error: Some(TransportError::Api {
                    status: raw.status,
                    message: raw.body.clone(),
                }),
                result: serde_json::from_str(&raw.body).ok(),
                response: Some(raw),
            };
        }

        match serde_json::from_str::<Value>(&raw.body) {
            Ok(result) => {
                debug!(%endpoint, "send: success");
                TransportReply::ok(result, raw)
            }
            Err(e) => {
                debug!(%endpoint, error = %e, "send: body is not JSON");
                TransportReply::failed(TransportError::InvalidBody(e), Some(raw))
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn read(&self, endpoint: &str, params: Option<&Params>) -> TransportReply {
        self.send(Method::Read, endpoint, params).await
    }

    async fn write(&self, endpoint: &str, params: Option<&Params>) -> TransportReply {
        self.send(Method::Write, endpoint, params).await
    }
}
