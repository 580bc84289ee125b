//! HTTP transport used by the fetch stage.
//!
//! Fetch workers only see the [`HttpTransport`] trait, so the retry and
//! cancellation logic can be exercised against scripted responses.

use crate::error::{FetchFailure, WordTallyError};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

/// Status and body of one completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Response body; only populated for 200 responses
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok<B: Into<Vec<u8>>>(body: B) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Issues a single GET request.
pub trait HttpTransport: Send + Sync + 'static {
    /// Fetch `url` once. Implementations enforce their own per-request
    /// timeout; retries are the caller's business.
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpResponse, FetchFailure>> + Send;
}

/// Production transport backed by a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self, WordTallyError> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(30))
            .user_agent(concat!("wordtally/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                WordTallyError::network_with_source("Failed to create HTTP client", e.to_string())
            })?;

        Ok(Self { http_client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchFailure> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::network(describe_request_error(&e)))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| FetchFailure::decode(e.to_string()))?;
                Ok(HttpResponse::ok(body.to_vec()))
            }
            code => Ok(HttpResponse::status(code.as_u16())),
        }
    }
}

fn describe_request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
