//! Ping Protocol
//!
//! `GET {server}/ping` answers with a JSON object whose `result` field tells us
//! whether we are online and checked in (`"ok"`), reachable but not checked in
//! (`"failure"`), or something else that we treat as offline.
//!
//! The HTTP transport sits behind the [`Transport`] trait so the supervisor can
//! be driven by a fake in tests.

use crate::{ProtocolError, Result, RESULT_FAILURE, RESULT_OK};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default TCP connect timeout for the HTTP transport
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default whole-request timeout for the HTTP transport
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal HTTP operations used by the protocol
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url` and return the response body
    async fn get(&self, url: &str) -> Result<String>;

    /// Post a JSON body to `url` and return the response body
    async fn post_json(&self, url: &str, body: &Value) -> Result<String>;
}

/// [`Transport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with explicit timeouts
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        if !status.is_success() {
            return Err(ProtocolError::Communication(format!(
                "{} returned {}",
                response.url(),
                status
            )));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        Self::read_body(response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<String> {
        let response = self.client.post(url).json(body).send().await?;
        Self::read_body(response).await
    }
}

/// Classified answer to a ping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingResult {
    /// Online and checked in
    Ok,
    /// Reachable but our checkin is not current
    Failure,
    /// Any other `result` value, or none at all
    Unrecognized(Option<String>),
}

impl PingResult {
    /// Classify a ping response body
    ///
    /// Fails with [`ProtocolError::ProtocolParse`] when the body is not a JSON
    /// object.
    pub fn classify(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| ProtocolError::ProtocolParse(format!("{}: {:?}", e, body)))?;
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::ProtocolParse(format!("expected object: {:?}", body)))?;

        Ok(Self::from_result(object.get("result").and_then(Value::as_str)))
    }

    /// Classify the value of a `result` field
    pub fn from_result(result: Option<&str>) -> Self {
        match result {
            Some(RESULT_OK) => PingResult::Ok,
            Some(RESULT_FAILURE) => PingResult::Failure,
            other => PingResult::Unrecognized(other.map(str::to_string)),
        }
    }
}

/// Issues pings against the service
#[derive(Clone)]
pub struct PingClient<T: Transport> {
    transport: T,
}

impl<T: Transport> PingClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// URL of the ping endpoint for a server base URL
    pub fn ping_url(server_url: &str) -> String {
        format!("{}/ping", server_url.trim_end_matches('/'))
    }

    /// Ping the service at `server_url` and classify the answer
    pub async fn ping(&self, server_url: &str) -> Result<PingResult> {
        let url = Self::ping_url(server_url);
        let body = self.transport.get(&url).await?;
        debug!("Parsing ping response {:?}", body);
        PingResult::classify(&body)
    }
}
