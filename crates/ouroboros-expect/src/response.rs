//! Response produced by a round trip

use crate::chain::Chain;
use crate::error::{HttpError, HttpResult, RequestError};
use crate::transport::RawResponse;
use crate::websocket::Websocket;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use std::time::Duration;

/// Result of [`Request::expect`](crate::Request::expect).
///
/// When the request chain failed before or during transmission this is an
/// empty placeholder: status 0, no headers, no body, and [`Response::failure`]
/// returns the first failure.
#[derive(Debug)]
pub struct Response {
    status_code: u16,
    headers: HeaderMap,
    body: Bytes,
    version: Version,
    url: String,
    latency: Option<Duration>,
    websocket: Option<Websocket>,
    chain: Chain,
}

impl Response {
    pub(crate) fn from_raw(
        raw: RawResponse,
        url: String,
        latency: Duration,
        websocket: Option<Websocket>,
        chain: Chain,
    ) -> Self {
        let (parts, body) = raw.into_parts();
        Self {
            status_code: parts.status.as_u16(),
            headers: parts.headers,
            body,
            version: parts.version,
            url,
            latency: Some(latency),
            websocket,
            chain,
        }
    }

    pub(crate) fn placeholder(chain: Chain) -> Self {
        Self {
            status_code: 0,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            version: Version::HTTP_11,
            url: String::new(),
            latency: None,
            websocket: None,
            chain,
        }
    }

    /// HTTP status code, 0 for the failure placeholder
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status_code).ok()
    }

    /// Check if status is success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Check if status is client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    /// Check if status is server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get content type
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Get body as text (UTF-8)
    pub fn text(&self) -> HttpResult<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| HttpError::ResponseError(format!("Invalid UTF-8 in response: {}", e)))
    }

    /// Get body as JSON
    pub fn json(&self) -> HttpResult<serde_json::Value> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::Json(format!("Failed to parse JSON: {}", e)))
    }

    /// Get body as JSON and deserialize to type
    pub fn json_as<T: serde::de::DeserializeOwned>(&self) -> HttpResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::Json(format!("Failed to deserialize JSON: {}", e)))
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Final request URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Round-trip time of the transmit phase, `None` if nothing was sent
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    /// Connection handle of a successful WebSocket upgrade
    pub fn websocket(&mut self) -> Option<&mut Websocket> {
        self.websocket.as_mut()
    }

    pub fn into_websocket(self) -> Option<Websocket> {
        self.websocket
    }

    pub fn is_failed(&self) -> bool {
        self.chain.failed()
    }

    /// First failure recorded while building or sending the request
    pub fn failure(&self) -> Option<&RequestError> {
        self.chain.failure()
    }

    pub fn failure_message(&self) -> Option<String> {
        self.chain.message()
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }
}
