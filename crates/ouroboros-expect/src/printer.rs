//! Diagnostic observers of the round trip

use crate::transport::{OutgoingRequest, RawResponse};
use std::time::Duration;

/// Sees the final outgoing request and the raw result; never mutates either.
pub trait Printer: Send + Sync {
    fn request(&self, request: &OutgoingRequest);
    fn response(&self, response: &RawResponse, elapsed: Duration);
}

/// Logs each exchange through `tracing` at debug level.
///
/// With `bodies` enabled, UTF-8 bodies up to `max_body_len` bytes are included.
#[derive(Debug, Clone, Copy)]
pub struct TracingPrinter {
    pub bodies: bool,
    pub max_body_len: usize,
}

impl Default for TracingPrinter {
    fn default() -> Self {
        Self {
            bodies: false,
            max_body_len: 4096,
        }
    }
}

impl TracingPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bodies(mut self, max_body_len: usize) -> Self {
        self.bodies = true;
        self.max_body_len = max_body_len;
        self
    }

    fn preview(&self, bytes: &[u8]) -> Option<String> {
        if !self.bodies {
            return None;
        }
        let end = bytes.len().min(self.max_body_len);
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

impl Printer for TracingPrinter {
    fn request(&self, request: &OutgoingRequest) {
        let body = request.body.bytes().and_then(|b| self.preview(b));
        tracing::debug!(
            method = %request.method,
            url = request.url_str(),
            version = ?request.version,
            headers = ?request.headers,
            content_length = ?request.content_length(),
            body = body.as_deref().unwrap_or(""),
            "sending request"
        );
    }

    fn response(&self, response: &RawResponse, elapsed: Duration) {
        let body = self.preview(response.body());
        tracing::debug!(
            status = response.status().as_u16(),
            headers = ?response.headers(),
            elapsed_ms = elapsed.as_millis() as u64,
            body = body.as_deref().unwrap_or(""),
            "received response"
        );
    }
}
