//! Body and Content-Type ownership tracking
//!
//! Two slots, each remembering the label of the call that claimed it. A
//! competing claim is reported instead of silently overwriting the first one.

use crate::error::RequestError;
use bytes::Bytes;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";

/// Outgoing request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    /// Sent with a Content-Length
    Full(Bytes),
    /// Sent with chunked Transfer-Encoding, no Content-Length
    Chunked(Bytes),
}

impl Body {
    /// Content length announced for this body, `None` when chunked
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Full(bytes) => Some(bytes.len() as u64),
            Body::Chunked(_) => None,
        }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Empty => None,
            Body::Full(bytes) | Body::Chunked(bytes) => Some(bytes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().map_or(true, |b| b.is_empty())
    }
}

/// Whether a claim may replace an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Fails when another setter already holds the slot
    Exclusive,
    /// Finalization of a slot a previous call already claimed
    Finalize,
}

#[derive(Debug, Default)]
pub struct BodySlots {
    body: Body,
    body_setter: Option<&'static str>,
    content_type: Option<String>,
    type_setter: Option<&'static str>,
    forced: bool,
}

impl BodySlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Automatic content type inference from a typed body call.
    ///
    /// Skipped silently once the type was forced through a header call.
    pub fn set_type(
        &mut self,
        setter: &'static str,
        content_type: &str,
        claim: Claim,
    ) -> Result<(), RequestError> {
        if self.forced {
            tracing::debug!(setter, "content type forced, skipping inference");
            return Ok(());
        }
        if claim == Claim::Exclusive {
            if let Some(previous) = self.content_type.as_deref() {
                if !previous.is_empty() && previous != content_type {
                    return Err(RequestError::ContentTypeConflict {
                        previous: previous.to_string(),
                        previous_setter: self.type_setter.unwrap_or("with_header"),
                        wanted: content_type.to_string(),
                        wanted_setter: setter,
                    });
                }
            }
        }
        self.type_setter = Some(setter);
        self.content_type = Some(content_type.to_string());
        Ok(())
    }

    /// Explicit `Content-Type` header; always wins and disables inference.
    pub fn force_type(&mut self, content_type: &str) {
        self.forced = true;
        self.type_setter = Some("with_header");
        self.content_type = Some(content_type.to_string());
    }

    pub fn set_body(
        &mut self,
        setter: &'static str,
        body: Body,
        claim: Claim,
    ) -> Result<(), RequestError> {
        if claim == Claim::Exclusive {
            if let Some(previous) = self.body_setter {
                return Err(RequestError::BodyConflict {
                    previous,
                    next: setter,
                });
            }
        }
        self.body = body;
        self.body_setter = Some(setter);
        Ok(())
    }

    /// Type and body claim of one call; a type conflict aborts the body claim.
    pub fn set_typed_body(
        &mut self,
        setter: &'static str,
        content_type: &str,
        body: Body,
    ) -> Result<(), RequestError> {
        if let Some(previous) = self.body_setter {
            return Err(RequestError::BodyConflict {
                previous,
                next: setter,
            });
        }
        self.set_type(setter, content_type, Claim::Exclusive)?;
        self.set_body(setter, body, Claim::Exclusive)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_setter(&self) -> Option<&'static str> {
        self.body_setter
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn type_setter(&self) -> Option<&'static str> {
        self.type_setter
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Moves the body out for transmission
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }
}
