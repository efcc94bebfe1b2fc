//! Sticky failure chain and reporters
//!
//! A [`Chain`] holds at most one failure. Builder calls check it before doing
//! anything, so a fluent chain keeps running after the first error without
//! re-validating or piling up secondary failures.

use crate::error::RequestError;
use std::fmt;
use std::sync::Arc;

/// Receives the formatted message of the first failure of a request.
pub trait Reporter: Send + Sync {
    fn report(&self, message: &str);
}

/// Logs failures through `tracing` and lets the test continue.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, message: &str) {
        tracing::error!(target: "ouroboros_expect", "{}", message);
    }
}

/// Panics with the failure message, failing the surrounding `#[test]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicReporter;

impl Reporter for PanicReporter {
    fn report(&self, message: &str) {
        panic!("{}", message);
    }
}

/// Failure state shared by a request and the response it produces.
#[derive(Clone)]
pub struct Chain {
    reporter: Arc<dyn Reporter>,
    failure: Option<RequestError>,
}

impl Chain {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            failure: None,
        }
    }

    /// Returns true once a failure has been recorded
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Records `err` if nothing failed yet and forwards it to the reporter.
    pub fn fail(&mut self, err: RequestError) {
        if self.failure.is_some() {
            tracing::debug!(ignored = %err, "chain already failed");
            return;
        }
        let message = err.to_string();
        tracing::warn!(failure = %message, "request chain failed");
        self.failure = Some(err);
        self.reporter.report(&message);
    }

    /// The first recorded failure
    pub fn failure(&self) -> Option<&RequestError> {
        self.failure.as_ref()
    }

    /// Formatted message of the first recorded failure
    pub fn message(&self) -> Option<String> {
        self.failure.as_ref().map(|e| e.to_string())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("failure", &self.failure)
            .finish()
    }
}
