//! Discovery error policy
//!
//! `FailFast` raises every error to the caller (development/test). `Report`
//! hands recoverable errors to an [`ErrorSink`] and keeps going (production).
//! Configuration errors are never swallowed by `Report`: the affected branch
//! is still abandoned, the sink only sees the error on the way out.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::error;

use crate::package::traits::DiscoveryError;
use crate::utils::lock_or_recover;

/// Receives errors that the policy chose not to raise
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &DiscoveryError);
}

/// Sink that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, err: &DiscoveryError) {
        error!("{}", err);
    }
}

/// Sink that keeps every reported error in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    errors: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of all errors reported so far
    pub fn messages(&self) -> Vec<String> {
        lock_or_recover(&self.errors).clone()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, error: &DiscoveryError) {
        lock_or_recover(&self.errors).push(error.to_string());
    }
}

/// How discovery-time errors propagate
#[derive(Clone)]
pub enum ErrorPolicy {
    /// Raise every error
    FailFast,
    /// Report recoverable errors to the sink and continue
    Report(Arc<dyn ErrorSink>),
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::FailFast
    }
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::FailFast => f.write_str("FailFast"),
            ErrorPolicy::Report(_) => f.write_str("Report(..)"),
        }
    }
}

impl ErrorPolicy {
    /// Report policy backed by the tracing sink
    pub fn logged() -> Self {
        ErrorPolicy::Report(Arc::new(TracingSink))
    }

    pub fn is_fail_fast(&self) -> bool {
        matches!(self, ErrorPolicy::FailFast)
    }

    /// Apply the policy to one error
    ///
    /// Returns `Ok(())` when the error was reported and the caller should skip
    /// the offending item, `Err` when the caller must abort.
    pub fn handle(&self, err: DiscoveryError) -> Result<(), DiscoveryError> {
        match self {
            ErrorPolicy::FailFast => Err(err),
            ErrorPolicy::Report(sink) => {
                sink.report(&err);
                if err.is_recoverable() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Report a branch-fatal error without raising it
    ///
    /// Used by collecting walks where one branch failing must not stop its
    /// siblings. Under `FailFast` nothing is reported here; the error is
    /// surfaced in the final aggregate instead.
    pub fn note(&self, err: &DiscoveryError) {
        if let ErrorPolicy::Report(sink) = self {
            sink.report(err);
        }
    }
}
