//! Error handling helpers for graceful degradation
//!
//! Used where a failure should be logged and skipped instead of aborting
//! the surrounding operation (e.g. emitting a notice nobody listens to).

use tracing::{debug, warn};

/// Execute an operation and return a default value on error
///
/// The error is logged at debug level since the caller expects failure to be
/// a normal outcome.
///
/// # Example
/// ```rust
/// use package_services::utils::with_default;
///
/// let port = with_default(|| "not a port".parse::<u16>(), 8000, "Failed to parse port");
/// assert_eq!(port, 8000);
/// ```
pub fn with_default<F, T, E>(operation: F, default: T, context: &str) -> T
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    match operation() {
        Ok(value) => value,
        Err(e) => {
            debug!("{}: {}, using default", context, e);
            default
        }
    }
}

/// Convert a Result to an Option, logging the error
pub fn result_to_option<T, E>(result: Result<T, E>, context: &str) -> Option<T>
where
    E: std::fmt::Display,
{
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}
