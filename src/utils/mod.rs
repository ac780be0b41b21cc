//! Utility modules shared by discovery, registration and the realtime layer

pub mod error;
pub mod lock;
pub mod logging;
pub mod signal;
pub mod time;

// Re-export commonly used items
pub use error::{result_to_option, with_default};
pub use lock::lock_or_recover;
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use signal::wait_for_shutdown_signal;
pub use time::current_timestamp_millis;
