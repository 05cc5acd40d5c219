//! Utility modules
//!
//! Reconnect backoff and connect deadlines.

pub mod retry;
pub mod timeout;

pub use retry::{retry_with_backoff, RetryConfig, RetryOutcome};
pub use timeout::{deadline_from_millis, with_timeout, TimeoutError};
