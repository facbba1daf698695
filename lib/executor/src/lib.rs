//! Rate-limited executor for outbound platform calls.
//!
//! This crate provides:
//!
//! - **Retry policy**: exponential backoff with jitter, capped and floored
//! - **Classification**: which failures are transient and how to report the rest
//! - **Executor**: runs an operation under the policy and reports what it gives up on
//! - **Telemetry**: parsing of the platform's query cost and call limit headers

pub mod backoff;
pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod telemetry;

pub use backoff::{MIN_DELAY, backoff_delay, retry_delay};
pub use classify::{categorize, is_retryable};
pub use config::RetryConfig;
pub use error::CallError;
pub use executor::{ExecutionResult, OperationContext, RateLimitedExecutor};
pub use telemetry::{
    CallLimit, RateLimitTelemetry, ThrottleStatus, parse_call_limit, parse_rate_limit_telemetry,
    parse_retry_after,
};
