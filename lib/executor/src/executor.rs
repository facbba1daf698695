//! The rate-limited executor.
//!
//! Every outbound platform call goes through [`RateLimitedExecutor::execute`],
//! which retries transient failures with exponential backoff and reports
//! failures it gives up on. The executor never returns an error itself: the
//! outcome, retry count, and total delay always come back in an
//! [`ExecutionResult`].

use crate::backoff::retry_delay;
use crate::classify::{categorize, is_retryable};
use crate::config::RetryConfig;
use crate::error::CallError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storelink_core::{ErrorCategory, ErrorReport, ErrorReporter, Severity, ShopDomain};
use tracing::{debug, info, warn};

/// Identifies the call being executed, for logs and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    /// Name of the operation, such as `fetch_order`.
    pub operation: String,
    /// Shop the call is made on behalf of.
    pub domain: Option<ShopDomain>,
}

impl OperationContext {
    /// Creates a context for a named operation.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            domain: None,
        }
    }

    /// Attaches the shop domain.
    #[must_use]
    pub fn for_shop(mut self, domain: ShopDomain) -> Self {
        self.domain = Some(domain);
        self
    }
}

/// Per-call retry bookkeeping. Lives for one `execute` call.
#[derive(Debug, Clone)]
pub(crate) struct RetryContext {
    operation: String,
    domain: Option<ShopDomain>,
    /// Retries performed so far; never exceeds the configured maximum.
    attempt: u32,
    /// Sum of all delays slept so far.
    total_delay: Duration,
    last_error: Option<CallError>,
}

impl RetryContext {
    fn new(context: &OperationContext) -> Self {
        Self {
            operation: context.operation.clone(),
            domain: context.domain.clone(),
            attempt: 0,
            total_delay: Duration::ZERO,
            last_error: None,
        }
    }

    fn domain_str(&self) -> &str {
        self.domain.as_ref().map_or("-", ShopDomain::as_str)
    }

    fn record(&mut self, error: &CallError) {
        self.last_error = Some(error.clone());
    }

    fn last_error_message(&self) -> String {
        self.last_error
            .as_ref()
            .map_or_else(|| "unknown error".to_string(), ToString::to_string)
    }
}

/// Outcome of an executed operation plus retry telemetry.
#[derive(Debug, Clone)]
pub struct ExecutionResult<T> {
    /// The operation's value, or the last failure.
    pub outcome: Result<T, CallError>,
    /// Retries performed before the outcome.
    pub retry_count: u32,
    /// Total time spent sleeping between attempts.
    pub total_delay: Duration,
}

impl<T> ExecutionResult<T> {
    /// Returns true if the operation eventually succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<&CallError> {
        self.outcome.as_ref().err()
    }

    /// Discards the telemetry.
    ///
    /// # Errors
    ///
    /// Returns the last failure if the operation did not succeed.
    pub fn into_result(self) -> Result<T, CallError> {
        self.outcome
    }

    fn finish(outcome: Result<T, CallError>, retry: &RetryContext) -> Self {
        Self {
            outcome,
            retry_count: retry.attempt,
            total_delay: retry.total_delay,
        }
    }
}

/// Retrying wrapper around outbound calls.
///
/// Cheap to clone; construct once at startup and share.
#[derive(Clone)]
pub struct RateLimitedExecutor {
    config: RetryConfig,
    reporter: Arc<dyn ErrorReporter>,
}

impl RateLimitedExecutor {
    /// Creates an executor with the given default configuration.
    #[must_use]
    pub fn new(config: RetryConfig, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { config, reporter }
    }

    /// Returns the default configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` under the default configuration.
    pub async fn execute<T, F, Fut>(
        &self,
        context: &OperationContext,
        operation: F,
    ) -> ExecutionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        self.execute_with(context, &self.config, operation).await
    }

    /// Runs `operation` under an explicit configuration.
    pub async fn execute_with<T, F, Fut>(
        &self,
        context: &OperationContext,
        config: &RetryConfig,
        mut operation: F,
    ) -> ExecutionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut retry = RetryContext::new(context);

        if !config.enabled {
            let outcome = run_attempt(&mut operation, config.attempt_timeout()).await;
            return ExecutionResult::finish(outcome, &retry);
        }

        loop {
            let error = match run_attempt(&mut operation, config.attempt_timeout()).await {
                Ok(value) => {
                    if retry.attempt > 0 {
                        info!(
                            operation = %retry.operation,
                            domain = retry.domain_str(),
                            retries = retry.attempt,
                            total_delay_ms = retry.total_delay.as_millis() as u64,
                            "operation succeeded after retries"
                        );
                    }
                    return ExecutionResult::finish(Ok(value), &retry);
                }
                Err(error) => error,
            };
            retry.record(&error);

            if !is_retryable(&error, config) {
                self.report_fatal(&retry);
                return ExecutionResult::finish(Err(error), &retry);
            }

            if retry.attempt >= config.max_retries {
                self.report_exhausted(&retry);
                return ExecutionResult::finish(Err(error), &retry);
            }

            retry.attempt += 1;
            let delay = retry_delay(config, retry.attempt, error.retry_after);
            debug!(
                operation = %retry.operation,
                domain = retry.domain_str(),
                attempt = retry.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
            retry.total_delay += delay;
        }
    }

    fn report_exhausted(&self, retry: &RetryContext) {
        let error = retry.last_error_message();
        warn!(
            operation = %retry.operation,
            domain = retry.domain_str(),
            retries = retry.attempt,
            error = %error,
            "retries exhausted"
        );
        let report = ErrorReport::new(
            Severity::High,
            failure_category(retry),
            format!(
                "operation '{}' failed after {} retries: {error}",
                retry.operation, retry.attempt
            ),
        );
        self.reporter.report(with_call_context(report, retry));
    }

    fn report_fatal(&self, retry: &RetryContext) {
        let error = retry.last_error_message();
        warn!(
            operation = %retry.operation,
            domain = retry.domain_str(),
            error = %error,
            "non-retryable failure"
        );
        let report = ErrorReport::new(
            Severity::High,
            failure_category(retry),
            format!("operation '{}' failed: {error}", retry.operation),
        );
        self.reporter.report(with_call_context(report, retry));
    }
}

fn failure_category(retry: &RetryContext) -> ErrorCategory {
    retry
        .last_error
        .as_ref()
        .map_or(ErrorCategory::ExternalApi, categorize)
}

fn with_call_context(report: ErrorReport, retry: &RetryContext) -> ErrorReport {
    let report = report
        .with_context("operation", retry.operation.clone())
        .with_context("domain", retry.domain_str())
        .with_context("retry_count", retry.attempt.to_string())
        .with_context("total_delay_ms", retry.total_delay.as_millis().to_string());
    match retry.last_error.as_ref().and_then(|error| error.status) {
        Some(status) => report.with_context("status", status.to_string()),
        None => report,
    }
}

async fn run_attempt<T, F, Fut>(operation: &mut F, timeout: Option<Duration>) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, operation())
            .await
            .unwrap_or_else(|_| Err(CallError::timeout(limit))),
        None => operation().await,
    }
}
