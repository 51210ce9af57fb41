//! Solver and attempt error types.
//!
//! `SolverError` is what a Solver Client adapter returns. It is classified
//! structurally (`ErrorKind`) so the retrying invoker never has to sniff
//! message strings. `AttemptError` is what ends a single attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a solver failure may succeed if the call is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Fatal,
}

/// Errors that can occur when calling a reasoning service.
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    /// The service returned a rate limit response (HTTP 429).
    #[error("rate limited{}", retry_after_suffix(.retry_after_ms))]
    RateLimited { retry_after_ms: Option<u64> },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The connection failed before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model or endpoint does not exist.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The service returned a non-retryable error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
}

fn retry_after_suffix(retry_after_ms: &Option<u64>) -> String {
    match retry_after_ms {
        Some(ms) => format!(", retry after {ms}ms"),
        None => String::new(),
    }
}

impl SolverError {
    /// Classify this error for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SolverError::RateLimited { .. } | SolverError::Timeout(_) | SolverError::Network(_) => {
                ErrorKind::Transient
            }
            SolverError::AuthenticationFailed(_)
            | SolverError::ModelNotFound(_)
            | SolverError::Api { .. }
            | SolverError::Malformed(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// The service's retry-after hint, if it sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SolverError::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// Why an attempt ended in `FailedFatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A non-retryable solver error.
    Fatal,
    /// Transient errors persisted past the retry ceiling.
    RateLimited,
    /// The attempt's own deadline expired.
    TimedOut,
    /// The run deadline expired or the worker was lost.
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Fatal => write!(f, "fatal"),
            FailureKind::RateLimited => write!(f, "rate-limited"),
            FailureKind::TimedOut => write!(f, "timed out"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Errors that terminate a single attempt.
///
/// None of these abort the run; the scheduler captures them on the
/// attempt and moves on.
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    /// The solver returned a non-retryable error.
    #[error("fatal solver error: {0}")]
    Fatal(SolverError),

    /// Every call up to the ceiling returned a transient error.
    #[error("retries exhausted after {attempts} calls: {last}")]
    RetryExhausted { attempts: u32, last: SolverError },

    /// The attempt did not finish within its deadline.
    #[error("attempt deadline of {}s exceeded", .0.as_secs())]
    DeadlineExceeded(Duration),

    /// The run deadline expired while this attempt was outstanding.
    #[error("run deadline exceeded before the attempt finished")]
    RunDeadlineExceeded,

    /// The worker task owning the attempt died.
    #[error("worker lost: {0}")]
    WorkerLost(String),
}

impl AttemptError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AttemptError::Fatal(_) => FailureKind::Fatal,
            AttemptError::RetryExhausted { .. } => FailureKind::RateLimited,
            AttemptError::DeadlineExceeded(_) => FailureKind::TimedOut,
            AttemptError::RunDeadlineExceeded | AttemptError::WorkerLost(_) => {
                FailureKind::Cancelled
            }
        }
    }
}
