//! Mock solver for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use hardness_core::error::SolverError;
use hardness_core::traits::{SolveRequest, Solver};

const DEFAULT_RESPONSE: &str = "【答案：0】";

/// A mock solver for exercising the engine without real API calls.
///
/// Attempt `n` receives `responses[(n - 1) % len]`, so the answer an
/// attempt gets does not depend on scheduling order.
pub struct MockSolver {
    responses: Vec<String>,
    /// Attempts that fail with a non-retryable error.
    failing_attempts: Vec<u32>,
    call_count: AtomicU32,
    last_request: Mutex<Option<SolveRequest>>,
}

impl MockSolver {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            failing_attempts: Vec::new(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    pub fn failing_on(mut self, attempts: Vec<u32>) -> Self {
        self.failing_attempts = attempts;
        self
    }

    /// Get the number of calls made to this solver.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this solver.
    pub fn last_request(&self) -> Option<SolveRequest> {
        self.last_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl Solver for MockSolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn solve(&self, request: &SolveRequest) -> Result<String, SolverError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if self.failing_attempts.contains(&request.attempt) {
            return Err(SolverError::Api {
                status: 500,
                message: format!("mock failure for attempt {}", request.attempt),
            });
        }

        if self.responses.is_empty() {
            return Ok(DEFAULT_RESPONSE.to_string());
        }
        let slot = (request.attempt.saturating_sub(1) as usize) % self.responses.len();
        Ok(self.responses[slot].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardness_core::error::ErrorKind;

    fn request(attempt: u32) -> SolveRequest {
        SolveRequest {
            statement: "Solve 2x + 5 = 13.".into(),
            attempt,
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let solver = MockSolver::with_fixed_response("【答案：4】");

        let text = solver.solve(&request(1)).await.unwrap();
        assert_eq!(text, "【答案：4】");
        assert_eq!(solver.call_count(), 1);
        assert_eq!(solver.last_request().unwrap().attempt, 1);
    }

    #[tokio::test]
    async fn responses_cycle_by_attempt() {
        let solver = MockSolver::new(vec!["a".into(), "b".into(), "c".into()]);

        assert_eq!(solver.solve(&request(5)).await.unwrap(), "b");
        assert_eq!(solver.solve(&request(1)).await.unwrap(), "a");
        assert_eq!(solver.solve(&request(3)).await.unwrap(), "c");
        assert_eq!(solver.solve(&request(4)).await.unwrap(), "a");
        assert_eq!(solver.call_count(), 4);
    }

    #[tokio::test]
    async fn failing_attempts_return_fatal_errors() {
        let solver = MockSolver::with_fixed_response("4").failing_on(vec![2]);

        assert!(solver.solve(&request(1)).await.is_ok());
        let err = solver.solve(&request(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn empty_responses_fall_back() {
        let solver = MockSolver::new(vec![]);
        assert_eq!(solver.solve(&request(1)).await.unwrap(), DEFAULT_RESPONSE);
    }
}
