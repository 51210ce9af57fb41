//! Scripted solver used by the engine's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SolverError;
use crate::traits::{SolveRequest, Solver};

type ResponseFn = Arc<dyn Fn(u32) -> String + Send + Sync>;
type LatencyFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;
type ErrorFn = Arc<dyn Fn() -> SolverError + Send + Sync>;

#[derive(Default)]
struct Counters {
    calls: Mutex<HashMap<u32, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Answers by attempt index, with optional latency and injected failures.
#[derive(Clone)]
pub struct ScriptedSolver {
    response: ResponseFn,
    latency: LatencyFn,
    fatal_on: Vec<u32>,
    fatal: Option<ErrorFn>,
    transient_first: u32,
    panic_on: Vec<u32>,
    counters: Arc<Counters>,
}

impl ScriptedSolver {
    pub fn always(text: &str) -> Self {
        let text = text.to_string();
        Self::by_attempt(move |_| text.clone())
    }

    pub fn by_attempt(f: impl Fn(u32) -> String + Send + Sync + 'static) -> Self {
        Self {
            response: Arc::new(f),
            latency: Arc::new(|_| Duration::ZERO),
            fatal_on: Vec::new(),
            fatal: None,
            transient_first: 0,
            panic_on: Vec::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_latency_by(move |_| latency)
    }

    pub fn with_latency_by(mut self, f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.latency = Arc::new(f);
        self
    }

    /// Fail the listed attempts with a non-retryable error.
    pub fn failing_on(
        mut self,
        attempts: &[u32],
        error: impl Fn() -> SolverError + Send + Sync + 'static,
    ) -> Self {
        self.fatal_on = attempts.to_vec();
        self.fatal = Some(Arc::new(error));
        self
    }

    /// Rate-limit the first `n` calls of every attempt.
    pub fn transient_first(mut self, n: u32) -> Self {
        self.transient_first = n;
        self
    }

    /// Panic inside `solve` for the listed attempts.
    pub fn panicking_on(mut self, attempts: &[u32]) -> Self {
        self.panic_on = attempts.to_vec();
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> u32 {
        self.counters.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Solver for ScriptedSolver {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn solve(&self, request: &SolveRequest) -> Result<String, SolverError> {
        let call = {
            let mut calls = self.counters.calls.lock().unwrap();
            let count = calls.entry(request.attempt).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep((self.latency)(request.attempt)).await;
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on.contains(&request.attempt) {
            panic!("scripted panic in attempt {}", request.attempt);
        }
        if let Some(fatal) = &self.fatal {
            if self.fatal_on.contains(&request.attempt) {
                return Err(fatal());
            }
        }
        if call <= self.transient_first {
            return Err(SolverError::RateLimited {
                retry_after_ms: None,
            });
        }
        Ok((self.response)(request.attempt))
    }
}
