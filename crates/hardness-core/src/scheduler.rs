//! Attempt scheduler.
//!
//! Spawns one worker task per attempt onto the runtime. A semaphore admits at
//! most `concurrency_cap` of them into flight at a time; the rest wait as
//! `Pending`. Finished attempts are forwarded to an [`AttemptStream`] in
//! completion order. Workers never share mutable state: each owns its
//! `Attempt` and hands it over once it is terminal.

use std::collections::BTreeSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::answer::AnswerMatcher;
use crate::error::AttemptError;
use crate::invoker::RetryingInvoker;
use crate::model::{Attempt, AttemptState, ProblemCase};
use crate::traits::{SolveRequest, Solver};

/// Scheduler limits.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum attempts in flight at once.
    pub concurrency_cap: usize,
    /// Bound on one attempt, retries and backoff included.
    pub attempt_timeout: Option<Duration>,
    /// Bound on the whole run. Outstanding attempts are cancelled when it
    /// expires.
    pub run_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_cap: 8,
            attempt_timeout: Some(Duration::from_secs(600)),
            run_timeout: Some(Duration::from_secs(1800)),
        }
    }
}

/// One-shot stream of terminal attempts, in completion order.
///
/// Yields exactly `total()` attempts, then ends. Dropping it cancels the
/// attempts that are still outstanding once the next one completes.
pub struct AttemptStream {
    rx: mpsc::Receiver<Attempt>,
    total: u32,
}

impl AttemptStream {
    /// Number of attempts the stream will yield.
    pub fn total(&self) -> u32 {
        self.total
    }
}

impl Stream for AttemptStream {
    type Item = Attempt;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Attempt>> {
        self.rx.poll_recv(cx)
    }
}

/// Runs independent solve attempts for a problem with bounded parallelism.
#[derive(Clone)]
pub struct AttemptScheduler {
    solver: Arc<dyn Solver>,
    invoker: RetryingInvoker,
    matcher: Arc<AnswerMatcher>,
    config: SchedulerConfig,
}

impl AttemptScheduler {
    pub fn new(
        solver: Arc<dyn Solver>,
        invoker: RetryingInvoker,
        matcher: AnswerMatcher,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            solver,
            invoker,
            matcher: Arc::new(matcher),
            config,
        }
    }

    /// Start `problem.trial_count` attempts and return their stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&self, problem: &ProblemCase) -> AttemptStream {
        let total = problem.trial_count;
        let (tx, rx) = mpsc::channel(total.max(1) as usize);
        let dispatcher = Dispatcher {
            scheduler: self.clone(),
            problem: Arc::new(problem.clone()),
        };
        tokio::spawn(dispatcher.run(tx));
        AttemptStream { rx, total }
    }
}

struct Dispatcher {
    scheduler: AttemptScheduler,
    problem: Arc<ProblemCase>,
}

impl Dispatcher {
    async fn run(self, tx: mpsc::Sender<Attempt>) {
        let started = Instant::now();
        let total = self.problem.trial_count;
        let cap = self.scheduler.config.concurrency_cap.min(total as usize).max(1);
        let permits = Arc::new(Semaphore::new(cap));

        tracing::info!(
            problem = %self.problem.id,
            trials = total,
            concurrency = cap,
            "starting attempts"
        );

        let mut workers = JoinSet::new();
        for index in 1..=total {
            let worker = Worker {
                solver: Arc::clone(&self.scheduler.solver),
                invoker: self.scheduler.invoker.clone(),
                matcher: Arc::clone(&self.scheduler.matcher),
                problem: Arc::clone(&self.problem),
                attempt_timeout: self.scheduler.config.attempt_timeout,
            };
            workers.spawn(worker.run(index, Arc::clone(&permits)));
        }

        let deadline = self.scheduler.config.run_timeout.map(|t| started + t);
        let mut emitted = BTreeSet::new();
        let mut cancelled = false;

        loop {
            let joined = match deadline {
                Some(at) if !cancelled => {
                    match tokio::time::timeout_at(at, workers.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            tracing::warn!(
                                problem = %self.problem.id,
                                outstanding = workers.len(),
                                "run deadline exceeded, cancelling outstanding attempts"
                            );
                            cancelled = true;
                            workers.abort_all();
                            continue;
                        }
                    }
                }
                _ => workers.join_next().await,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok(attempt) => {
                    emitted.insert(attempt.index);
                    if tx.send(attempt).await.is_err() {
                        tracing::debug!("attempt stream dropped, abandoning run");
                        return;
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::error!(problem = %self.problem.id, "attempt worker panicked: {e}"),
            }
        }

        // Every index is reported exactly once, even when its worker never
        // handed an attempt back.
        for index in (1..=total).filter(|i| !emitted.contains(i)) {
            let mut attempt = Attempt::new(index);
            attempt.elapsed = started.elapsed();
            let error = if cancelled {
                AttemptError::RunDeadlineExceeded
            } else {
                AttemptError::WorkerLost("worker ended without reporting".to_string())
            };
            attempt.fail(&error);
            if tx.send(attempt).await.is_err() {
                return;
            }
        }
    }
}

struct Worker {
    solver: Arc<dyn Solver>,
    invoker: RetryingInvoker,
    matcher: Arc<AnswerMatcher>,
    problem: Arc<ProblemCase>,
    attempt_timeout: Option<Duration>,
}

impl Worker {
    async fn run(self, index: u32, permits: Arc<Semaphore>) -> Attempt {
        let mut attempt = Attempt::new(index);

        let Ok(_permit) = permits.acquire_owned().await else {
            attempt.fail(&AttemptError::WorkerLost("scheduler closed".to_string()));
            return attempt;
        };
        attempt.advance(AttemptState::InFlight);
        let started = Instant::now();

        let request = SolveRequest {
            statement: self.problem.statement.clone(),
            attempt: index,
        };
        let solver = &*self.solver;
        let request = &request;
        let invocation = self.invoker.invoke(
            || solver.solve(request),
            |retry, _| attempt.mark_retrying(retry),
        );

        let outcome = match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .unwrap_or(Err(AttemptError::DeadlineExceeded(limit))),
            None => invocation.await,
        };
        attempt.elapsed = started.elapsed();

        match outcome {
            Ok(invocation) => {
                attempt.retry_count = invocation.retries;
                let comparison = self
                    .matcher
                    .evaluate(&invocation.output, &self.problem.reference_answer);
                let is_correct = comparison.is_match();
                tracing::debug!(
                    attempt = index,
                    correct = is_correct,
                    tier = ?comparison.tier,
                    elapsed_ms = attempt.elapsed.as_millis() as u64,
                    "attempt finished"
                );
                attempt.succeed(invocation.output, comparison.extracted, is_correct);
            }
            Err(e) => {
                tracing::warn!(attempt = index, "attempt failed: {e}");
                attempt.fail(&e);
            }
        }
        attempt
    }
}
