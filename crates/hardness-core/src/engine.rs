//! Difficulty engine.
//!
//! Wires the scheduler, matcher and aggregator together: one call runs every
//! attempt for a problem and returns the finished report.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::aggregate::{reduce, AttemptEvent, RunningTally, VerdictThresholds};
use crate::answer::{default_markers, AnswerMarker, AnswerMatcher};
use crate::invoker::{RetryPolicy, RetryingInvoker};
use crate::model::{ProblemCase, ProblemSet, DEFAULT_TRIALS, MAX_TRIALS, MIN_TRIALS};
use crate::report::EvaluationReport;
use crate::scheduler::{AttemptScheduler, SchedulerConfig};
use crate::traits::Solver;

/// Configuration for the difficulty engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attempts for problems created from a bare statement.
    pub trial_count: u32,
    /// Maximum attempts in flight at once.
    pub concurrency_cap: usize,
    pub retry: RetryPolicy,
    pub attempt_timeout: Option<Duration>,
    pub run_timeout: Option<Duration>,
    pub thresholds: VerdictThresholds,
    /// Answer markers, in priority order.
    pub markers: Vec<AnswerMarker>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            trial_count: DEFAULT_TRIALS,
            concurrency_cap: scheduler.concurrency_cap,
            retry: RetryPolicy::default(),
            attempt_timeout: scheduler.attempt_timeout,
            run_timeout: scheduler.run_timeout,
            thresholds: VerdictThresholds::default(),
            markers: default_markers(),
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        check_trial_count(self.trial_count)?;
        if self.concurrency_cap == 0 {
            bail!("concurrency_cap must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.retry.jitter_max < self.retry.jitter_min {
            bail!("jitter_max must not be below jitter_min");
        }
        // Delays only grow from one retry to the next if the jitter span
        // stays under the base delay.
        if self.retry.jitter_max - self.retry.jitter_min >= self.retry.base_delay
            && !self.retry.base_delay.is_zero()
        {
            bail!(
                "jitter span ({:?}) must be smaller than base_delay ({:?})",
                self.retry.jitter_max - self.retry.jitter_min,
                self.retry.base_delay
            );
        }
        if !self.thresholds.is_valid() {
            bail!(
                "thresholds must satisfy 0 <= medium ({}) <= easy ({}) <= 1",
                self.thresholds.medium,
                self.thresholds.easy
            );
        }
        if self.attempt_timeout.is_some_and(|t| t.is_zero())
            || self.run_timeout.is_some_and(|t| t.is_zero())
        {
            bail!("timeouts must be greater than zero");
        }
        if self.markers.iter().any(|m| m.open.is_empty()) {
            bail!("answer markers must not be empty");
        }
        Ok(())
    }

    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency_cap: self.concurrency_cap,
            attempt_timeout: self.attempt_timeout,
            run_timeout: self.run_timeout,
        }
    }
}

fn check_trial_count(trials: u32) -> Result<()> {
    if !(MIN_TRIALS..=MAX_TRIALS).contains(&trials) {
        bail!("trial_count must be within {MIN_TRIALS}..={MAX_TRIALS}, got {trials}");
    }
    Ok(())
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, problem: &ProblemCase, total: u32);
    fn on_attempt_complete(&self, event: &AttemptEvent, tally: &RunningTally);
    fn on_run_complete(&self, report: &EvaluationReport);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_run_start(&self, _: &ProblemCase, _: u32) {}
    fn on_attempt_complete(&self, _: &AttemptEvent, _: &RunningTally) {}
    fn on_run_complete(&self, _: &EvaluationReport) {}
}

/// Estimates problem difficulty from repeated independent solve attempts.
pub struct DifficultyEngine {
    scheduler: AttemptScheduler,
    solver_name: String,
    config: EngineConfig,
}

impl DifficultyEngine {
    pub fn new(solver: Arc<dyn Solver>, config: EngineConfig) -> Self {
        let solver_name = solver.name().to_string();
        let scheduler = AttemptScheduler::new(
            solver,
            RetryingInvoker::new(config.retry.clone()),
            AnswerMatcher::new(config.markers.clone()),
            config.scheduler_config(),
        );
        Self {
            scheduler,
            solver_name,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build an ad-hoc problem using the configured trial count.
    pub fn problem(&self, statement: &str, reference_answer: &str) -> ProblemCase {
        ProblemCase::new(statement, reference_answer, self.config.trial_count)
    }

    /// Run every attempt for `problem` and return the report.
    ///
    /// Attempt failures never make this fail; they are counted in the
    /// report. Only an out-of-range trial count is an error.
    pub async fn evaluate(
        &self,
        problem: &ProblemCase,
        progress: &dyn ProgressReporter,
    ) -> Result<EvaluationReport> {
        check_trial_count(problem.trial_count)?;

        progress.on_run_start(problem, problem.trial_count);
        let stream = self.scheduler.run(problem);
        let report = reduce(
            stream,
            problem,
            &self.solver_name,
            self.config.thresholds,
            |event, tally| progress.on_attempt_complete(event, tally),
        )
        .await;

        tracing::info!(
            problem = %problem.id,
            correct = report.correct,
            valid = report.valid,
            failed = report.failed,
            verdict = %report.verdict,
            "evaluation finished"
        );
        progress.on_run_complete(&report);
        Ok(report)
    }

    /// Evaluate every problem of a set, one problem at a time.
    pub async fn evaluate_set(
        &self,
        set: &ProblemSet,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<EvaluationReport>> {
        for problem in &set.problems {
            check_trial_count(problem.trial_count)
                .map_err(|e| anyhow::anyhow!("problem '{}': {e}", problem.id))?;
        }

        let mut reports = Vec::with_capacity(set.problems.len());
        for problem in &set.problems {
            reports.push(self.evaluate(problem, progress).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::aggregate::Verdict;
    use crate::error::{FailureKind, SolverError};
    use crate::testing::ScriptedSolver;

    fn engine(solver: ScriptedSolver) -> DifficultyEngine {
        DifficultyEngine::new(Arc::new(solver), EngineConfig::default())
    }

    #[derive(Default)]
    struct Recorder {
        started: Mutex<Option<u32>>,
        events: Mutex<Vec<(u32, RunningTally)>>,
        finished: Mutex<u32>,
    }

    impl ProgressReporter for Recorder {
        fn on_run_start(&self, _: &ProblemCase, total: u32) {
            *self.started.lock().unwrap() = Some(total);
        }
        fn on_attempt_complete(&self, event: &AttemptEvent, tally: &RunningTally) {
            self.events.lock().unwrap().push((event.index, *tally));
        }
        fn on_run_complete(&self, _: &EvaluationReport) {
            *self.finished.lock().unwrap() += 1;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn linear_equation_five_of_six_is_easy() {
        let solver = ScriptedSolver::by_attempt(|attempt| {
            if attempt == 6 {
                "Subtracting 5 gives 2x = 6, so 【答案：x = 3】".to_string()
            } else {
                "2x = 8, so 【答案：x = 4】".to_string()
            }
        });
        let problem = ProblemCase::new("Solve 2x + 5 = 13.", "4", 6);

        let report = engine(solver).evaluate(&problem, &NoopReporter).await.unwrap();

        assert_eq!(report.total, 6);
        assert_eq!(report.valid, 6);
        assert_eq!(report.correct, 5);
        assert!((report.accuracy - 5.0 / 6.0).abs() < 1e-9);
        assert_eq!(report.verdict, Verdict::Easy);
        assert_eq!(report.solver, "scripted");
    }

    #[tokio::test(start_paused = true)]
    async fn every_attempt_is_reported_once() {
        let solver = ScriptedSolver::always("4").with_latency_by(|attempt| {
            Duration::from_millis(u64::from(11 - attempt) * 10)
        });
        let recorder = Recorder::default();
        let problem = ProblemCase::new("p", "4", 10);

        let report = engine(solver).evaluate(&problem, &recorder).await.unwrap();

        assert_eq!(report.total, 10);
        assert_eq!(*recorder.started.lock().unwrap(), Some(10));
        assert_eq!(*recorder.finished.lock().unwrap(), 1);
        let events = recorder.events.lock().unwrap();
        let mut indices: Vec<u32> = events.iter().map(|(i, _)| *i).collect();
        assert_eq!(events.last().unwrap().1.completed, 10);
        indices.sort_unstable();
        assert_eq!(indices, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_isolated_and_counted() {
        let solver = ScriptedSolver::always("【答案：4】")
            .failing_on(&[1, 3], || SolverError::ModelNotFound("gpt-x".into()));
        let problem = ProblemCase::new("p", "4", 5);

        let report = engine(solver).evaluate(&problem, &NoopReporter).await.unwrap();

        assert_eq!(report.total, 5);
        assert_eq!(report.failed, 2);
        assert_eq!(report.valid, 3);
        assert_eq!(report.correct, 3);
        assert_eq!(report.failures.fatal, 2);
        assert_eq!(report.verdict, Verdict::Easy);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_before_counting() {
        let solver = ScriptedSolver::always("4").transient_first(2);
        let observer = solver.clone();
        let problem = ProblemCase::new("p", "4", 3);

        let report = engine(solver).evaluate(&problem, &NoopReporter).await.unwrap();

        assert_eq!(report.failed, 0);
        assert_eq!(report.correct, 3);
        assert_eq!(observer.total_calls(), 9);
        assert!(report.attempts.iter().all(|a| a.retry_count == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_count_as_rate_limited() {
        let solver = ScriptedSolver::always("4").transient_first(10);
        let problem = ProblemCase::new("p", "4", 3);

        let report = engine(solver).evaluate(&problem, &NoopReporter).await.unwrap();

        assert_eq!(report.failed, 3);
        assert_eq!(report.failures.rate_limited, 3);
        assert_eq!(report.verdict, Verdict::Indeterminate);
        assert!(report
            .attempts
            .iter()
            .all(|a| a.failure == Some(FailureKind::RateLimited)));
    }

    #[tokio::test]
    async fn rejects_out_of_range_trial_count() {
        let solver = ScriptedSolver::always("4");
        let engine = engine(solver);
        for trials in [0, 2, 11] {
            let problem = ProblemCase::new("p", "4", trials);
            assert!(engine.evaluate(&problem, &NoopReporter).await.is_err());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn evaluate_set_returns_one_report_per_problem() {
        let solver = ScriptedSolver::always("【答案：4】");
        let set = ProblemSet {
            id: "s".into(),
            name: "Set".into(),
            description: String::new(),
            problems: vec![
                ProblemCase::new("a", "4", 3).with_id("a"),
                ProblemCase::new("b", "5", 4).with_id("b"),
            ],
        };

        let reports = engine(solver).evaluate_set(&set, &NoopReporter).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].verdict, Verdict::Easy);
        assert_eq!(reports[1].verdict, Verdict::Hard);
        assert_eq!(reports[1].total, 4);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = [
            EngineConfig {
                trial_count: 11,
                ..Default::default()
            },
            EngineConfig {
                concurrency_cap: 0,
                ..Default::default()
            },
            EngineConfig {
                retry: RetryPolicy {
                    jitter_max: Duration::from_secs(20),
                    ..Default::default()
                },
                ..Default::default()
            },
            EngineConfig {
                thresholds: VerdictThresholds {
                    easy: 0.4,
                    medium: 0.6,
                },
                ..Default::default()
            },
            EngineConfig {
                attempt_timeout: Some(Duration::ZERO),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }
}
