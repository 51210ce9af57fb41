//! Result aggregation and the difficulty verdict.
//!
//! The aggregator is the single consumer of the attempt stream. It keeps a
//! running tally for live progress and builds the final report once the
//! stream is exhausted.

use std::fmt;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::model::{Attempt, AttemptState, ProblemCase};
use crate::report::{EvaluationReport, FailureBreakdown, ProblemSummary};

/// Difficulty classification derived from accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Easy,
    Medium,
    Hard,
    /// No attempt produced a usable answer.
    Indeterminate,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Easy => write!(f, "easy"),
            Verdict::Medium => write!(f, "medium"),
            Verdict::Hard => write!(f, "hard"),
            Verdict::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Inclusive lower bounds for the `Easy` and `Medium` verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerdictThresholds {
    pub easy: f64,
    pub medium: f64,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            easy: 0.80,
            medium: 0.50,
        }
    }
}

impl VerdictThresholds {
    /// Verdict for an accuracy computed over at least one valid attempt.
    pub fn classify(&self, accuracy: f64) -> Verdict {
        if accuracy >= self.easy {
            Verdict::Easy
        } else if accuracy >= self.medium {
            Verdict::Medium
        } else {
            Verdict::Hard
        }
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.medium)
            && (0.0..=1.0).contains(&self.easy)
            && self.medium <= self.easy
    }
}

/// What the presentation layer sees for each finished attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptEvent {
    pub index: u32,
    pub state: AttemptState,
    pub is_correct: Option<bool>,
    pub elapsed: Duration,
    /// Short preview of the extracted answer, or of the error text.
    pub preview: String,
}

const PREVIEW_CHARS: usize = 30;

impl From<&Attempt> for AttemptEvent {
    fn from(attempt: &Attempt) -> Self {
        let source = attempt
            .extracted_answer
            .as_deref()
            .or(attempt.raw_output.as_deref())
            .unwrap_or("");
        let mut preview: String = source.chars().take(PREVIEW_CHARS).collect();
        if source.chars().count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        Self {
            index: attempt.index,
            state: attempt.state,
            is_correct: attempt.is_correct,
            elapsed: attempt.elapsed,
            preview,
        }
    }
}

/// Counts so far, updated as attempts arrive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningTally {
    pub total: u32,
    pub completed: u32,
    pub correct: u32,
    pub failed: u32,
}

impl RunningTally {
    /// Accuracy over the completed attempts that did not fail.
    pub fn accuracy(&self) -> Option<f64> {
        let valid = self.completed - self.failed;
        (valid > 0).then(|| f64::from(self.correct) / f64::from(valid))
    }
}

/// Collects terminal attempts and reduces them into a report.
#[derive(Debug)]
pub struct ResultAggregator {
    thresholds: VerdictThresholds,
    attempts: Vec<Attempt>,
    tally: RunningTally,
}

impl ResultAggregator {
    pub fn new(total: u32, thresholds: VerdictThresholds) -> Self {
        Self {
            thresholds,
            attempts: Vec::with_capacity(total as usize),
            tally: RunningTally {
                total,
                ..Default::default()
            },
        }
    }

    /// Record one terminal attempt.
    pub fn observe(&mut self, attempt: Attempt) -> AttemptEvent {
        let event = AttemptEvent::from(&attempt);
        self.tally.completed += 1;
        if attempt.is_failed() {
            self.tally.failed += 1;
        } else if attempt.is_correct() {
            self.tally.correct += 1;
        }
        self.attempts.push(attempt);
        event
    }

    pub fn tally(&self) -> RunningTally {
        self.tally
    }

    /// Build the report. Attempts are put back into index order.
    pub fn finish(self, problem: &ProblemCase, solver: &str, wall_time: Duration) -> EvaluationReport {
        let mut attempts = self.attempts;
        attempts.sort_by_key(|a| a.index);

        let total = attempts.len() as u32;
        let mut failures = FailureBreakdown::default();
        for kind in attempts.iter().filter_map(|a| a.failure) {
            failures.record(kind);
        }
        let failed = attempts.iter().filter(|a| a.is_failed()).count() as u32;
        let valid = total - failed;
        let correct = attempts.iter().filter(|a| a.is_correct()).count() as u32;

        let (accuracy, verdict) = if valid > 0 {
            let accuracy = f64::from(correct) / f64::from(valid);
            (accuracy, self.thresholds.classify(accuracy))
        } else {
            (0.0, Verdict::Indeterminate)
        };

        EvaluationReport {
            id: uuid::Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            problem: ProblemSummary::from(problem),
            solver: solver.to_string(),
            total,
            valid,
            correct,
            failed,
            failures,
            accuracy,
            verdict,
            attempts,
            wall_time,
        }
    }
}

/// Consume `stream` to exhaustion and build the report.
///
/// `on_attempt` is called once per attempt, in the order attempts arrive.
pub async fn reduce<S, F>(
    stream: S,
    problem: &ProblemCase,
    solver: &str,
    thresholds: VerdictThresholds,
    mut on_attempt: F,
) -> EvaluationReport
where
    S: Stream<Item = Attempt>,
    F: FnMut(&AttemptEvent, &RunningTally),
{
    let started = tokio::time::Instant::now();
    let mut aggregator = ResultAggregator::new(problem.trial_count, thresholds);
    let mut stream = std::pin::pin!(stream);

    while let Some(attempt) = stream.next().await {
        let event = aggregator.observe(attempt);
        on_attempt(&event, &aggregator.tally());
    }

    aggregator.finish(problem, solver, started.elapsed())
}
