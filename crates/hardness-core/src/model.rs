//! Core data model types for hardness.
//!
//! A `ProblemCase` is what gets evaluated, an `Attempt` is one independent
//! solve of it, and a `ProblemSet` is a batch of cases loaded from disk.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AttemptError, FailureKind};

/// Smallest accepted trial count.
pub const MIN_TRIALS: u32 = 3;
/// Largest accepted trial count.
pub const MAX_TRIALS: u32 = 10;
/// Trial count used when neither the case nor the config sets one.
pub const DEFAULT_TRIALS: u32 = 5;

/// A problem statement with its reference answer.
///
/// Immutable once a run starts; workers share it behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemCase {
    /// Identifier, unique within a problem set.
    pub id: String,
    /// The problem text sent to the solver.
    pub statement: String,
    /// The official answer attempts are compared against.
    pub reference_answer: String,
    /// Number of attempts to launch.
    pub trial_count: u32,
    /// Tags for filtering.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ProblemCase {
    pub fn new(statement: impl Into<String>, reference_answer: impl Into<String>, trials: u32) -> Self {
        Self {
            id: "adhoc".to_string(),
            statement: statement.into(),
            reference_answer: reference_answer.into(),
            trial_count: trials,
            tags: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A named collection of problem cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub problems: Vec<ProblemCase>,
}

/// Lifecycle of an attempt. `Succeeded` and `FailedFatal` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    InFlight,
    Retrying,
    Succeeded,
    FailedFatal,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Succeeded | AttemptState::FailedFatal)
    }

    fn rank(self) -> u8 {
        match self {
            AttemptState::Pending => 0,
            AttemptState::InFlight => 1,
            AttemptState::Retrying => 2,
            AttemptState::Succeeded | AttemptState::FailedFatal => 3,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Pending => write!(f, "pending"),
            AttemptState::InFlight => write!(f, "in-flight"),
            AttemptState::Retrying => write!(f, "retrying"),
            AttemptState::Succeeded => write!(f, "succeeded"),
            AttemptState::FailedFatal => write!(f, "failed"),
        }
    }
}

/// One independent solve of a problem case.
///
/// Owned by exactly one worker until it reaches a terminal state, after
/// which it is only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based index within the run.
    pub index: u32,
    pub state: AttemptState,
    /// Solver output, or the error text for failed attempts.
    pub raw_output: Option<String>,
    /// The candidate answer pulled out of `raw_output`.
    pub extracted_answer: Option<String>,
    pub is_correct: Option<bool>,
    /// Set only for `FailedFatal` attempts.
    #[serde(default)]
    pub failure: Option<FailureKind>,
    pub elapsed: Duration,
    pub retry_count: u32,
}

impl Attempt {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            state: AttemptState::Pending,
            raw_output: None,
            extracted_answer: None,
            is_correct: None,
            failure: None,
            elapsed: Duration::ZERO,
            retry_count: 0,
        }
    }

    /// Move to `next`, ignoring transitions that would regress the state.
    ///
    /// Returns whether the transition happened.
    pub fn advance(&mut self, next: AttemptState) -> bool {
        if self.state.is_terminal() || next.rank() < self.state.rank() {
            return false;
        }
        self.state = next;
        true
    }

    /// Record a retry; only meaningful while the attempt is live.
    pub fn mark_retrying(&mut self, retry: u32) {
        if self.advance(AttemptState::Retrying) {
            self.retry_count = retry;
        }
    }

    /// Finish the attempt with solver output and a verdict on it.
    pub fn succeed(&mut self, raw_output: String, extracted: String, is_correct: bool) {
        if self.advance(AttemptState::Succeeded) {
            self.raw_output = Some(raw_output);
            self.extracted_answer = Some(extracted);
            self.is_correct = Some(is_correct);
        }
    }

    /// Finish the attempt as a transport failure, capturing the error text.
    pub fn fail(&mut self, error: &AttemptError) {
        if self.advance(AttemptState::FailedFatal) {
            self.raw_output = Some(error.to_string());
            self.failure = Some(error.failure_kind());
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == AttemptState::FailedFatal
    }

    pub fn is_correct(&self) -> bool {
        self.state == AttemptState::Succeeded && self.is_correct == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;

    #[test]
    fn state_never_regresses() {
        let mut attempt = Attempt::new(1);
        assert!(attempt.advance(AttemptState::InFlight));
        assert!(attempt.advance(AttemptState::Retrying));
        assert!(!attempt.advance(AttemptState::InFlight));
        assert_eq!(attempt.state, AttemptState::Retrying);
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let mut attempt = Attempt::new(2);
        attempt.advance(AttemptState::InFlight);
        attempt.succeed("x = 4".into(), "x=4".into(), true);
        attempt.fail(&AttemptError::RunDeadlineExceeded);
        assert_eq!(attempt.state, AttemptState::Succeeded);
        assert_eq!(attempt.is_correct, Some(true));
        assert!(attempt.failure.is_none());
    }

    #[test]
    fn failure_captures_error_text() {
        let mut attempt = Attempt::new(3);
        attempt.advance(AttemptState::InFlight);
        attempt.fail(&AttemptError::Fatal(SolverError::AuthenticationFailed(
            "bad key".into(),
        )));
        assert!(attempt.is_failed());
        assert!(!attempt.is_correct());
        assert_eq!(attempt.failure, Some(FailureKind::Fatal));
        assert!(attempt.raw_output.unwrap().contains("bad key"));
    }

    #[test]
    fn retry_count_tracks_latest_retry() {
        let mut attempt = Attempt::new(4);
        attempt.advance(AttemptState::InFlight);
        attempt.mark_retrying(1);
        attempt.mark_retrying(2);
        assert_eq!(attempt.retry_count, 2);
        assert_eq!(attempt.state, AttemptState::Retrying);
    }

    #[test]
    fn problem_case_serde_roundtrip() {
        let case = ProblemCase::new("2x+5=13", "4", 6).with_id("linear-1");
        let json = serde_json::to_string(&case).unwrap();
        let back: ProblemCase = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "linear-1");
        assert_eq!(back.trial_count, 6);
        assert!(back.tags.is_empty());
    }
}
