//! Evaluation report types with JSON persistence and markdown rendering.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Verdict;
use crate::error::FailureKind;
use crate::model::{Attempt, ProblemCase};

/// The final, immutable outcome of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub problem: ProblemSummary,
    /// Name of the solver that produced the attempts.
    pub solver: String,
    /// Attempts launched.
    pub total: u32,
    /// Attempts that produced an answer (`total - failed`).
    pub valid: u32,
    /// Valid attempts whose answer matched the reference.
    pub correct: u32,
    /// Attempts that ended in a transport failure.
    pub failed: u32,
    pub failures: FailureBreakdown,
    /// `correct / valid`, or 0 when nothing was valid.
    pub accuracy: f64,
    pub verdict: Verdict,
    /// Every attempt, ordered by index.
    pub attempts: Vec<Attempt>,
    /// Wall-clock duration of the run.
    pub wall_time: Duration,
}

/// The evaluated problem, as recorded in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSummary {
    pub id: String,
    pub statement: String,
    pub reference_answer: String,
}

impl From<&ProblemCase> for ProblemSummary {
    fn from(problem: &ProblemCase) -> Self {
        Self {
            id: problem.id.clone(),
            statement: problem.statement.clone(),
            reference_answer: problem.reference_answer.clone(),
        }
    }
}

/// Failed attempts by cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBreakdown {
    pub fatal: u32,
    pub rate_limited: u32,
    pub timed_out: u32,
    pub cancelled: u32,
}

impl FailureBreakdown {
    pub fn record(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Fatal => self.fatal += 1,
            FailureKind::RateLimited => self.rate_limited += 1,
            FailureKind::TimedOut => self.timed_out += 1,
            FailureKind::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.fatal + self.rate_limited + self.timed_out + self.cancelled
    }
}

impl EvaluationReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: EvaluationReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Accuracy as a percentage.
    pub fn accuracy_percent(&self) -> f64 {
        self.accuracy * 100.0
    }

    /// One-line summary. Failures are always shown next to accuracy so a
    /// 0% caused by transport errors is not mistaken for wrong answers.
    pub fn headline(&self) -> String {
        let mut line = format!(
            "{}: {:.1}% ({}/{} valid) -> {}",
            self.problem.id,
            self.accuracy_percent(),
            self.correct,
            self.valid,
            self.verdict
        );
        if self.failed > 0 {
            line.push_str(&format!(", {} of {} attempts failed", self.failed, self.total));
        }
        line
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("## Difficulty: {}\n\n", self.problem.id));
        md.push_str(&format!("**Verdict:** {}\n\n", self.verdict));
        md.push_str(&format!(
            "**Accuracy:** {:.1}% ({} correct of {} valid, {} total)\n\n",
            self.accuracy_percent(),
            self.correct,
            self.valid,
            self.total
        ));

        if self.failed > 0 {
            md.push_str(&format!(
                "**Failed attempts:** {} (fatal {}, rate-limited {}, timed out {}, cancelled {})\n\n",
                self.failed,
                self.failures.fatal,
                self.failures.rate_limited,
                self.failures.timed_out,
                self.failures.cancelled
            ));
        }

        md.push_str("| Attempt | Status | Answer | Retries | Time |\n");
        md.push_str("|---------|--------|--------|---------|------|\n");
        for a in &self.attempts {
            let status = match (a.failure, a.is_correct) {
                (Some(kind), _) => format!("failed ({kind})"),
                (None, Some(true)) => "correct".to_string(),
                (None, Some(false)) => "wrong".to_string(),
                (None, None) => a.state.to_string(),
            };
            let answer = a
                .extracted_answer
                .as_deref()
                .unwrap_or("-")
                .replace('|', "\\|")
                .replace('\n', " ");
            md.push_str(&format!(
                "| {} | {} | {} | {} | {:.1}s |\n",
                a.index,
                status,
                answer,
                a.retry_count,
                a.elapsed.as_secs_f64()
            ));
        }

        md.push_str(&format!(
            "\nSolver `{}`, wall time {:.1}s\n",
            self.solver,
            self.wall_time.as_secs_f64()
        ));
        md
    }
}
