//! Problem set loader.
//!
//! Loads problem sets from TOML files, JSON arrays, JSONL files and
//! directories of those, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{ProblemCase, ProblemSet, DEFAULT_TRIALS, MAX_TRIALS, MIN_TRIALS};

/// Intermediate TOML structure for problem set files.
#[derive(Debug, Deserialize)]
struct TomlProblemFile {
    problem_set: TomlProblemSetHeader,
    #[serde(default)]
    problems: Vec<RawProblem>,
}

#[derive(Debug, Deserialize)]
struct TomlProblemSetHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    default_trial_count: Option<u32>,
}

/// One problem as written on disk, in either format.
#[derive(Debug, Deserialize)]
struct RawProblem {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "content")]
    statement: String,
    #[serde(alias = "answer")]
    reference_answer: String,
    #[serde(default)]
    trial_count: Option<u32>,
    #[serde(default)]
    tags: Vec<String>,
}

impl RawProblem {
    fn into_case(self, position: usize, default_trials: u32) -> ProblemCase {
        ProblemCase {
            id: self.id.unwrap_or_else(|| format!("problem-{}", position + 1)),
            statement: self.statement,
            reference_answer: self.reference_answer,
            trial_count: self.trial_count.unwrap_or(default_trials),
            tags: self.tags,
        }
    }
}

/// Parse a problem set file, choosing the format from its extension.
pub fn parse_problem_set(path: &Path) -> Result<ProblemSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read problem set file: {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") | Some("jsonl") => parse_json_problems(&content, path),
        _ => parse_problem_set_str(&content, path),
    }
}

/// Parse a TOML string into a `ProblemSet` (useful for testing).
pub fn parse_problem_set_str(content: &str, source_path: &Path) -> Result<ProblemSet> {
    let parsed: TomlProblemFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let default_trials = parsed
        .problem_set
        .default_trial_count
        .unwrap_or(DEFAULT_TRIALS);

    let problems = parsed
        .problems
        .into_iter()
        .enumerate()
        .map(|(i, p)| p.into_case(i, default_trials))
        .collect();

    Ok(ProblemSet {
        id: parsed.problem_set.id,
        name: parsed.problem_set.name,
        description: parsed.problem_set.description,
        problems,
    })
}

/// Parse a JSON array, or JSONL with one problem per line.
///
/// The set takes its id and name from the file stem.
pub fn parse_json_problems(content: &str, source_path: &Path) -> Result<ProblemSet> {
    let trimmed = content.trim();
    let raw: Vec<RawProblem> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .with_context(|| format!("failed to parse JSON: {}", source_path.display()))?
    } else {
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!(
                        "failed to parse JSONL line {} of {}",
                        n + 1,
                        source_path.display()
                    )
                })
            })
            .collect::<Result<_>>()?
    };

    let stem = source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("problems")
        .to_string();

    Ok(ProblemSet {
        id: stem.clone(),
        name: stem,
        description: String::new(),
        problems: raw
            .into_iter()
            .enumerate()
            .map(|(i, p)| p.into_case(i, DEFAULT_TRIALS))
            .collect(),
    })
}

/// Recursively load all problem set files from a directory.
pub fn load_problem_directory(dir: &Path) -> Result<Vec<ProblemSet>> {
    let mut sets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            sets.extend(load_problem_directory(&path)?);
        } else if path
            .extension()
            .is_some_and(|ext| ext == "toml" || ext == "json" || ext == "jsonl")
        {
            match parse_problem_set(&path) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sets)
}

/// Load a single file or a whole directory.
pub fn load_problems(path: &Path) -> Result<Vec<ProblemSet>> {
    if path.is_dir() {
        load_problem_directory(path)
    } else {
        Ok(vec![parse_problem_set(path)?])
    }
}

/// A warning from problem set validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The problem ID (if applicable).
    pub problem_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a problem set for common issues.
pub fn validate_problem_set(set: &ProblemSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut seen_ids = HashSet::new();

    if set.problems.is_empty() {
        warnings.push(ValidationWarning {
            problem_id: None,
            message: "problem set has no problems".into(),
        });
    }

    for problem in &set.problems {
        let warn = |message: String| ValidationWarning {
            problem_id: Some(problem.id.clone()),
            message,
        };

        if !seen_ids.insert(&problem.id) {
            warnings.push(warn(format!("duplicate problem ID: {}", problem.id)));
        }
        if problem.statement.trim().is_empty() {
            warnings.push(warn("statement is empty".into()));
        }
        if problem.reference_answer.trim().is_empty() {
            warnings.push(warn("reference answer is empty".into()));
        }
        if !(MIN_TRIALS..=MAX_TRIALS).contains(&problem.trial_count) {
            warnings.push(warn(format!(
                "trial_count {} is outside {MIN_TRIALS}..={MAX_TRIALS}",
                problem.trial_count
            )));
        }
    }

    warnings
}
