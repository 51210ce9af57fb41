//! The `hardness run` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use hardness_core::aggregate::{AttemptEvent, RunningTally};
use hardness_core::engine::{DifficultyEngine, ProgressReporter};
use hardness_core::model::{AttemptState, ProblemCase, ProblemSet};
use hardness_core::parser;
use hardness_core::report::EvaluationReport;
use hardness_providers::load_config_from;

#[derive(Args)]
pub struct RunArgs {
    /// Problem statement to evaluate
    #[arg(
        long,
        required_unless_present = "problems",
        conflicts_with = "problems",
        requires = "answer"
    )]
    statement: Option<String>,

    /// Reference answer for --statement
    #[arg(long, requires = "statement")]
    answer: Option<String>,

    /// Path to a problem set file or directory
    #[arg(long)]
    problems: Option<PathBuf>,

    /// Only run problems carrying one of these tags (comma-separated)
    #[arg(long, requires = "problems")]
    filter: Option<String>,

    /// Attempts per problem (3-10)
    #[arg(long)]
    trials: Option<u32>,

    /// Provider name from the config file
    #[arg(long)]
    provider: Option<String>,

    /// Max attempts in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Report format written to the output directory
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Output directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Markdown,
    #[value(name = "none")]
    Skip,
}

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_run_start(&self, problem: &ProblemCase, total: u32) {
        eprintln!("\nEvaluating {} with {total} attempts", problem.id);
    }

    fn on_attempt_complete(&self, event: &AttemptEvent, tally: &RunningTally) {
        let status = match (event.state, event.is_correct) {
            (AttemptState::FailedFatal, _) => "FAIL",
            (_, Some(true)) => "OK",
            _ => "WRONG",
        };
        let accuracy = tally
            .accuracy()
            .map(|a| format!("{:.1}%", a * 100.0))
            .unwrap_or_else(|| "-".to_string());
        eprintln!(
            "  [{}/{}] attempt {} {status} {} ({:.1}s) accuracy {accuracy}",
            tally.completed,
            tally.total,
            event.index,
            event.preview,
            event.elapsed.as_secs_f64(),
        );
    }

    fn on_run_complete(&self, report: &EvaluationReport) {
        eprintln!("  {}", report.headline());
    }
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;

    let mut engine_config = config.to_engine_config();
    if let Some(trials) = args.trials {
        engine_config.trial_count = trials;
    }
    if let Some(cap) = args.concurrency {
        engine_config.concurrency_cap = cap;
    }
    engine_config.validate().context("invalid configuration")?;
    tracing::debug!(
        provider = args.provider.as_deref().unwrap_or(&config.default_provider),
        trials = engine_config.trial_count,
        concurrency = engine_config.concurrency_cap,
        "configuration loaded"
    );

    let solver = config.solver(args.provider.as_deref())?;
    let engine = DifficultyEngine::new(solver, engine_config);

    let mut sets = match (&args.statement, &args.answer, &args.problems) {
        (Some(statement), Some(answer), _) => vec![ProblemSet {
            id: "adhoc".into(),
            name: "Ad-hoc problem".into(),
            description: String::new(),
            problems: vec![engine.problem(statement, answer)],
        }],
        (_, _, Some(path)) => parser::load_problems(path)?,
        _ => anyhow::bail!("either --statement/--answer or --problems is required"),
    };

    if let Some(filter_tags) = &args.filter {
        let tags: Vec<&str> = filter_tags.split(',').map(|s| s.trim()).collect();
        for set in &mut sets {
            set.problems
                .retain(|p| p.tags.iter().any(|t| tags.contains(&t.as_str())));
        }
    }
    if let Some(trials) = args.trials {
        for problem in sets.iter_mut().flat_map(|s| s.problems.iter_mut()) {
            problem.trial_count = trials;
        }
    }

    let problem_count: usize = sets.iter().map(|s| s.problems.len()).sum();
    anyhow::ensure!(problem_count > 0, "no problems to evaluate");

    let mut reports = Vec::with_capacity(problem_count);
    for set in &sets {
        reports.extend(engine.evaluate_set(set, &ConsoleReporter).await?);
    }

    print_summary(&reports);

    let output = args.output.unwrap_or(config.output_dir);
    save_reports(&reports, &output, args.format)?;

    Ok(())
}

fn save_reports(reports: &[EvaluationReport], output: &Path, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Skip {
        return Ok(());
    }

    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");

    for report in reports {
        let stem = format!("{}-{timestamp}", report.problem.id.replace(['/', '\\'], "_"));
        match format {
            OutputFormat::Json => {
                let path = output.join(format!("{stem}.json"));
                report.save_json(&path)?;
                eprintln!("Report saved to: {}", path.display());
            }
            OutputFormat::Markdown => {
                let path = output.join(format!("{stem}.md"));
                std::fs::write(&path, report.to_markdown())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("Report saved to: {}", path.display());
            }
            OutputFormat::Skip => {}
        }
    }
    Ok(())
}

fn print_summary(reports: &[EvaluationReport]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Problem", "Verdict", "Accuracy", "Correct", "Failed", "Time",
    ]);

    for report in reports {
        table.add_row(vec![
            Cell::new(&report.problem.id),
            Cell::new(report.verdict),
            Cell::new(format!("{:.1}%", report.accuracy_percent())),
            Cell::new(format!("{}/{}", report.correct, report.valid)),
            Cell::new(format!("{}/{}", report.failed, report.total)),
            Cell::new(format!("{:.1}s", report.wall_time.as_secs_f64())),
        ]);
    }

    println!("\n{table}");
}
