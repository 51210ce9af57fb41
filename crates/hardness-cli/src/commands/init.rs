//! The `hardness init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("hardness.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("problems").context("failed to create problems/")?;
    write_if_missing(Path::new("problems/example.toml"), EXAMPLE_PROBLEM_SET)?;

    println!("\nNext steps:");
    println!("  1. Set OPENAI_API_KEY or edit hardness.toml");
    println!("  2. Run: hardness validate --problems problems/example.toml");
    println!("  3. Run: hardness run --problems problems/example.toml");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# hardness configuration

default_provider = "openai"
trial_count = 5
concurrency_cap = 8

# Backoff for rate-limited calls: base * 2^n plus 1-5s jitter, 5 calls total.
base_delay_ms = 10000
max_attempts = 5
jitter_min_ms = 1000
jitter_max_ms = 5000

attempt_timeout_secs = 600
run_timeout_secs = 1800

easy_threshold = 0.80
medium_threshold = 0.50
output_dir = "./hardness-results"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"
model = "gpt-4o-mini"

# Any OpenAI-compatible endpoint works, e.g. Volcengine Ark:
# [providers.ark]
# type = "openai"
# api_key = "${ARK_API_KEY}"
# base_url = "https://ark.cn-beijing.volces.com/api/v3"
# model = "doubao-seed-1-6-250615"

[providers.offline]
type = "mock"
responses = ["2x = 8, so 【答案：4】"]
"#;

const EXAMPLE_PROBLEM_SET: &str = r#"[problem_set]
id = "example"
name = "Example Problem Set"
description = "A few short problems to get started"
default_trial_count = 5

[[problems]]
id = "linear-equation"
statement = "Solve for x: 2x + 5 = 13."
reference_answer = "4"
tags = ["algebra"]

[[problems]]
id = "quadratic-root"
statement = "Find the positive root of x^2 - 9 = 0."
reference_answer = "3"
tags = ["algebra"]

[[problems]]
id = "triangle-area"
statement = "A right triangle has legs of length 6 and 8. What is its area?"
reference_answer = "24"
trial_count = 6
tags = ["geometry"]
"#;
