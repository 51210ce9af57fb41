//! The `hardness validate` command.

use std::path::PathBuf;

use anyhow::Result;

use hardness_core::parser;

pub fn execute(problems_path: PathBuf) -> Result<()> {
    let sets = parser::load_problems(&problems_path)?;

    let mut total_warnings = 0;

    for set in &sets {
        println!("Problem set: {} ({} problems)", set.name, set.problems.len());

        let warnings = parser::validate_problem_set(set);
        for w in &warnings {
            let prefix = w
                .problem_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All problem sets valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
