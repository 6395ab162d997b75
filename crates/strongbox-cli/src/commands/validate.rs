//! Validate command - check a configuration file

use console::style;
use std::path::Path;

use crate::commands::load_configuration;
use crate::error::{CliError, Result};

pub fn run(config_path: Option<&Path>, json_output: bool) -> Result<()> {
    let config = load_configuration(config_path)?;
    let issues = config.validation_issues();
    let repositories = config.repositories().count();

    if json_output {
        let report = serde_json::json!({
            "valid": issues.is_empty(),
            "storages": config.storages.len(),
            "repositories": repositories,
            "errors": issues.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).map_err(|e| CliError::internal(e.to_string()))?
        );
    } else if issues.is_empty() {
        println!(
            "{} Configuration valid: {} storage(s), {} repositories",
            style("✓").green().bold(),
            config.storages.len(),
            repositories
        );
    } else {
        println!("{} Configuration has {} problem(s):", style("✗").red().bold(), issues.len());
        for issue in &issues {
            println!("  {} {}", style("•").red(), issue);
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(CliError::config(format!(
            "{} configuration problem(s) found",
            issues.len()
        )))
    }
}
