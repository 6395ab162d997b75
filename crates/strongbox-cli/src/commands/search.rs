//! Search command - list artifacts visible through a repository

use console::style;
use std::path::Path;

use strongbox_repo::SearchCriteria;

use crate::commands::{build_service, probe_remotes};
use crate::error::{CliError, Result};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config_path: Option<&Path>,
    storage: &str,
    repository: &str,
    prefix: Option<&str>,
    pattern: Option<&str>,
    count_only: bool,
    probe: bool,
    json_output: bool,
) -> Result<()> {
    let service = build_service(config_path)?;
    if probe {
        probe_remotes(&service).await?;
    }

    let mut criteria = SearchCriteria::all();
    if let Some(prefix) = prefix {
        criteria = criteria.with_prefix(prefix);
    }
    if let Some(pattern) = pattern {
        criteria = criteria.with_pattern(pattern)?;
    }

    if count_only {
        let count = service.count(storage, repository, &criteria).await?;
        if json_output {
            println!("{}", serde_json::json!({ "count": count }));
        } else {
            println!("{}", count);
        }
        return Ok(());
    }

    let hits = service
        .resolve_for_search(storage, repository, &criteria)
        .await?;

    if json_output {
        let report: Vec<_> = hits
            .iter()
            .map(|hit| {
                serde_json::json!({
                    "path": hit.path,
                    "repository": hit.repository.to_string(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).map_err(|e| CliError::internal(e.to_string()))?
        );
        return Ok(());
    }

    if hits.is_empty() {
        println!("No artifacts found in {}:{}", storage, repository);
        return Ok(());
    }

    let width = hits.iter().map(|h| h.path.len()).max().unwrap_or(0).max(4);
    println!("{:<width$}  REPOSITORY", "PATH", width = width);
    for hit in &hits {
        println!(
            "{:<width$}  {}",
            hit.path,
            style(&hit.repository).dim(),
            width = width
        );
    }
    println!();
    println!("{} artifact(s)", hits.len());
    Ok(())
}
