//! Resolve command - find which repository serves a path

use console::style;
use std::path::Path;

use crate::commands::{build_service, probe_remotes};
use crate::display::{format_resolution_path, print_decisions};
use crate::error::{CliError, Result};

pub async fn run(
    config_path: Option<&Path>,
    storage: &str,
    repository: &str,
    path: &str,
    probe: bool,
    explain: bool,
    json_output: bool,
) -> Result<()> {
    let service = build_service(config_path)?;
    if probe {
        probe_remotes(&service).await?;
    }

    let order = service.resolution_path(storage, repository, path).await?;
    let location = service.resolve_for_fetch(storage, repository, path).await?;

    if json_output {
        let report = serde_json::json!({
            "repository": format!("{}:{}", storage, repository),
            "path": path,
            "resolutionPath": order.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            "resolved": location.as_ref().map(|l| serde_json::json!({
                "repository": l.key().to_string(),
                "path": l.path,
                "via": l.via.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            })),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).map_err(|e| CliError::internal(e.to_string()))?
        );
    } else {
        println!("{} Resolution order:", style("→").blue());
        print!("{}", format_resolution_path(&order));

        if explain {
            let repo = service.configuration();
            if repo.require(storage, repository)?.is_group() {
                println!();
                println!("{} Member routing:", style("→").blue());
                print_decisions(&service.explain(storage, repository, path).await?);
            }
        }

        if let Some(location) = &location {
            println!();
            let via = if location.via.is_empty() {
                String::new()
            } else {
                let chain: Vec<String> = location.via.iter().map(|k| k.to_string()).collect();
                format!(" (via {})", chain.join(" -> "))
            };
            println!(
                "{} {} served by {}{}",
                style("✓").green().bold(),
                location.path,
                style(location.key()).cyan(),
                via
            );
        }
    }

    match location {
        Some(_) => Ok(()),
        None => Err(CliError::not_found(format!(
            "No repository serves {} through {}:{}",
            path, storage, repository
        ))),
    }
}
