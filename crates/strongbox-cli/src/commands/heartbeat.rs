//! Heartbeat command - probe remote repositories

use console::style;
use std::path::Path;
use std::sync::Arc;

use strongbox_core::ConfigurationManager;
use strongbox_repo::{RemoteRepositoryAlivenessTracker, RemoteRepositoryHeartbeatScheduler};

use crate::commands::load_configuration;
use crate::display::{print_aliveness_table, print_probe_outcomes};
use crate::error::{CliError, Result};

pub async fn run(config_path: Option<&Path>, once: bool) -> Result<()> {
    let manager = ConfigurationManager::new(load_configuration(config_path)?)?;
    let config = manager.get_configuration();
    let tracker = Arc::new(RemoteRepositoryAlivenessTracker::from_settings(
        &config.remote_repositories_configuration,
    ));
    let scheduler = RemoteRepositoryHeartbeatScheduler::from_config(&config, tracker.clone())?;

    if once {
        let outcomes = scheduler.probe_all_once(&config).await?;
        print_probe_outcomes(&outcomes);
        return Ok(());
    }

    let remotes = scheduler.start(&config)?;
    println!(
        "{} Probing {} remote(s), press Ctrl-C to stop",
        style("→").blue(),
        remotes
    );

    let waited = tokio::signal::ctrl_c().await;
    scheduler.shutdown(scheduler.settings().shutdown_grace).await;
    waited.map_err(|e| CliError::internal(format!("Failed to listen for Ctrl-C: {}", e)))?;

    println!();
    print_aliveness_table(&tracker.snapshot());
    Ok(())
}
