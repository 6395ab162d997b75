//! CLI commands

pub mod heartbeat;
pub mod resolve;
pub mod rules;
pub mod search;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use strongbox_core::{Configuration, ConfigurationManager};
use strongbox_repo::{
    ArtifactResolutionService, FileSystemLayoutProvider, RemoteRepositoryAlivenessTracker,
    RemoteRepositoryHeartbeatScheduler,
};

use crate::error::Result;

/// Read the configuration file without validating it
pub fn load_configuration(path: Option<&Path>) -> Result<Configuration> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Configuration::default_path()?,
    };
    Ok(Configuration::load_from(&path)?)
}

/// Validated configuration wired to the filesystem layout and a fresh aliveness cache
pub fn build_service(path: Option<&Path>) -> Result<ArtifactResolutionService> {
    let config = load_configuration(path)?;
    let tracker = Arc::new(RemoteRepositoryAlivenessTracker::from_settings(
        &config.remote_repositories_configuration,
    ));
    let manager = Arc::new(ConfigurationManager::new(config)?);
    Ok(ArtifactResolutionService::new(
        manager,
        Arc::new(FileSystemLayoutProvider::new()),
        tracker,
    )?)
}

/// Probe every remote once so proxies can take part in resolution
pub async fn probe_remotes(service: &ArtifactResolutionService) -> Result<()> {
    let config = service.configuration();
    let scheduler =
        RemoteRepositoryHeartbeatScheduler::from_config(&config, service.tracker().clone())?;
    let outcomes = scheduler.probe_all_once(&config).await?;
    tracing::debug!(remotes = outcomes.len(), "Remote repositories probed");
    Ok(())
}
