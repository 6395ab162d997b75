//! Entry point for artifact requests
//!
//! Every call takes one configuration snapshot, looks the repository up,
//! normalizes the path and hands over to the provider for the repository's
//! type. A reload never overlaps a call, so each call sees a configuration
//! together with the routing rules compiled from it.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::RwLock;

use strongbox_core::{Configuration, ConfigurationManager, Repository, RepositoryKey};

use crate::aliveness::RemoteRepositoryAlivenessTracker;
use crate::error::Result;
use crate::layout::{LayoutProvider, SearchCriteria, normalize_path};
use crate::provider::{Artifact, ProviderRegistry};
use crate::remote::RemoteArtifactClient;
use crate::resolver::{GroupRepositoryResolver, ResolvedLocation, SearchHit};
use crate::routing::{RoutingDecision, RoutingRules, RoutingRulesEngine};

/// Upper bound for one remote artifact download
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Routing decision for one direct member of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDecision {
    pub member: RepositoryKey,
    pub decision: RoutingDecision,
}

pub struct ArtifactResolutionService {
    configuration: Arc<ConfigurationManager>,
    rules: Arc<RoutingRulesEngine>,
    tracker: Arc<RemoteRepositoryAlivenessTracker>,
    resolver: GroupRepositoryResolver,
    registry: ProviderRegistry,
    /// Held shared by calls and exclusively by `reload`
    reload_gate: RwLock<()>,
}

impl ArtifactResolutionService {
    /// Service over the current configuration with the standard providers
    pub fn new(
        configuration: Arc<ConfigurationManager>,
        layout: Arc<dyn LayoutProvider>,
        tracker: Arc<RemoteRepositoryAlivenessTracker>,
    ) -> Result<Self> {
        let config = configuration.get_configuration();
        let rules = Arc::new(RoutingRulesEngine::from_config(&config.routing_rules)?);
        let client = RemoteArtifactClient::new(DOWNLOAD_TIMEOUT)?;
        let registry =
            ProviderRegistry::standard(layout.clone(), rules.clone(), tracker.clone(), client);
        Ok(Self::with_registry(configuration, rules, tracker, layout, registry))
    }

    /// Service with caller-supplied providers
    pub fn with_registry(
        configuration: Arc<ConfigurationManager>,
        rules: Arc<RoutingRulesEngine>,
        tracker: Arc<RemoteRepositoryAlivenessTracker>,
        layout: Arc<dyn LayoutProvider>,
        registry: ProviderRegistry,
    ) -> Self {
        let resolver = GroupRepositoryResolver::new(rules.clone(), tracker.clone(), layout);
        Self {
            configuration,
            rules,
            tracker,
            resolver,
            registry,
            reload_gate: RwLock::new(()),
        }
    }

    pub fn configuration(&self) -> Arc<Configuration> {
        self.configuration.get_configuration()
    }

    pub fn rules(&self) -> &Arc<RoutingRulesEngine> {
        &self.rules
    }

    pub fn tracker(&self) -> &Arc<RemoteRepositoryAlivenessTracker> {
        &self.tracker
    }

    /// Validate and install a new configuration, recompiling its routing rules
    ///
    /// Administrative rule changes made since the last load are discarded.
    /// Waits for in-flight calls; calls made meanwhile wait for the swap.
    pub async fn reload(&self, config: Configuration) -> Result<()> {
        let rules = RoutingRules::from_config(&config.routing_rules)?;
        let _gate = self.reload_gate.write().await;
        self.configuration.reload(config)?;
        self.rules.replace_all(rules);
        Ok(())
    }

    /// Where a read of `path` would be served from
    pub async fn resolve_for_fetch(
        &self,
        storage_id: &str,
        repository_id: &str,
        path: &str,
    ) -> Result<Option<ResolvedLocation>> {
        let _gate = self.reload_gate.read().await;
        let config = self.configuration();
        let repository = config.require(storage_id, repository_id)?;
        let path = normalize_path(path)?;

        self.registry
            .for_repository(repository)?
            .resolve(&config, repository, &path)
            .await
    }

    /// Artifacts visible through a repository
    pub async fn resolve_for_search(
        &self,
        storage_id: &str,
        repository_id: &str,
        criteria: &SearchCriteria,
    ) -> Result<Vec<SearchHit>> {
        let _gate = self.reload_gate.read().await;
        let config = self.configuration();
        let repository = config.require(storage_id, repository_id)?;

        self.registry
            .for_repository(repository)?
            .search(&config, repository, criteria)
            .await
    }

    pub async fn fetch(
        &self,
        storage_id: &str,
        repository_id: &str,
        path: &str,
    ) -> Result<Option<Artifact>> {
        let _gate = self.reload_gate.read().await;
        let config = self.configuration();
        let repository = config.require(storage_id, repository_id)?;
        let path = normalize_path(path)?;

        self.registry
            .for_repository(repository)?
            .fetch(&config, repository, &path)
            .await
    }

    /// Deploy an artifact, returning the number of bytes written
    pub async fn store(
        &self,
        storage_id: &str,
        repository_id: &str,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64> {
        let _gate = self.reload_gate.read().await;
        let config = self.configuration();
        let repository = config.require(storage_id, repository_id)?;
        let path = normalize_path(path)?;

        self.registry
            .for_repository(repository)?
            .store(&config, repository, &path, content)
            .await
    }

    pub async fn count(
        &self,
        storage_id: &str,
        repository_id: &str,
        criteria: &SearchCriteria,
    ) -> Result<usize> {
        let _gate = self.reload_gate.read().await;
        let config = self.configuration();
        let repository = config.require(storage_id, repository_id)?;

        self.registry
            .for_repository(repository)?
            .count(&config, repository, criteria)
            .await
    }

    /// Repositories a read of `path` would try, in order
    ///
    /// For hosted and proxy repositories this is the repository itself.
    pub async fn resolution_path(
        &self,
        storage_id: &str,
        repository_id: &str,
        path: &str,
    ) -> Result<Vec<RepositoryKey>> {
        let _gate = self.reload_gate.read().await;
        let config = self.configuration();
        let repository = config.require(storage_id, repository_id)?;
        let path = normalize_path(path)?;

        if repository.is_group() {
            Ok(self.resolver.resolution_path(&config, repository, &path))
        } else {
            Ok(vec![repository.key()])
        }
    }

    /// Routing decision of each direct member of a group for `path`
    pub async fn explain(
        &self,
        storage_id: &str,
        repository_id: &str,
        path: &str,
    ) -> Result<Vec<MemberDecision>> {
        let _gate = self.reload_gate.read().await;
        let config = self.configuration();
        let group = config.require(storage_id, repository_id)?;
        let path = normalize_path(path)?;

        Ok(members(group)
            .map(|member| MemberDecision {
                decision: self.rules.evaluate(&group.id, &member.repository_id, &path),
                member,
            })
            .collect())
    }
}

fn members(group: &Repository) -> impl Iterator<Item = RepositoryKey> + '_ {
    group
        .group_repositories
        .iter()
        .map(|reference| group.member_key(reference))
}

impl std::fmt::Debug for ArtifactResolutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactResolutionService")
            .field("registry", &self.registry)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
