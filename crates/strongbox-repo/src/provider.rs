//! Per-type repository providers
//!
//! Requests are dispatched on the repository type through a
//! [`ProviderRegistry`]; each provider implements resolve, fetch, store and
//! search for its type.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use strongbox_core::{Configuration, Repository, RepositoryType};

use crate::aliveness::RemoteRepositoryAlivenessTracker;
use crate::error::{RepoError, Result};
use crate::layout::{ArtifactReader, LayoutProvider, SearchCriteria};
use crate::remote::RemoteArtifactClient;
use crate::resolver::{GroupRepositoryResolver, ResolvedLocation, SearchHit};
use crate::routing::RoutingRulesEngine;

/// An open artifact and where it was found
pub struct Artifact {
    pub location: ResolvedLocation,
    pub reader: ArtifactReader,
}

impl Artifact {
    /// Read the whole content
    pub async fn into_bytes(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.reader.read_to_end(&mut data).await?;
        Ok(data)
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Type-specific repository behaviour
///
/// Paths are expected to be normalized already.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    fn repo_type(&self) -> RepositoryType;

    /// Where `path` can be read from, `None` when nothing serves it
    async fn resolve(
        &self,
        config: &Configuration,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<ResolvedLocation>>;

    /// Open `path` for reading
    async fn fetch(
        &self,
        config: &Configuration,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<Artifact>>;

    /// Write `path` from `content`
    async fn store(
        &self,
        config: &Configuration,
        repository: &Repository,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64>;

    async fn search(
        &self,
        config: &Configuration,
        repository: &Repository,
        criteria: &SearchCriteria,
    ) -> Result<Vec<SearchHit>>;

    async fn count(
        &self,
        config: &Configuration,
        repository: &Repository,
        criteria: &SearchCriteria,
    ) -> Result<usize> {
        Ok(self.search(config, repository, criteria).await?.len())
    }
}

fn direct_location(repository: &Repository, path: &str) -> ResolvedLocation {
    ResolvedLocation {
        repository: repository.clone(),
        path: path.to_string(),
        via: Vec::new(),
    }
}

async fn open(
    layout: &dyn LayoutProvider,
    location: ResolvedLocation,
) -> Result<Option<Artifact>> {
    Ok(layout
        .input_stream(&location.repository, &location.path)
        .await?
        .map(|reader| Artifact { location, reader }))
}

async fn list_hits(
    layout: &dyn LayoutProvider,
    repository: &Repository,
    criteria: &SearchCriteria,
) -> Result<Vec<SearchHit>> {
    Ok(layout
        .list_paths(repository, criteria)
        .await?
        .into_iter()
        .map(|path| SearchHit {
            path,
            repository: repository.key(),
        })
        .collect())
}

/// Out-of-service repositories serve nothing, listings included
fn in_service(repository: &Repository) -> bool {
    if !repository.is_in_service() {
        tracing::debug!(repository = %repository.key(), "Repository out of service");
        return false;
    }
    true
}

fn read_only(repository: &Repository) -> RepoError {
    RepoError::NotSupported {
        repository: repository.key().to_string(),
        repo_type: repository.repo_type.to_string(),
        operation: "store".to_string(),
    }
}

// ============ Hosted ============

/// Repositories backed by local storage only
pub struct HostedRepositoryProvider {
    layout: Arc<dyn LayoutProvider>,
}

impl HostedRepositoryProvider {
    pub fn new(layout: Arc<dyn LayoutProvider>) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl RepositoryProvider for HostedRepositoryProvider {
    fn repo_type(&self) -> RepositoryType {
        RepositoryType::Hosted
    }

    async fn resolve(
        &self,
        _config: &Configuration,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<ResolvedLocation>> {
        if !in_service(repository) {
            return Ok(None);
        }
        Ok(self
            .layout
            .contains_path(repository, path)
            .await?
            .then(|| direct_location(repository, path)))
    }

    async fn fetch(
        &self,
        config: &Configuration,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<Artifact>> {
        match self.resolve(config, repository, path).await? {
            Some(location) => open(self.layout.as_ref(), location).await,
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        _config: &Configuration,
        repository: &Repository,
        path: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64> {
        let rejected = |reason: &str| RepoError::DeploymentNotAllowed {
            repository: repository.key().to_string(),
            reason: reason.to_string(),
        };

        if !repository.is_in_service() {
            return Err(rejected("repository is out of service"));
        }
        if !repository.allows_deployment {
            return Err(rejected("deployment is disabled"));
        }
        if !repository.allows_redeployment && self.layout.contains_path(repository, path).await? {
            return Err(rejected(&format!("'{}' already exists and redeployment is disabled", path)));
        }

        let mut writer = self.layout.output_stream(repository, path).await?;
        let written = tokio::io::copy(content, &mut writer).await?;
        writer.shutdown().await?;

        tracing::info!(repository = %repository.key(), path, bytes = written, "Stored artifact");
        Ok(written)
    }

    async fn search(
        &self,
        _config: &Configuration,
        repository: &Repository,
        criteria: &SearchCriteria,
    ) -> Result<Vec<SearchHit>> {
        if !in_service(repository) {
            return Ok(Vec::new());
        }
        list_hits(self.layout.as_ref(), repository, criteria).await
    }
}

// ============ Proxy ============

/// Local cache in front of a remote repository
///
/// A cache miss is filled from the remote when the heartbeat reports it
/// alive. Remote failures are logged and reported as a miss.
pub struct ProxyRepositoryProvider {
    layout: Arc<dyn LayoutProvider>,
    tracker: Arc<RemoteRepositoryAlivenessTracker>,
    client: RemoteArtifactClient,
}

impl ProxyRepositoryProvider {
    pub fn new(
        layout: Arc<dyn LayoutProvider>,
        tracker: Arc<RemoteRepositoryAlivenessTracker>,
        client: RemoteArtifactClient,
    ) -> Self {
        Self {
            layout,
            tracker,
            client,
        }
    }

    /// Make sure `path` is in the cache, downloading it if possible
    pub async fn ensure_cached(&self, repository: &Repository, path: &str) -> Result<bool> {
        if self.layout.contains_path(repository, path).await? {
            return Ok(true);
        }

        let remote = repository
            .remote_repository
            .as_ref()
            .ok_or_else(|| RepoError::MissingRemote {
                repository: repository.key().to_string(),
            })?;
        if !self.tracker.is_alive(remote) {
            tracing::debug!(repository = %repository.key(), url = %remote.url, "Remote not alive, not downloading");
            return Ok(false);
        }

        let data = match self.client.download(remote, path).await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(false),
            Err(e) => {
                tracing::warn!(repository = %repository.key(), path, error = %e, "Remote download failed");
                return Ok(false);
            }
        };

        let mut writer = self.layout.output_stream(repository, path).await?;
        writer.write_all(&data).await?;
        writer.shutdown().await?;
        tracing::info!(repository = %repository.key(), path, bytes = data.len(), "Cached remote artifact");
        Ok(true)
    }
}

#[async_trait]
impl RepositoryProvider for ProxyRepositoryProvider {
    fn repo_type(&self) -> RepositoryType {
        RepositoryType::Proxy
    }

    async fn resolve(
        &self,
        _config: &Configuration,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<ResolvedLocation>> {
        if !in_service(repository) {
            return Ok(None);
        }
        Ok(self
            .ensure_cached(repository, path)
            .await?
            .then(|| direct_location(repository, path)))
    }

    async fn fetch(
        &self,
        config: &Configuration,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<Artifact>> {
        match self.resolve(config, repository, path).await? {
            Some(location) => open(self.layout.as_ref(), location).await,
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        _config: &Configuration,
        repository: &Repository,
        _path: &str,
        _content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64> {
        Err(read_only(repository))
    }

    async fn search(
        &self,
        _config: &Configuration,
        repository: &Repository,
        criteria: &SearchCriteria,
    ) -> Result<Vec<SearchHit>> {
        if !in_service(repository) {
            return Ok(Vec::new());
        }
        list_hits(self.layout.as_ref(), repository, criteria).await
    }
}

// ============ Group ============

/// Ordered aggregation of member repositories
///
/// Content already stored by a member is preferred; only when no member has
/// the path are proxy members asked to download it, in resolution order.
pub struct GroupRepositoryProvider {
    resolver: Arc<GroupRepositoryResolver>,
    proxy: Arc<ProxyRepositoryProvider>,
    layout: Arc<dyn LayoutProvider>,
}

impl GroupRepositoryProvider {
    pub fn new(
        resolver: Arc<GroupRepositoryResolver>,
        proxy: Arc<ProxyRepositoryProvider>,
        layout: Arc<dyn LayoutProvider>,
    ) -> Self {
        Self {
            resolver,
            proxy,
            layout,
        }
    }
}

#[async_trait]
impl RepositoryProvider for GroupRepositoryProvider {
    fn repo_type(&self) -> RepositoryType {
        RepositoryType::Group
    }

    async fn resolve(
        &self,
        config: &Configuration,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<ResolvedLocation>> {
        if !in_service(repository) {
            return Ok(None);
        }
        if let Some(location) = self.resolver.resolve(config, repository, path).await {
            return Ok(Some(location));
        }

        for candidate in self.resolver.candidates(config, repository, path) {
            if !candidate.repository.is_proxy() {
                continue;
            }
            match self.proxy.ensure_cached(&candidate.repository, path).await {
                Ok(true) => return Ok(Some(candidate)),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(repository = %candidate.key(), path, error = %e, "Proxy member failed");
                }
            }
        }
        Ok(None)
    }

    async fn fetch(
        &self,
        config: &Configuration,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<Artifact>> {
        match self.resolve(config, repository, path).await? {
            Some(location) => open(self.layout.as_ref(), location).await,
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        _config: &Configuration,
        repository: &Repository,
        _path: &str,
        _content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64> {
        Err(read_only(repository))
    }

    async fn search(
        &self,
        config: &Configuration,
        repository: &Repository,
        criteria: &SearchCriteria,
    ) -> Result<Vec<SearchHit>> {
        if !in_service(repository) {
            return Ok(Vec::new());
        }
        Ok(self.resolver.search(config, repository, criteria).await)
    }
}

// ============ Registry ============

/// Providers keyed by repository type
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<RepositoryType, Arc<dyn RepositoryProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosted, proxy and group providers sharing one layout
    pub fn standard(
        layout: Arc<dyn LayoutProvider>,
        rules: Arc<RoutingRulesEngine>,
        tracker: Arc<RemoteRepositoryAlivenessTracker>,
        client: RemoteArtifactClient,
    ) -> Self {
        let resolver = Arc::new(GroupRepositoryResolver::new(rules, tracker.clone(), layout.clone()));
        let proxy = Arc::new(ProxyRepositoryProvider::new(layout.clone(), tracker, client));

        let mut registry = Self::new();
        registry.register(Arc::new(HostedRepositoryProvider::new(layout.clone())));
        registry.register(proxy.clone());
        registry.register(Arc::new(GroupRepositoryProvider::new(resolver, proxy, layout)));
        registry
    }

    /// Register a provider, replacing the one for the same type
    pub fn register(&mut self, provider: Arc<dyn RepositoryProvider>) {
        self.providers.insert(provider.repo_type(), provider);
    }

    pub fn get(&self, repo_type: RepositoryType) -> Result<&Arc<dyn RepositoryProvider>> {
        self.providers
            .get(&repo_type)
            .ok_or_else(|| RepoError::ProviderNotRegistered {
                repo_type: repo_type.to_string(),
            })
    }

    pub fn for_repository(&self, repository: &Repository) -> Result<&Arc<dyn RepositoryProvider>> {
        self.get(repository.repo_type)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<String> = self.providers.keys().map(ToString::to_string).collect();
        types.sort();
        f.debug_struct("ProviderRegistry").field("types", &types).finish()
    }
}
