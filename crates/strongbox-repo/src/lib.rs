//! Strongbox repository routing and resolution
//!
//! This crate decides where an artifact request is served from:
//!
//! - **Routing rules**: accept/deny patterns per group repository, with a
//!   `*` wildcard fallback
//! - **Group resolution**: ordered, depth-first walk of nested groups
//! - **Aliveness**: TTL cache of remote reachability fed by a heartbeat
//!   scheduler
//! - **Providers**: hosted, proxy and group behaviour dispatched by type
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strongbox_core::ConfigurationManager;
//! use strongbox_repo::{
//!     ArtifactResolutionService, FileSystemLayoutProvider, RemoteRepositoryAlivenessTracker,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Arc::new(ConfigurationManager::load_from("strongbox.yaml".as_ref())?);
//! let tracker = Arc::new(RemoteRepositoryAlivenessTracker::from_settings(
//!     &manager.get_configuration().remote_repositories_configuration,
//! ));
//! let service = ArtifactResolutionService::new(
//!     manager,
//!     Arc::new(FileSystemLayoutProvider::new()),
//!     tracker,
//! )?;
//!
//! if let Some(location) = service
//!     .resolve_for_fetch("storage0", "public", "org/foo/1.0/foo-1.0.jar")
//!     .await?
//! {
//!     println!("served by {}", location.key());
//! }
//! # Ok(())
//! # }
//! ```

pub mod aliveness;
pub mod error;
pub mod heartbeat;
pub mod layout;
pub mod provider;
pub mod remote;
pub mod resolver;
pub mod routing;
pub mod service;

// Re-exports for convenience
pub use aliveness::{AlivenessStatus, RemoteRepositoryAlivenessTracker};
pub use error::{RepoError, Result};
pub use heartbeat::{
    BrowsableHeartbeatStrategy, HeartbeatSettings, HeartbeatStrategyRegistry, HeartbeatTarget,
    PingHeartbeatStrategy, ProbeOutcome, RemoteHeartbeatStrategy,
    RemoteRepositoryHeartbeatScheduler,
};
pub use layout::{
    ArtifactReader, ArtifactWriter, FileSystemLayoutProvider, LayoutProvider, SearchCriteria,
    normalize_path,
};
pub use provider::{
    Artifact, GroupRepositoryProvider, HostedRepositoryProvider, ProviderRegistry,
    ProxyRepositoryProvider, RepositoryProvider,
};
pub use remote::RemoteArtifactClient;
pub use resolver::{GroupRepositoryResolver, ResolvedLocation, SearchHit};
pub use routing::{
    RoutingDecision, RoutingRule, RoutingRules, RoutingRulesEngine, RulePartition, RuleSet,
};
pub use service::{ArtifactResolutionService, MemberDecision};
