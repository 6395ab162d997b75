//! Group repository resolution
//!
//! Members are walked depth-first, left to right. A member is skipped when a
//! deny rule of the group holding it matches the path, when it is out of
//! service, when it is a proxy whose remote is not known to be alive, or
//! when it was already visited. Nested groups are walked in place. The first
//! remaining repository that contains the path wins.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use strongbox_core::{Configuration, Repository, RepositoryKey, RepositoryType};

use crate::aliveness::RemoteRepositoryAlivenessTracker;
use crate::layout::{LayoutProvider, SearchCriteria};
use crate::routing::RoutingRulesEngine;

/// Where a group request ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Hosted or proxy repository serving the path
    pub repository: Repository,
    pub path: String,
    /// Groups traversed to reach `repository`, outermost first
    pub via: Vec<RepositoryKey>,
}

impl ResolvedLocation {
    pub fn key(&self) -> RepositoryKey {
        self.repository.key()
    }
}

/// One artifact found by a group search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub path: String,
    pub repository: RepositoryKey,
}

/// `member` reached through `group`
#[derive(Debug, Clone, Copy)]
struct Link<'c> {
    group: &'c Repository,
    member: &'c Repository,
}

#[derive(Debug, Clone)]
struct Candidate<'c> {
    repository: &'c Repository,
    links: Vec<Link<'c>>,
}

impl Candidate<'_> {
    fn into_location(self, path: &str) -> ResolvedLocation {
        ResolvedLocation {
            repository: self.repository.clone(),
            path: path.to_string(),
            via: self.links.iter().map(|link| link.group.key()).collect(),
        }
    }
}

/// Resolves paths requested from group repositories
pub struct GroupRepositoryResolver {
    rules: Arc<RoutingRulesEngine>,
    tracker: Arc<RemoteRepositoryAlivenessTracker>,
    layout: Arc<dyn LayoutProvider>,
}

impl GroupRepositoryResolver {
    pub fn new(
        rules: Arc<RoutingRulesEngine>,
        tracker: Arc<RemoteRepositoryAlivenessTracker>,
        layout: Arc<dyn LayoutProvider>,
    ) -> Self {
        Self {
            rules,
            tracker,
            layout,
        }
    }

    pub fn rules(&self) -> &Arc<RoutingRulesEngine> {
        &self.rules
    }

    pub fn tracker(&self) -> &Arc<RemoteRepositoryAlivenessTracker> {
        &self.tracker
    }

    /// Leaf repositories that may serve `path`, in resolution order
    ///
    /// Only routing and aliveness are considered; storage is not consulted.
    pub fn candidates(
        &self,
        config: &Configuration,
        group: &Repository,
        path: &str,
    ) -> Vec<ResolvedLocation> {
        self.walk(config, group, Some(path))
            .into_iter()
            .map(|candidate| candidate.into_location(path))
            .collect()
    }

    /// Keys of [`candidates`](Self::candidates)
    pub fn resolution_path(
        &self,
        config: &Configuration,
        group: &Repository,
        path: &str,
    ) -> Vec<RepositoryKey> {
        self.walk(config, group, Some(path))
            .into_iter()
            .map(|candidate| candidate.repository.key())
            .collect()
    }

    /// First candidate whose storage contains `path`
    pub async fn resolve(
        &self,
        config: &Configuration,
        group: &Repository,
        path: &str,
    ) -> Option<ResolvedLocation> {
        for candidate in self.walk(config, group, Some(path)) {
            match self.layout.contains_path(candidate.repository, path).await {
                Ok(true) => {
                    tracing::debug!(
                        group = %group.key(),
                        repository = %candidate.repository.key(),
                        path,
                        "Resolved group path"
                    );
                    return Some(candidate.into_location(path));
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        repository = %candidate.repository.key(),
                        path,
                        error = %e,
                        "Member lookup failed, skipping"
                    );
                }
            }
        }

        tracing::debug!(group = %group.key(), path, "Path not found in group");
        None
    }

    /// Artifacts of every member matching `criteria`
    ///
    /// Each listed path is reported once, for the member a fetch of that
    /// path would resolve to, so a path is visible exactly when it can be
    /// fetched through the group. Results are sorted by path.
    pub async fn search(
        &self,
        config: &Configuration,
        group: &Repository,
        criteria: &SearchCriteria,
    ) -> Vec<SearchHit> {
        // Every member reachable for some path, with what it stores
        let mut listed: BTreeMap<String, HashSet<RepositoryKey>> = BTreeMap::new();
        for candidate in self.walk(config, group, None) {
            let paths = match self.layout.list_paths(candidate.repository, criteria).await {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::warn!(
                        repository = %candidate.repository.key(),
                        error = %e,
                        "Member listing failed, skipping"
                    );
                    continue;
                }
            };
            let key = candidate.repository.key();
            for path in paths {
                listed.entry(path).or_default().insert(key.clone());
            }
        }

        listed
            .into_iter()
            .filter_map(|(path, holders)| {
                let winner = self
                    .walk(config, group, Some(&path))
                    .into_iter()
                    .find(|candidate| holders.contains(&candidate.repository.key()))?;
                Some(SearchHit {
                    repository: winner.repository.key(),
                    path,
                })
            })
            .collect()
    }

    /// Depth-first walk; `path` enables deny pruning
    fn walk<'c>(
        &self,
        config: &'c Configuration,
        group: &'c Repository,
        path: Option<&str>,
    ) -> Vec<Candidate<'c>> {
        let mut visited = HashSet::from([group.key()]);
        let mut links = Vec::new();
        let mut candidates = Vec::new();
        self.visit(config, group, path, &mut visited, &mut links, &mut candidates);
        candidates
    }

    fn visit<'c>(
        &self,
        config: &'c Configuration,
        group: &'c Repository,
        path: Option<&str>,
        visited: &mut HashSet<RepositoryKey>,
        links: &mut Vec<Link<'c>>,
        candidates: &mut Vec<Candidate<'c>>,
    ) {
        for reference in &group.group_repositories {
            let key = group.member_key(reference);
            let Some(member) = config.get(&key) else {
                tracing::warn!(group = %group.key(), member = %key, "Unknown group member");
                continue;
            };

            if let Some(path) = path {
                if self.rules.is_denied(&group.id, &member.id, path) {
                    tracing::trace!(group = %group.id, member = %member.id, path, "Member denied");
                    continue;
                }
            }

            if !visited.insert(key) {
                continue;
            }

            if !member.is_in_service() {
                tracing::trace!(member = %member.key(), "Member out of service");
                continue;
            }

            links.push(Link { group, member });
            match member.repo_type {
                RepositoryType::Group => {
                    self.visit(config, member, path, visited, links, candidates);
                }
                RepositoryType::Proxy if !self.is_reachable(member) => {
                    tracing::trace!(member = %member.key(), "Proxy remote not alive");
                }
                RepositoryType::Proxy | RepositoryType::Hosted => {
                    candidates.push(Candidate {
                        repository: member,
                        links: links.clone(),
                    });
                }
            }
            links.pop();
        }
    }

    fn is_reachable(&self, proxy: &Repository) -> bool {
        proxy
            .remote_repository
            .as_ref()
            .is_some_and(|remote| self.tracker.is_alive(remote))
    }
}

impl std::fmt::Debug for GroupRepositoryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupRepositoryResolver")
            .field("rules", &self.rules)
            .field("tracker_entries", &self.tracker.len())
            .finish()
    }
}
