//! Strongbox configuration model
//!
//! Read from `~/.config/strongbox/strongbox.yaml` or an explicit path.
//! The file is owned by the operator; Strongbox never writes it back.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Rule set key applying to every group without a rule set of its own
pub const WILDCARD_GROUP: &str = "*";

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Instance identifier
    #[serde(default = "default_instance_id")]
    pub id: String,

    /// Heartbeat and aliveness settings
    #[serde(default)]
    pub remote_repositories_configuration: RemoteRepositoriesConfiguration,

    /// Accept/deny routing rules for group repositories
    #[serde(default)]
    pub routing_rules: RoutingRulesConfig,

    /// Configured storages
    #[serde(default)]
    pub storages: Vec<Storage>,
}

fn default_instance_id() -> String {
    "strongbox".to_string()
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            id: default_instance_id(),
            remote_repositories_configuration: RemoteRepositoriesConfiguration::default(),
            routing_rules: RoutingRulesConfig::default(),
            storages: Vec::new(),
        }
    }
}

impl Configuration {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path
    ///
    /// Relative storage base directories are resolved against the
    /// directory holding the configuration file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.finalize(path.parent());
        tracing::debug!(path = %path.display(), storages = config.storages.len(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.finalize(None);
        Ok(config)
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::ConfigNotFound {
            path: "<config dir>/strongbox/strongbox.yaml".to_string(),
        })?;
        Ok(config_dir.join("strongbox").join("strongbox.yaml"))
    }

    /// Attach storage ids to repositories and derive repository base directories
    fn finalize(&mut self, root: Option<&Path>) {
        for storage in &mut self.storages {
            if let (Some(root), Some(basedir)) = (root, storage.basedir.as_ref()) {
                if basedir.is_relative() {
                    storage.basedir = Some(root.join(basedir));
                }
            }
            for repo in &mut storage.repositories {
                repo.storage_id = storage.id.clone();
                match (&repo.basedir, &storage.basedir) {
                    (None, Some(storage_dir)) => {
                        repo.basedir = Some(storage_dir.join(&repo.id));
                    }
                    (Some(dir), Some(storage_dir)) if dir.is_relative() => {
                        repo.basedir = Some(storage_dir.join(dir));
                    }
                    _ => {}
                }
            }
        }
    }

    /// Add a repository, creating its storage when needed
    pub fn add_repository(&mut self, repo: Repository) {
        match self.storages.iter_mut().find(|s| s.id == repo.storage_id) {
            Some(storage) => storage.repositories.push(repo),
            None => {
                let mut storage = Storage::new(repo.storage_id.clone());
                storage.repositories.push(repo);
                self.storages.push(storage);
            }
        }
    }

    /// Get a storage by id
    pub fn storage(&self, id: &str) -> Option<&Storage> {
        self.storages.iter().find(|s| s.id == id)
    }

    /// Get a repository by storage and repository id
    pub fn repository(&self, storage_id: &str, repository_id: &str) -> Option<&Repository> {
        self.storage(storage_id)?
            .repositories
            .iter()
            .find(|r| r.id == repository_id)
    }

    /// Get a repository by key
    pub fn get(&self, key: &RepositoryKey) -> Option<&Repository> {
        self.repository(&key.storage_id, &key.repository_id)
    }

    /// Get a repository or fail with `RepositoryNotFound`
    pub fn require(&self, storage_id: &str, repository_id: &str) -> Result<&Repository> {
        if self.storage(storage_id).is_none() {
            return Err(CoreError::StorageNotFound {
                storage: storage_id.to_string(),
            });
        }
        self.repository(storage_id, repository_id)
            .ok_or_else(|| CoreError::RepositoryNotFound {
                storage: storage_id.to_string(),
                repository: repository_id.to_string(),
            })
    }

    /// Iterate over every repository of every storage
    pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
        self.storages.iter().flat_map(|s| s.repositories.iter())
    }

    /// Iterate over proxy repositories
    pub fn proxy_repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repositories().filter(|r| r.is_proxy())
    }

    /// Check the whole topology, returning the first problem or a summary of all of them
    pub fn validate(&self) -> Result<()> {
        let mut issues = self.validation_issues();
        match issues.len() {
            0 => Ok(()),
            1 => Err(issues.remove(0)),
            count => Err(CoreError::InvalidConfiguration {
                count,
                details: issues
                    .iter()
                    .map(|e| format!("  - {}", e))
                    .collect::<Vec<_>>()
                    .join("\n"),
            }),
        }
    }

    /// Collect every configuration problem
    pub fn validation_issues(&self) -> Vec<CoreError> {
        let mut issues = Vec::new();

        self.remote_repositories_configuration
            .collect_issues(&mut issues);

        let mut storage_ids = HashSet::new();
        for storage in &self.storages {
            if !storage_ids.insert(storage.id.as_str()) {
                issues.push(CoreError::DuplicateId {
                    kind: "storage".to_string(),
                    id: storage.id.clone(),
                });
            }

            let mut repo_ids = HashSet::new();
            for repo in &storage.repositories {
                if !repo_ids.insert(repo.id.as_str()) {
                    issues.push(CoreError::DuplicateId {
                        kind: "repository".to_string(),
                        id: repo.key().to_string(),
                    });
                }
                self.collect_repository_issues(repo, &mut issues);
            }
        }

        self.routing_rules.collect_issues(&mut issues);
        issues.extend(self.find_cycles());
        issues
    }

    fn collect_repository_issues(&self, repo: &Repository, issues: &mut Vec<CoreError>) {
        let key = repo.key();

        if !repo.is_group() && !repo.group_repositories.is_empty() {
            issues.push(CoreError::UnexpectedMembers {
                repository: key.to_string(),
            });
        }

        if repo.is_group() {
            for member in &repo.group_repositories {
                if self.get(&repo.member_key(member)).is_none() {
                    issues.push(CoreError::UnknownMember {
                        group: key.to_string(),
                        member: member.clone(),
                    });
                }
            }
        }

        if repo.is_proxy() {
            match &repo.remote_repository {
                None => issues.push(CoreError::MissingRemote {
                    repository: key.to_string(),
                }),
                Some(remote) => {
                    if let Err(e) = url::Url::parse(&remote.url) {
                        issues.push(CoreError::InvalidRemoteUrl {
                            repository: key.to_string(),
                            url: remote.url.clone(),
                            reason: e.to_string(),
                        });
                    }
                    if remote.check_interval_seconds == Some(0) {
                        issues.push(CoreError::NonPositiveSetting {
                            setting: format!("checkIntervalSeconds of {}", key),
                            value: 0,
                        });
                    }
                }
            }
        }
    }

    /// Depth-first search over group membership, reporting each cycle once
    fn find_cycles(&self) -> Vec<CoreError> {
        let mut marks = HashMap::new();
        let mut cycles = Vec::new();

        for repo in self.repositories().filter(|r| r.is_group()) {
            let mut stack = Vec::new();
            self.visit_for_cycles(repo, &mut marks, &mut stack, &mut cycles);
        }

        cycles
    }

    fn visit_for_cycles(
        &self,
        repo: &Repository,
        marks: &mut HashMap<RepositoryKey, VisitMark>,
        stack: &mut Vec<RepositoryKey>,
        cycles: &mut Vec<CoreError>,
    ) {
        let key = repo.key();
        match marks.get(&key) {
            Some(VisitMark::Done) => return,
            Some(VisitMark::InProgress) => {
                let start = stack.iter().position(|k| *k == key).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(ToString::to_string).collect();
                path.push(key.to_string());
                cycles.push(CoreError::CyclicGroup {
                    cycle: path.join(" -> "),
                });
                return;
            }
            None => {}
        }

        marks.insert(key.clone(), VisitMark::InProgress);
        stack.push(key.clone());

        for member in &repo.group_repositories {
            if let Some(member_repo) = self.get(&repo.member_key(member)) {
                if member_repo.is_group() {
                    self.visit_for_cycles(member_repo, marks, stack, cycles);
                }
            }
        }

        stack.pop();
        marks.insert(key, VisitMark::Done);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitMark {
    InProgress,
    Done,
}

/// Heartbeat, probe and aliveness cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepositoriesConfiguration {
    /// Default interval between two probes of the same remote
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,

    /// Maximum number of probes running at the same time
    #[serde(default = "default_heartbeat_threads")]
    pub heartbeat_threads_number: usize,

    /// Upper bound for a single probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,

    /// How long in-flight probes may keep running after shutdown is requested
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,

    /// Lifetime of an aliveness record
    #[serde(default = "default_aliveness_ttl")]
    pub aliveness_ttl_seconds: u64,

    /// Maximum number of aliveness records kept
    #[serde(default = "default_aliveness_max_entries")]
    pub aliveness_max_entries: usize,
}

fn default_check_interval() -> u64 {
    60
}

fn default_heartbeat_threads() -> usize {
    5
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_aliveness_ttl() -> u64 {
    3600
}

fn default_aliveness_max_entries() -> usize {
    10_000
}

impl Default for RemoteRepositoriesConfiguration {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            heartbeat_threads_number: default_heartbeat_threads(),
            probe_timeout_seconds: default_probe_timeout(),
            shutdown_grace_seconds: default_shutdown_grace(),
            aliveness_ttl_seconds: default_aliveness_ttl(),
            aliveness_max_entries: default_aliveness_max_entries(),
        }
    }
}

impl RemoteRepositoriesConfiguration {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn aliveness_ttl(&self) -> Duration {
        Duration::from_secs(self.aliveness_ttl_seconds)
    }

    /// Probe interval for a remote, falling back to the global default
    pub fn interval_for(&self, remote: &RemoteRepository) -> Duration {
        Duration::from_secs(
            remote
                .check_interval_seconds
                .unwrap_or(self.check_interval_seconds),
        )
    }

    fn collect_issues(&self, issues: &mut Vec<CoreError>) {
        let settings = [
            ("checkIntervalSeconds", self.check_interval_seconds),
            ("heartbeatThreadsNumber", self.heartbeat_threads_number as u64),
            ("probeTimeoutSeconds", self.probe_timeout_seconds),
            ("alivenessTtlSeconds", self.aliveness_ttl_seconds),
            ("alivenessMaxEntries", self.aliveness_max_entries as u64),
        ];
        for (setting, value) in settings {
            if value == 0 {
                issues.push(CoreError::NonPositiveSetting {
                    setting: setting.to_string(),
                    value,
                });
            }
        }
    }
}

/// Routing rules as written in the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRulesConfig {
    /// Rule sets listing which members may serve matching paths
    #[serde(default)]
    pub accepted: Vec<RuleSetConfig>,

    /// Rule sets listing which members must never serve matching paths
    #[serde(default)]
    pub denied: Vec<RuleSetConfig>,
}

impl RoutingRulesConfig {
    fn collect_issues(&self, issues: &mut Vec<CoreError>) {
        for (partition, rule_sets) in [("accepted", &self.accepted), ("denied", &self.denied)] {
            let mut groups = HashSet::new();
            for rule_set in rule_sets {
                if !groups.insert(rule_set.group_repository.as_str()) {
                    issues.push(CoreError::DuplicateId {
                        kind: format!("{} rule set", partition),
                        id: rule_set.group_repository.clone(),
                    });
                }
                for rule in &rule_set.rules {
                    if let Err(e) = regex::Regex::new(&rule.pattern) {
                        issues.push(CoreError::InvalidPattern {
                            group: rule_set.group_repository.clone(),
                            pattern: rule.pattern.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Rules owned by one group repository (or the wildcard)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetConfig {
    /// Owning group repository id, or `*`
    pub group_repository: String,

    #[serde(default)]
    pub rules: Vec<RoutingRuleConfig>,
}

/// A single pattern applying to a set of member repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRuleConfig {
    /// Regular expression matched against the artifact path
    pub pattern: String,

    /// Member repository ids the rule applies to
    #[serde(default)]
    pub repositories: Vec<String>,
}

impl RoutingRuleConfig {
    pub fn new<I, S>(pattern: impl Into<String>, repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: pattern.into(),
            repositories: repositories.into_iter().map(Into::into).collect(),
        }
    }
}

/// Storage definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    /// Unique storage id
    pub id: String,

    /// Root directory; repositories default to `<basedir>/<repositoryId>`
    #[serde(default)]
    pub basedir: Option<PathBuf>,

    #[serde(default)]
    pub repositories: Vec<Repository>,
}

impl Storage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            basedir: None,
            repositories: Vec::new(),
        }
    }
}

/// Repository definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Repository id, unique within its storage
    pub id: String,

    /// Owning storage (filled in when the configuration is loaded)
    #[serde(skip)]
    pub storage_id: String,

    #[serde(rename = "type", default)]
    pub repo_type: RepositoryType,

    /// Artifact coordinate scheme (opaque)
    #[serde(default = "default_layout")]
    pub layout: String,

    #[serde(default)]
    pub status: RepositoryStatus,

    /// Directory holding the artifacts of hosted repositories and proxy caches
    #[serde(default)]
    pub basedir: Option<PathBuf>,

    /// Ordered member references (`repo` or `storage:repo`), groups only
    #[serde(default)]
    pub group_repositories: Vec<String>,

    /// Upstream descriptor, proxies only
    #[serde(default)]
    pub remote_repository: Option<RemoteRepository>,

    #[serde(default)]
    pub indexing_enabled: bool,

    #[serde(default = "default_true")]
    pub allows_deployment: bool,

    #[serde(default)]
    pub allows_redeployment: bool,

    #[serde(default = "default_true")]
    pub allows_delete: bool,

    #[serde(default = "default_true")]
    pub allows_directory_browsing: bool,
}

fn default_layout() -> String {
    "maven2".to_string()
}

fn default_true() -> bool {
    true
}

impl Repository {
    fn with_type(
        storage_id: impl Into<String>,
        id: impl Into<String>,
        repo_type: RepositoryType,
    ) -> Self {
        Self {
            id: id.into(),
            storage_id: storage_id.into(),
            repo_type,
            layout: default_layout(),
            status: RepositoryStatus::InService,
            basedir: None,
            group_repositories: Vec::new(),
            remote_repository: None,
            indexing_enabled: false,
            allows_deployment: true,
            allows_redeployment: false,
            allows_delete: true,
            allows_directory_browsing: true,
        }
    }

    /// Create a hosted repository
    pub fn hosted(storage_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self::with_type(storage_id, id, RepositoryType::Hosted)
    }

    /// Create a proxy repository mirroring `url`
    pub fn proxy(
        storage_id: impl Into<String>,
        id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let mut repo = Self::with_type(storage_id, id, RepositoryType::Proxy);
        repo.allows_deployment = false;
        repo.remote_repository = Some(RemoteRepository::new(url));
        repo
    }

    /// Create a group repository over ordered members
    pub fn group<I, S>(storage_id: impl Into<String>, id: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut repo = Self::with_type(storage_id, id, RepositoryType::Group);
        repo.allows_deployment = false;
        repo.group_repositories = members.into_iter().map(Into::into).collect();
        repo
    }

    pub fn with_basedir(mut self, basedir: impl Into<PathBuf>) -> Self {
        self.basedir = Some(basedir.into());
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    pub fn with_remote(mut self, remote: RemoteRepository) -> Self {
        self.remote_repository = Some(remote);
        self
    }

    pub fn out_of_service(mut self) -> Self {
        self.status = RepositoryStatus::OutOfService;
        self
    }

    pub fn key(&self) -> RepositoryKey {
        RepositoryKey::new(&self.storage_id, &self.id)
    }

    /// Resolve a member reference relative to this repository's storage
    pub fn member_key(&self, reference: &str) -> RepositoryKey {
        RepositoryKey::member(&self.storage_id, reference)
    }

    pub fn is_group(&self) -> bool {
        matches!(self.repo_type, RepositoryType::Group)
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.repo_type, RepositoryType::Proxy)
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self.repo_type, RepositoryType::Hosted)
    }

    pub fn is_in_service(&self) -> bool {
        matches!(self.status, RepositoryStatus::InService)
    }
}

/// Repository type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Backed by local storage
    #[default]
    Hosted,

    /// Mirrors a remote repository
    Proxy,

    /// Aggregates member repositories
    Group,
}

impl RepositoryType {
    pub const ALL: [RepositoryType; 3] = [
        RepositoryType::Hosted,
        RepositoryType::Proxy,
        RepositoryType::Group,
    ];
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryType::Hosted => write!(f, "hosted"),
            RepositoryType::Proxy => write!(f, "proxy"),
            RepositoryType::Group => write!(f, "group"),
        }
    }
}

/// Whether a repository takes part in request handling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepositoryStatus {
    #[default]
    InService,
    OutOfService,
}

/// Upstream descriptor of a proxy repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepository {
    pub url: String,

    /// Overrides the global heartbeat interval
    #[serde(default)]
    pub check_interval_seconds: Option<u64>,

    /// Whether the remote answers requests on directory URLs
    #[serde(default = "default_true")]
    pub allows_directory_browsing: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl RemoteRepository {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            check_interval_seconds: None,
            allows_directory_browsing: true,
            username: None,
            password: None,
        }
    }

    pub fn with_check_interval(mut self, seconds: u64) -> Self {
        self.check_interval_seconds = Some(seconds);
        self
    }

    pub fn not_browsable(mut self) -> Self {
        self.allows_directory_browsing = false;
        self
    }

    /// Identity of this remote for aliveness caching
    pub fn cache_key(&self) -> String {
        self.url.trim().trim_end_matches('/').to_string()
    }
}

/// `(storageId, repositoryId)` identity of a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryKey {
    pub storage_id: String,
    pub repository_id: String,
}

impl RepositoryKey {
    pub fn new(storage_id: impl Into<String>, repository_id: impl Into<String>) -> Self {
        Self {
            storage_id: storage_id.into(),
            repository_id: repository_id.into(),
        }
    }

    /// Parse a member reference; bare ids live in `default_storage`
    pub fn member(default_storage: &str, reference: &str) -> Self {
        match reference.split_once(':') {
            Some((storage, repo)) => Self::new(storage, repo),
            None => Self::new(default_storage, reference),
        }
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.storage_id, self.repository_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
id: test-instance
remoteRepositoriesConfiguration:
  checkIntervalSeconds: 30
  heartbeatThreadsNumber: 2
routingRules:
  denied:
    - groupRepository: "*"
      rules:
        - pattern: ".*\\.tmp$"
          repositories: [releases]
storages:
  - id: storage0
    basedir: /var/strongbox/storage0
    repositories:
      - id: releases
        type: hosted
      - id: central
        type: proxy
        remoteRepository:
          url: https://repo.maven.apache.org/maven2/
          checkIntervalSeconds: 120
      - id: public
        type: group
        groupRepositories: [releases, central, "storage1:snapshots"]
  - id: storage1
    repositories:
      - id: snapshots
        basedir: /data/snapshots
"#;

    fn sample() -> Configuration {
        Configuration::from_yaml(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_configuration() {
        let config = sample();
        assert_eq!(config.id, "test-instance");
        assert_eq!(config.storages.len(), 2);
        assert_eq!(config.remote_repositories_configuration.check_interval_seconds, 30);
        assert_eq!(config.remote_repositories_configuration.probe_timeout_seconds, 10);
        assert_eq!(config.routing_rules.denied.len(), 1);

        let central = config.repository("storage0", "central").unwrap();
        assert!(central.is_proxy());
        assert_eq!(central.storage_id, "storage0");
        assert_eq!(
            central.remote_repository.as_ref().unwrap().check_interval_seconds,
            Some(120)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_basedir_defaults() {
        let config = sample();
        let releases = config.repository("storage0", "releases").unwrap();
        assert_eq!(
            releases.basedir.as_deref(),
            Some(Path::new("/var/strongbox/storage0/releases"))
        );

        let snapshots = config.repository("storage1", "snapshots").unwrap();
        assert_eq!(snapshots.basedir.as_deref(), Some(Path::new("/data/snapshots")));
    }

    #[test]
    fn test_relative_basedir_resolved_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strongbox.yaml");
        std::fs::write(
            &path,
            "storages:\n  - id: s\n    basedir: data\n    repositories:\n      - id: r\n",
        )
        .unwrap();

        let config = Configuration::load_from(&path).unwrap();
        let repo = config.repository("s", "r").unwrap();
        assert_eq!(repo.basedir.as_deref(), Some(dir.path().join("data").join("r").as_path()));
    }

    #[test]
    fn test_missing_file() {
        let err = Configuration::load_from(Path::new("/nonexistent/strongbox.yaml")).unwrap_err();
        assert!(matches!(err, CoreError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_member_key() {
        let group = Repository::group("storage0", "public", ["releases", "storage1:snapshots"]);
        assert_eq!(group.member_key("releases"), RepositoryKey::new("storage0", "releases"));
        assert_eq!(
            group.member_key("storage1:snapshots"),
            RepositoryKey::new("storage1", "snapshots")
        );
        assert_eq!(group.member_key("storage1:snapshots").to_string(), "storage1:snapshots");
    }

    #[test]
    fn test_require() {
        let config = sample();
        assert!(config.require("storage0", "releases").is_ok());
        assert!(matches!(
            config.require("nope", "releases"),
            Err(CoreError::StorageNotFound { .. })
        ));
        assert!(matches!(
            config.require("storage0", "nope"),
            Err(CoreError::RepositoryNotFound { .. })
        ));
    }

    #[test]
    fn test_detects_direct_cycle() {
        let mut config = Configuration::default();
        config.add_repository(Repository::group("s", "a", ["b"]));
        config.add_repository(Repository::group("s", "b", ["a"]));

        let issues = config.validation_issues();
        assert_eq!(issues.len(), 1);
        match &issues[0] {
            CoreError::CyclicGroup { cycle } => assert_eq!(cycle, "s:a -> s:b -> s:a"),
            other => panic!("Expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_detects_self_membership() {
        let mut config = Configuration::default();
        config.add_repository(Repository::group("s", "a", ["a"]));
        assert!(matches!(config.validate(), Err(CoreError::CyclicGroup { .. })));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut config = Configuration::default();
        config.add_repository(Repository::hosted("s", "leaf"));
        config.add_repository(Repository::group("s", "left", ["leaf"]));
        config.add_repository(Repository::group("s", "right", ["leaf"]));
        config.add_repository(Repository::group("s", "top", ["left", "right"]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_topology_issues() {
        let mut config = Configuration::default();
        let mut proxy = Repository::proxy("s", "p", "https://example.com");
        proxy.remote_repository = None;
        config.add_repository(proxy);
        config.add_repository(Repository::group("s", "g", ["missing"]));
        let mut hosted = Repository::hosted("s", "h");
        hosted.group_repositories.push("p".to_string());
        config.add_repository(hosted);

        let issues = config.validation_issues();
        assert!(issues.iter().any(|e| matches!(e, CoreError::MissingRemote { .. })));
        assert!(issues.iter().any(|e| matches!(e, CoreError::UnknownMember { .. })));
        assert!(issues.iter().any(|e| matches!(e, CoreError::UnexpectedMembers { .. })));

        match config.validate() {
            Err(CoreError::InvalidConfiguration { count, .. }) => assert_eq!(count, 3),
            other => panic!("Expected aggregated error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = Configuration::default();
        config.remote_repositories_configuration.check_interval_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::NonPositiveSetting { value: 0, .. })
        ));

        let mut config = Configuration::default();
        config.add_repository(
            Repository::proxy("s", "p", "https://example.com")
                .with_remote(RemoteRepository::new("https://example.com").with_check_interval(0)),
        );
        assert!(matches!(config.validate(), Err(CoreError::NonPositiveSetting { .. })));

        let mut config = Configuration::default();
        config.remote_repositories_configuration.heartbeat_threads_number = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut config = Configuration::default();
        config.routing_rules.accepted.push(RuleSetConfig {
            group_repository: "public".to_string(),
            rules: vec![RoutingRuleConfig::new("(unclosed", ["releases"])],
        });
        assert!(matches!(config.validate(), Err(CoreError::InvalidPattern { .. })));
    }

    #[test]
    fn test_duplicate_rule_set_rejected() {
        let mut config = Configuration::default();
        for _ in 0..2 {
            config.routing_rules.denied.push(RuleSetConfig {
                group_repository: WILDCARD_GROUP.to_string(),
                rules: vec![],
            });
        }
        assert!(matches!(config.validate(), Err(CoreError::DuplicateId { .. })));
    }

    #[test]
    fn test_interval_for() {
        let settings = RemoteRepositoriesConfiguration::default();
        let remote = RemoteRepository::new("https://example.com");
        assert_eq!(settings.interval_for(&remote), Duration::from_secs(60));
        let remote = remote.with_check_interval(5);
        assert_eq!(settings.interval_for(&remote), Duration::from_secs(5));
    }

    #[test]
    fn test_remote_cache_key() {
        assert_eq!(
            RemoteRepository::new("https://repo.example.com/maven2/").cache_key(),
            "https://repo.example.com/maven2"
        );
    }
}
