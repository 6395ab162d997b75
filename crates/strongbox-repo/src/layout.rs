//! Physical storage of artifacts
//!
//! Artifact paths are opaque, `/`-separated and relative to the repository.
//! A `LayoutProvider` maps them onto some storage; the filesystem one below
//! keeps each repository under its base directory.

use async_trait::async_trait;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};
use walkdir::WalkDir;

use strongbox_core::Repository;

use crate::error::{RepoError, Result};
use crate::routing::full_match_regex;

/// Open artifact content
pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

/// Sink for new artifact content
pub type ArtifactWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Storage access for one repository at a time
#[async_trait]
pub trait LayoutProvider: Send + Sync {
    async fn contains_path(&self, repository: &Repository, path: &str) -> Result<bool>;

    /// `None` when the artifact does not exist
    async fn input_stream(&self, repository: &Repository, path: &str)
    -> Result<Option<ArtifactReader>>;

    /// Create or truncate the artifact
    async fn output_stream(&self, repository: &Repository, path: &str) -> Result<ArtifactWriter>;

    /// Artifact paths matching `criteria`, sorted
    async fn list_paths(
        &self,
        repository: &Repository,
        criteria: &SearchCriteria,
    ) -> Result<Vec<String>>;
}

/// Filter for listing and searching artifacts
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    prefix: Option<String>,
    pattern: Option<Regex>,
}

impl SearchCriteria {
    /// Every artifact
    pub fn all() -> Self {
        Self::default()
    }

    /// Paths starting with `prefix`
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim_start_matches('/');
        self.prefix = (!prefix.is_empty()).then(|| prefix.to_string());
        self
    }

    /// Paths fully matching the regular expression `pattern`
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.pattern = Some(full_match_regex(pattern)?);
        Ok(self)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.prefix.as_deref().is_none_or(|p| path.starts_with(p))
            && self.pattern.as_ref().is_none_or(|r| r.is_match(path))
    }
}

/// Canonical form of a request path
///
/// Leading and duplicate separators and `.` segments are dropped; `..`
/// segments, backslashes and empty paths are rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    let invalid = |reason: &str| RepoError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.contains('\\') || path.contains('\0') {
        return Err(invalid("contains a backslash or NUL character"));
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid("parent directory references are not allowed")),
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(invalid("path is empty"));
    }
    Ok(segments.join("/"))
}

/// Stores each repository under its base directory
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemLayoutProvider;

impl FileSystemLayoutProvider {
    pub fn new() -> Self {
        Self
    }

    fn root(repository: &Repository) -> Result<&Path> {
        repository
            .basedir
            .as_deref()
            .ok_or_else(|| RepoError::MissingBasedir {
                repository: repository.key().to_string(),
            })
    }

    fn resolve(repository: &Repository, path: &str) -> Result<PathBuf> {
        Ok(Self::root(repository)?.join(normalize_path(path)?))
    }
}

#[async_trait]
impl LayoutProvider for FileSystemLayoutProvider {
    async fn contains_path(&self, repository: &Repository, path: &str) -> Result<bool> {
        let file = Self::resolve(repository, path)?;
        match tokio::fs::metadata(&file).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn input_stream(
        &self,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<ArtifactReader>> {
        let file = Self::resolve(repository, path)?;
        match tokio::fs::File::open(&file).await {
            Ok(handle) => Ok(Some(Box::new(handle))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn output_stream(&self, repository: &Repository, path: &str) -> Result<ArtifactWriter> {
        let file = Self::resolve(repository, path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let handle = tokio::fs::File::create(&file).await?;
        tracing::trace!(path = %file.display(), "Opened artifact for writing");
        Ok(Box::new(handle))
    }

    async fn list_paths(
        &self,
        repository: &Repository,
        criteria: &SearchCriteria,
    ) -> Result<Vec<String>> {
        let root = Self::root(repository)?.to_path_buf();
        let criteria = criteria.clone();

        tokio::task::spawn_blocking(move || list_files(&root, &criteria)).await?
    }
}

fn list_files(root: &Path, criteria: &SearchCriteria) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| RepoError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if criteria.matches(&path) {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}
