//! Artifact downloads from proxy remotes

use std::time::Duration;
use url::Url;

use strongbox_core::RemoteRepository;

use crate::error::{RepoError, Result};

/// HTTP client fetching artifacts from remote repositories
#[derive(Debug, Clone)]
pub struct RemoteArtifactClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteArtifactClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .user_agent(concat!("strongbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client, timeout })
    }

    /// URL of `path` below the remote base URL
    ///
    /// Each path segment is appended percent-encoded, so a path never
    /// changes the scheme, host or base path of the remote.
    pub fn artifact_url(remote: &RemoteRepository, path: &str) -> Result<Url> {
        let invalid = |reason: String| RepoError::InvalidRemoteUrl {
            url: remote.url.clone(),
            reason,
        };

        let base = format!("{}/", remote.url.trim().trim_end_matches('/'));
        let base = Url::parse(&base).map_err(|e| invalid(e.to_string()))?;

        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be used as a base URL".to_string()))?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));

        if !url.as_str().starts_with(base.as_str()) {
            return Err(invalid(format!("artifact path '{}' escapes the remote", path)));
        }
        Ok(url)
    }

    /// Download an artifact; `None` when the remote does not have it
    pub async fn download(&self, remote: &RemoteRepository, path: &str) -> Result<Option<Vec<u8>>> {
        let url = Self::artifact_url(remote, path)?;

        let mut request = self.client.get(url.clone());
        if let Some(username) = &remote.username {
            request = request.basic_auth(username, remote.password.as_deref());
        }

        let response = request.send().await.map_err(|e| self.convert(e))?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(%url, "Artifact not found on remote");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("Download of {} failed", url),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.convert(e))?;
        tracing::debug!(%url, size = bytes.len(), "Downloaded artifact");
        Ok(Some(bytes.to_vec()))
    }

    fn convert(&self, error: reqwest::Error) -> RepoError {
        if error.is_timeout() {
            RepoError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            error.into()
        }
    }
}
