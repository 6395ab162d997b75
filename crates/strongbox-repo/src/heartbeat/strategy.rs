//! Reachability checks for remote repositories

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use url::Url;

use strongbox_core::RemoteRepository;

use crate::error::{RepoError, Result};

/// One way of deciding whether a remote repository is reachable
///
/// Implementations may fail or hang; the scheduler bounds every call with a
/// timeout and records failures as "not alive".
#[async_trait]
pub trait RemoteHeartbeatStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn is_alive(&self, remote: &RemoteRepository) -> Result<bool>;
}

/// `HEAD` request on the remote URL; 2xx and 3xx mean alive
pub struct BrowsableHeartbeatStrategy {
    client: reqwest::Client,
}

impl BrowsableHeartbeatStrategy {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .user_agent(concat!("strongbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteHeartbeatStrategy for BrowsableHeartbeatStrategy {
    fn name(&self) -> &'static str {
        "head"
    }

    async fn is_alive(&self, remote: &RemoteRepository) -> Result<bool> {
        let mut request = self.client.head(&remote.url);
        if let Some(username) = &remote.username {
            request = request.basic_auth(username, remote.password.as_deref());
        }

        let status = request.send().await?.status();
        tracing::trace!(url = %remote.url, status = status.as_u16(), "HEAD probe answered");
        Ok(status.is_success() || status.is_redirection())
    }
}

/// TCP connect to the remote host and port
///
/// Used for remotes that do not answer requests on directory URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingHeartbeatStrategy;

#[async_trait]
impl RemoteHeartbeatStrategy for PingHeartbeatStrategy {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn is_alive(&self, remote: &RemoteRepository) -> Result<bool> {
        let url = Url::parse(&remote.url).map_err(|e| RepoError::InvalidRemoteUrl {
            url: remote.url.clone(),
            reason: e.to_string(),
        })?;
        let host = url.host_str().ok_or_else(|| RepoError::InvalidRemoteUrl {
            url: remote.url.clone(),
            reason: "URL has no host".to_string(),
        })?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| RepoError::InvalidRemoteUrl {
                url: remote.url.clone(),
                reason: format!("no known default port for scheme '{}'", url.scheme()),
            })?;

        match TcpStream::connect((host, port)).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::debug!(host, port, error = %e, "TCP probe failed");
                Ok(false)
            }
        }
    }
}

/// Picks a strategy from a remote's directory browsing flag
#[derive(Clone)]
pub struct HeartbeatStrategyRegistry {
    browsable: Arc<dyn RemoteHeartbeatStrategy>,
    not_browsable: Arc<dyn RemoteHeartbeatStrategy>,
}

impl HeartbeatStrategyRegistry {
    pub fn new(
        browsable: Arc<dyn RemoteHeartbeatStrategy>,
        not_browsable: Arc<dyn RemoteHeartbeatStrategy>,
    ) -> Self {
        Self {
            browsable,
            not_browsable,
        }
    }

    /// HTTP `HEAD` for browsable remotes, TCP connect for the others
    pub fn with_defaults(timeout: Duration) -> Result<Self> {
        Ok(Self::new(
            Arc::new(BrowsableHeartbeatStrategy::new(timeout)?),
            Arc::new(PingHeartbeatStrategy),
        ))
    }

    /// Same strategy for every remote
    pub fn uniform(strategy: Arc<dyn RemoteHeartbeatStrategy>) -> Self {
        Self::new(strategy.clone(), strategy)
    }

    pub fn of(&self, allows_directory_browsing: bool) -> Arc<dyn RemoteHeartbeatStrategy> {
        if allows_directory_browsing {
            self.browsable.clone()
        } else {
            self.not_browsable.clone()
        }
    }
}

impl std::fmt::Debug for HeartbeatStrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatStrategyRegistry")
            .field("browsable", &self.browsable.name())
            .field("not_browsable", &self.not_browsable.name())
            .finish()
    }
}
