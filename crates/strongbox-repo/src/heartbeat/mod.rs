//! Periodic reachability checks of proxy remotes
//!
//! Each proxy remote gets its own fixed-delay loop: probe, wait the
//! remote's interval, probe again. A shared semaphore bounds how many probes
//! run at once. Every probe runs in its own task under a timeout, so an
//! error, a panic or a hang only ever turns into `alive = false` for that
//! remote.

mod strategy;

pub use strategy::{
    BrowsableHeartbeatStrategy, HeartbeatStrategyRegistry, PingHeartbeatStrategy,
    RemoteHeartbeatStrategy,
};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use strongbox_core::{
    Configuration, RemoteRepositoriesConfiguration, RemoteRepository, RepositoryKey,
};

use crate::aliveness::RemoteRepositoryAlivenessTracker;
use crate::error::{RepoError, Result};

/// Validated scheduler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatSettings {
    pub default_interval: Duration,
    pub threads: usize,
    pub probe_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl HeartbeatSettings {
    pub fn from_config(config: &RemoteRepositoriesConfiguration) -> Result<Self> {
        for (setting, value) in [
            ("checkIntervalSeconds", config.check_interval_seconds),
            ("heartbeatThreadsNumber", config.heartbeat_threads_number as u64),
            ("probeTimeoutSeconds", config.probe_timeout_seconds),
        ] {
            if value == 0 {
                return Err(RepoError::InvalidSetting {
                    setting: setting.to_string(),
                    value,
                });
            }
        }

        Ok(Self {
            default_interval: config.check_interval(),
            threads: config.heartbeat_threads_number,
            probe_timeout: config.probe_timeout(),
            shutdown_grace: config.shutdown_grace(),
        })
    }
}

/// A remote to probe and how often
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatTarget {
    /// First proxy repository using this remote
    pub repository: RepositoryKey,
    pub remote: RemoteRepository,
    pub interval: Duration,
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub repository: RepositoryKey,
    pub url: String,
    pub strategy: &'static str,
    pub alive: bool,
}

/// Shared state of every probe loop
struct Prober {
    tracker: Arc<RemoteRepositoryAlivenessTracker>,
    strategies: HeartbeatStrategyRegistry,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl Prober {
    /// Wait for a permit, probe and record. `None` when cancelled first.
    async fn probe(&self, target: &HeartbeatTarget, cancel: &CancellationToken) -> Option<ProbeOutcome> {
        let _permit = tokio::select! {
            _ = cancel.cancelled() => return None,
            permit = self.permits.clone().acquire_owned() => permit.ok()?,
        };

        let strategy = self.strategies.of(target.remote.allows_directory_browsing);
        let name = strategy.name();
        let alive = self.check(strategy, target).await;
        self.tracker.put(&target.remote, alive);

        Some(ProbeOutcome {
            repository: target.repository.clone(),
            url: target.remote.url.clone(),
            strategy: name,
            alive,
        })
    }

    async fn check(&self, strategy: Arc<dyn RemoteHeartbeatStrategy>, target: &HeartbeatTarget) -> bool {
        let url = target.remote.url.as_str();
        let remote = target.remote.clone();

        // Dropping the set aborts a probe that outlived its timeout
        let mut probe = JoinSet::new();
        probe.spawn(async move { strategy.is_alive(&remote).await });

        match tokio::time::timeout(self.timeout, probe.join_next()).await {
            Ok(Some(Ok(Ok(alive)))) => {
                tracing::debug!(url, alive, "Heartbeat probe completed");
                alive
            }
            Ok(Some(Ok(Err(e)))) => {
                tracing::warn!(url, error = %e, "Heartbeat probe failed");
                false
            }
            Ok(Some(Err(e))) if e.is_panic() => {
                tracing::error!(url, "Heartbeat probe panicked");
                false
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(url, error = %e, "Heartbeat probe cancelled");
                false
            }
            Ok(None) => false,
            Err(_) => {
                tracing::warn!(
                    url,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Heartbeat probe timed out"
                );
                false
            }
        }
    }
}

/// Runs one probe loop per proxy remote and feeds the aliveness tracker
pub struct RemoteRepositoryHeartbeatScheduler {
    prober: Arc<Prober>,
    settings: HeartbeatSettings,
    cancel: CancellationToken,
    loops: Mutex<JoinSet<()>>,
}

impl RemoteRepositoryHeartbeatScheduler {
    pub fn new(
        settings: HeartbeatSettings,
        tracker: Arc<RemoteRepositoryAlivenessTracker>,
        strategies: HeartbeatStrategyRegistry,
    ) -> Self {
        let prober = Prober {
            tracker,
            strategies,
            permits: Arc::new(Semaphore::new(settings.threads)),
            timeout: settings.probe_timeout,
        };
        Self {
            prober: Arc::new(prober),
            settings,
            cancel: CancellationToken::new(),
            loops: Mutex::new(JoinSet::new()),
        }
    }

    /// Scheduler with the HTTP and TCP strategies
    pub fn from_config(
        config: &Configuration,
        tracker: Arc<RemoteRepositoryAlivenessTracker>,
    ) -> Result<Self> {
        let settings = HeartbeatSettings::from_config(&config.remote_repositories_configuration)?;
        let strategies = HeartbeatStrategyRegistry::with_defaults(settings.probe_timeout)?;
        Ok(Self::new(settings, tracker, strategies))
    }

    pub fn settings(&self) -> &HeartbeatSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &Arc<RemoteRepositoryAlivenessTracker> {
        &self.prober.tracker
    }

    /// One target per distinct remote of the configured proxies
    ///
    /// Proxies sharing a remote URL share one target: it keeps the first
    /// proxy's key, the shortest interval among them, and the TCP probe
    /// unless every one of them allows directory browsing.
    pub fn targets(&self, config: &Configuration) -> Result<Vec<HeartbeatTarget>> {
        let global = &config.remote_repositories_configuration;
        let mut by_url: HashMap<String, usize> = HashMap::new();
        let mut targets: Vec<HeartbeatTarget> = Vec::new();

        for repo in config.proxy_repositories() {
            let Some(remote) = &repo.remote_repository else {
                tracing::warn!(repository = %repo.key(), "Proxy repository without remote, not probing");
                continue;
            };

            let interval = match remote.check_interval_seconds {
                Some(0) => {
                    return Err(RepoError::InvalidSetting {
                        setting: format!("checkIntervalSeconds of {}", repo.key()),
                        value: 0,
                    });
                }
                Some(_) => global.interval_for(remote),
                None => self.settings.default_interval,
            };

            let key = remote.cache_key();
            let Some(index) = by_url.get(&key).copied() else {
                by_url.insert(key, targets.len());
                targets.push(HeartbeatTarget {
                    repository: repo.key(),
                    remote: remote.clone(),
                    interval,
                });
                continue;
            };

            let target = &mut targets[index];
            let browsable = remote.allows_directory_browsing;
            if target.interval != interval || target.remote.allows_directory_browsing != browsable {
                tracing::warn!(
                    url = %target.remote.url,
                    repository = %repo.key(),
                    probed_as = %target.repository,
                    "Proxies share a remote with different heartbeat settings, merging"
                );
            }
            target.interval = target.interval.min(interval);
            target.remote.allows_directory_browsing &= browsable;
        }

        Ok(targets)
    }

    /// Spawn the probe loops for every proxy remote of `config`
    ///
    /// Loops from a previous call are stopped first. Must be called from
    /// within a Tokio runtime. Returns the number of loops started.
    pub fn start(&self, config: &Configuration) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(RepoError::SchedulerShutdown);
        }
        let targets = self.targets(config)?;

        let mut loops = self.loops.lock();
        if !loops.is_empty() {
            tracing::info!(loops = loops.len(), "Restarting heartbeat loops");
            // Dropping the previous set aborts its loops
            *loops = JoinSet::new();
        }

        for target in &targets {
            tracing::debug!(
                url = %target.remote.url,
                interval_secs = target.interval.as_secs(),
                "Scheduling heartbeat"
            );
            loops.spawn(run_loop(self.prober.clone(), target.clone(), self.cancel.clone()));
        }

        tracing::info!(
            remotes = targets.len(),
            threads = self.settings.threads,
            "Heartbeat scheduler started"
        );
        Ok(targets.len())
    }

    /// Probe every proxy remote once, bounded by the same permits as the loops
    pub async fn probe_all_once(&self, config: &Configuration) -> Result<Vec<ProbeOutcome>> {
        if self.cancel.is_cancelled() {
            return Err(RepoError::SchedulerShutdown);
        }
        let targets = self.targets(config)?;

        let probes = targets
            .iter()
            .map(|target| self.prober.probe(target, &self.cancel));
        let outcomes = futures::future::join_all(probes).await;

        Ok(outcomes.into_iter().flatten().collect())
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.loops.lock().is_empty()
    }

    /// Stop scheduling, give in-flight probes `grace` to finish, then abort
    ///
    /// The scheduler cannot be started again afterwards.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        let mut loops = std::mem::take(&mut *self.loops.lock());
        if loops.is_empty() {
            return;
        }

        tracing::info!(loops = loops.len(), "Stopping heartbeat scheduler");
        let drained = tokio::time::timeout(grace, async {
            while loops.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = loops.len(),
                grace_secs = grace.as_secs_f64(),
                "Aborting heartbeat probes after grace period"
            );
            loops.shutdown().await;
        }
    }
}

impl std::fmt::Debug for RemoteRepositoryHeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRepositoryHeartbeatScheduler")
            .field("settings", &self.settings)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Fixed delay between the end of a probe and the start of the next one
async fn run_loop(prober: Arc<Prober>, target: HeartbeatTarget, cancel: CancellationToken) {
    loop {
        if prober.probe(&target, &cancel).await.is_none() {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(target.interval) => {}
        }
    }
    tracing::debug!(url = %target.remote.url, "Heartbeat loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strongbox_core::Repository;

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Alive,
        Dead,
        Fail,
        Panic,
        Hang,
        Slow(Duration),
    }

    /// Strategy answering from a per-URL script and counting calls
    #[derive(Default)]
    struct ScriptedStrategy {
        script: HashMap<String, Behavior>,
        calls: parking_lot::Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedStrategy {
        fn new(script: &[(&str, Behavior)]) -> Arc<Self> {
            Arc::new(Self {
                script: script.iter().map(|(u, b)| (u.to_string(), *b)).collect(),
                ..Default::default()
            })
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl RemoteHeartbeatStrategy for ScriptedStrategy {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn is_alive(&self, remote: &RemoteRepository) -> Result<bool> {
            *self.calls.lock().entry(remote.url.clone()).or_default() += 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let behavior = self.script.get(&remote.url).copied().unwrap_or(Behavior::Alive);
            let result = match behavior {
                Behavior::Alive => Ok(true),
                Behavior::Dead => Ok(false),
                Behavior::Fail => Err(RepoError::NetworkError {
                    message: "connection reset".to_string(),
                }),
                Behavior::Panic => panic!("probe exploded"),
                Behavior::Hang => std::future::pending().await,
                Behavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(true)
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn settings(threads: usize) -> HeartbeatSettings {
        HeartbeatSettings {
            default_interval: Duration::from_secs(60),
            threads,
            probe_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(1),
        }
    }

    fn config_with(remotes: &[RemoteRepository]) -> Configuration {
        let mut config = Configuration::default();
        for (i, remote) in remotes.iter().enumerate() {
            config.add_repository(
                Repository::proxy("storage0", format!("proxy{}", i), remote.url.clone())
                    .with_remote(remote.clone()),
            );
        }
        config
    }

    fn scheduler(
        threads: usize,
        strategy: Arc<ScriptedStrategy>,
    ) -> (RemoteRepositoryHeartbeatScheduler, Arc<RemoteRepositoryAlivenessTracker>) {
        let tracker = Arc::new(RemoteRepositoryAlivenessTracker::default());
        let scheduler = RemoteRepositoryHeartbeatScheduler::new(
            settings(threads),
            tracker.clone(),
            HeartbeatStrategyRegistry::uniform(strategy),
        );
        (scheduler, tracker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_probes_are_isolated() {
        let strategy = ScriptedStrategy::new(&[
            ("https://ok.example.com", Behavior::Alive),
            ("https://down.example.com", Behavior::Dead),
            ("https://error.example.com", Behavior::Fail),
            ("https://panic.example.com", Behavior::Panic),
            ("https://hang.example.com", Behavior::Hang),
        ]);
        let (scheduler, tracker) = scheduler(5, strategy);
        let remotes: Vec<_> = [
            "https://ok.example.com",
            "https://down.example.com",
            "https://error.example.com",
            "https://panic.example.com",
            "https://hang.example.com",
        ]
        .into_iter()
        .map(RemoteRepository::new)
        .collect();
        let config = config_with(&remotes);

        let outcomes = scheduler.probe_all_once(&config).await.unwrap();
        assert_eq!(outcomes.len(), 5);

        let alive: Vec<bool> = outcomes.iter().map(|o| o.alive).collect();
        assert_eq!(alive, vec![true, false, false, false, false]);

        assert!(tracker.is_alive(&remotes[0]));
        for remote in &remotes[1..] {
            assert!(tracker.was_checked(remote), "{} not recorded", remote.url);
            assert!(!tracker.is_alive(remote));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_thread_count() {
        let urls: Vec<String> = (0..6).map(|i| format!("https://r{}.example.com", i)).collect();
        let script: Vec<(&str, Behavior)> = urls
            .iter()
            .map(|u| (u.as_str(), Behavior::Slow(Duration::from_secs(1))))
            .collect();
        let strategy = ScriptedStrategy::new(&script);
        let (scheduler, _) = scheduler(2, strategy.clone());
        let config = config_with(&urls.iter().map(RemoteRepository::new).collect::<Vec<_>>());

        let outcomes = scheduler.probe_all_once(&config).await.unwrap();
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.alive));
        assert_eq!(strategy.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_probes() {
        let url = "https://slow.example.com";
        let strategy = ScriptedStrategy::new(&[(url, Behavior::Slow(Duration::from_secs(2)))]);
        let (scheduler, _) = scheduler(1, strategy.clone());
        let config = config_with(&[RemoteRepository::new(url).with_check_interval(1)]);

        assert_eq!(scheduler.start(&config).unwrap(), 1);
        assert!(scheduler.is_running());
        tokio::time::sleep(Duration::from_millis(10_500)).await;

        // Probes start at 0s, 3s, 6s and 9s
        let calls = strategy.calls(url);
        assert!((3..=4).contains(&calls), "unexpected probe count {}", calls);

        scheduler.shutdown(Duration::from_secs(5)).await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_remote_interval() {
        let fast = RemoteRepository::new("https://fast.example.com").with_check_interval(1);
        let slow = RemoteRepository::new("https://slow.example.com").with_check_interval(5);
        let strategy = ScriptedStrategy::new(&[]);
        let (scheduler, _) = scheduler(2, strategy.clone());

        scheduler.start(&config_with(&[fast, slow])).unwrap();
        tokio::time::sleep(Duration::from_millis(9_500)).await;
        scheduler.shutdown(Duration::from_secs(1)).await;

        assert_eq!(strategy.calls("https://fast.example.com"), 10);
        assert_eq!(strategy.calls("https://slow.example.com"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out() {
        let url = "https://hang.example.com";
        let strategy = ScriptedStrategy::new(&[(url, Behavior::Hang)]);
        let (scheduler, tracker) = scheduler(1, strategy);
        let remote = RemoteRepository::new(url);
        tracker.put(&remote, true);

        let started = tokio::time::Instant::now();
        let outcomes = scheduler.probe_all_once(&config_with(&[remote.clone()])).await.unwrap();

        assert!(!outcomes[0].alive);
        assert!(!tracker.is_alive(&remote));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_zero_interval_is_fatal() {
        let (scheduler, _) = scheduler(1, ScriptedStrategy::new(&[]));
        let config = config_with(&[RemoteRepository::new("https://a.example.com").with_check_interval(0)]);
        assert!(matches!(
            scheduler.start(&config),
            Err(RepoError::InvalidSetting { value: 0, .. })
        ));
        assert!(!scheduler.is_running());

        let mut global = RemoteRepositoriesConfiguration::default();
        global.heartbeat_threads_number = 0;
        assert!(HeartbeatSettings::from_config(&global).is_err());

        let mut global = RemoteRepositoriesConfiguration::default();
        global.probe_timeout_seconds = 0;
        assert!(HeartbeatSettings::from_config(&global).is_err());
    }

    #[tokio::test]
    async fn test_remotes_shared_by_proxies_are_probed_once() {
        let (scheduler, _) = scheduler(1, ScriptedStrategy::new(&[]));
        let config = config_with(&[
            RemoteRepository::new("https://example.com/maven2"),
            RemoteRepository::new("https://example.com/maven2/"),
            RemoteRepository::new("https://other.example.com"),
        ]);

        let targets = scheduler.targets(&config).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].repository, RepositoryKey::new("storage0", "proxy0"));
        assert_eq!(targets[0].interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_shared_remote_merges_settings() {
        let (scheduler, _) = scheduler(1, ScriptedStrategy::new(&[]));
        let config = config_with(&[
            RemoteRepository::new("https://example.com/maven2").with_check_interval(30),
            RemoteRepository::new("https://example.com/maven2/")
                .with_check_interval(10)
                .not_browsable(),
            RemoteRepository::new("https://example.com/maven2"),
        ]);

        let targets = scheduler.targets(&config).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].repository, RepositoryKey::new("storage0", "proxy0"));
        assert_eq!(targets[0].interval, Duration::from_secs(10));
        assert!(!targets[0].remote.allows_directory_browsing);

        // Same result whatever the declaration order
        let config = config_with(&[
            RemoteRepository::new("https://example.com/maven2")
                .with_check_interval(10)
                .not_browsable(),
            RemoteRepository::new("https://example.com/maven2").with_check_interval(30),
        ]);
        let targets = scheduler.targets(&config).unwrap();
        assert_eq!(targets[0].interval, Duration::from_secs(10));
        assert!(!targets[0].remote.allows_directory_browsing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_after_grace() {
        let url = "https://hang.example.com";
        let strategy = ScriptedStrategy::new(&[(url, Behavior::Hang)]);
        let tracker = Arc::new(RemoteRepositoryAlivenessTracker::default());
        let mut settings = settings(1);
        settings.probe_timeout = Duration::from_secs(600);
        let scheduler = RemoteRepositoryHeartbeatScheduler::new(
            settings,
            tracker,
            HeartbeatStrategyRegistry::uniform(strategy.clone()),
        );
        let config = config_with(&[RemoteRepository::new(url)]);

        scheduler.start(&config).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(strategy.calls(url), 1);

        let started = tokio::time::Instant::now();
        scheduler.shutdown(Duration::from_secs(2)).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
        assert!(!scheduler.is_running());

        assert!(matches!(scheduler.start(&config), Err(RepoError::SchedulerShutdown)));
        assert!(matches!(
            scheduler.probe_all_once(&config).await,
            Err(RepoError::SchedulerShutdown)
        ));
    }
}
