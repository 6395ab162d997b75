//! Live configuration snapshot
//!
//! Readers get an `Arc<Configuration>` and keep using it for the whole
//! request; a reload swaps the pointer once the new configuration validated.

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

use crate::config::Configuration;
use crate::error::Result;

#[derive(Debug)]
pub struct ConfigurationManager {
    current: RwLock<Arc<Configuration>>,
}

impl ConfigurationManager {
    /// Validate and hold a configuration
    pub fn new(config: Configuration) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Load, validate and hold the configuration at `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::new(Configuration::load_from(path)?)
    }

    /// Current read-only snapshot
    pub fn get_configuration(&self) -> Arc<Configuration> {
        self.current.read().clone()
    }

    /// Replace the configuration; the previous one stays active if validation fails
    pub fn reload(&self, config: Configuration) -> Result<Arc<Configuration>> {
        config.validate()?;
        let config = Arc::new(config);
        *self.current.write() = config.clone();
        tracing::info!(
            id = %config.id,
            repositories = config.repositories().count(),
            "Configuration reloaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Repository;

    #[test]
    fn test_rejects_invalid_configuration() {
        let mut config = Configuration::default();
        config.add_repository(Repository::group("s", "g", ["g"]));
        assert!(ConfigurationManager::new(config).is_err());
    }

    #[test]
    fn test_reload_swaps_snapshot() {
        let manager = ConfigurationManager::new(Configuration::default()).unwrap();
        let before = manager.get_configuration();
        assert_eq!(before.repositories().count(), 0);

        let mut next = Configuration::default();
        next.add_repository(Repository::hosted("s", "releases"));
        manager.reload(next).unwrap();

        assert_eq!(manager.get_configuration().repositories().count(), 1);
        // Snapshots taken before the reload are unaffected
        assert_eq!(before.repositories().count(), 0);
    }

    #[test]
    fn test_failed_reload_keeps_previous() {
        let mut initial = Configuration::default();
        initial.add_repository(Repository::hosted("s", "releases"));
        let manager = ConfigurationManager::new(initial).unwrap();

        let mut broken = Configuration::default();
        broken.add_repository(Repository::group("s", "g", ["missing"]));
        assert!(manager.reload(broken).is_err());

        assert!(manager.get_configuration().repository("s", "releases").is_some());
    }
}
