//! Named instance registry used across config reloads.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::CerberusError;
use crate::instance::Instance;

/// Registry mapping instance names to live instances.
///
/// A reload that finds an existing instance goes through
/// [`Instance::update_with_config`], preserving caches whenever the new
/// config is state-compatible.
#[derive(Default)]
pub struct Registry {
    pool: RwLock<HashMap<String, Arc<Instance>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the named instance, provisioning or reconfiguring as needed.
    pub fn get_or_provision(
        &self,
        name: &str,
        config: Config,
    ) -> Result<Arc<Instance>, CerberusError> {
        let mut pool = self.pool.write();

        if let Some(existing) = pool.get(name) {
            existing.update_with_config(config)?;
            return Ok(existing.clone());
        }

        let instance = Arc::new(Instance::provision(config)?);
        pool.insert(name.to_string(), instance.clone());
        Ok(instance)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Instance>> {
        self.pool.read().get(name).cloned()
    }

    /// Close every instance, stopping their sweepers.
    pub fn close_all(&self) {
        for instance in self.pool.read().values() {
            instance.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.max_mem_usage = 1 << 20;
        config
    }

    #[tokio::test]
    async fn provisions_once_per_name() {
        let registry = Registry::new();

        let a = registry.get_or_provision("default", test_config()).unwrap();
        let b = registry.get_or_provision("default", test_config()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = registry.get_or_provision("edge", test_config()).unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn reload_goes_through_existing_instance() {
        let registry = Registry::new();

        let instance = registry.get_or_provision("default", test_config()).unwrap();
        let fingerprint = instance.state().fingerprint().to_string();

        let mut compatible = test_config();
        compatible.difficulty = 2;
        registry.get_or_provision("default", compatible).unwrap();
        assert_eq!(instance.state().fingerprint(), fingerprint);
        assert_eq!(instance.config().difficulty, 2);

        let mut incompatible = test_config();
        incompatible.pending_ttl = Duration::from_secs(5);
        registry.get_or_provision("default", incompatible).unwrap();
        assert_ne!(instance.state().fingerprint(), fingerprint);
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let registry = Registry::new();
        assert!(registry.get("missing").is_none());
    }
}
