//! Instance lifecycle: a config view over long-lived state, with
//! state-preserving reconfiguration.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::CerberusError;
use crate::state::InstanceState;

/// One named Cerberus instance.
///
/// Handlers snapshot the config and state together so a concurrent reload is
/// observed either entirely before or entirely after a request.
pub struct Instance {
    config: RwLock<Arc<Config>>,
    state: RwLock<Arc<InstanceState>>,
}

impl Instance {
    /// Validate the config and build fresh state for it.
    pub fn provision(config: Config) -> Result<Self, CerberusError> {
        config.validate()?;
        let state = InstanceState::new(&config)?;

        let (pending, blocklist, approval) = state.cache_capacities();
        tracing::info!(
            pending_elems = pending,
            blocklist_elems = blocklist,
            approval_elems = approval,
            "cerberus state initialized"
        );

        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            state: RwLock::new(Arc::new(state)),
        })
    }

    /// Consistent view of config and state for one request.
    pub fn snapshot(&self) -> (Arc<Config>, Arc<InstanceState>) {
        let config = self.config.read().clone();
        let state = self.state.read().clone();
        (config, state)
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.read().clone()
    }

    pub fn state(&self) -> Arc<InstanceState> {
        self.state.read().clone()
    }

    /// Apply a new config. Compatible configs swap only the config view;
    /// anything touching cache sizing or TTLs closes the old state and
    /// starts over.
    pub fn update_with_config(&self, config: Config) -> Result<(), CerberusError> {
        config.validate()?;

        // Evaluate compatibility before taking the write lock; the guards
        // are not reentrant.
        let compatible = self.config.read().state_compatible(&config);
        if compatible {
            tracing::info!("cerberus instance config updated without state reset");
            *self.config.write() = Arc::new(config);
            return Ok(());
        }

        tracing::info!("incompatible config for existing cerberus instance, resetting state");
        let state = InstanceState::new(&config)?;

        let mut config_slot = self.config.write();
        let mut state_slot = self.state.write();
        state_slot.close();
        *config_slot = Arc::new(config);
        *state_slot = Arc::new(state);

        Ok(())
    }

    /// Stop background work. Requests already holding a snapshot finish
    /// against the old state.
    pub fn close(&self) {
        self.state.read().close();
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
    async fn compatible_reload_preserves_state() {
        let instance = Instance::provision(test_config()).unwrap();

        let id = instance.state().issue_approval(4);
        let fingerprint = instance.state().fingerprint().to_string();

        let mut updated = test_config();
        updated.difficulty = 6;
        instance.update_with_config(updated).unwrap();

        assert_eq!(instance.config().difficulty, 6);
        assert_eq!(instance.state().fingerprint(), fingerprint);
        assert!(instance.state().dec_approval(&id));
    }

    #[tokio::test]
    async fn incompatible_reload_resets_state() {
        let instance = Instance::provision(test_config()).unwrap();

        let id = instance.state().issue_approval(4);
        let fingerprint = instance.state().fingerprint().to_string();

        let mut updated = test_config();
        updated.approval_ttl = Duration::from_secs(10);
        instance.update_with_config(updated).unwrap();

        assert_ne!(instance.state().fingerprint(), fingerprint);
        assert!(!instance.state().dec_approval(&id));
    }

    #[tokio::test]
    async fn provision_rejects_invalid_config() {
        let mut config = test_config();
        config.difficulty = 0;
        assert!(Instance::provision(config).is_err());
    }
}
