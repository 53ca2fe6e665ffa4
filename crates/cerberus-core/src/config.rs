//! Instance configuration.

use std::path::PathBuf;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_ACCESS_PER_APPROVAL, DEFAULT_APPROVAL_TTL, DEFAULT_BLOCK_TTL, DEFAULT_COOKIE_NAME,
    DEFAULT_DIFFICULTY, DEFAULT_HEADER_NAME, DEFAULT_MAX_MEM_USAGE, DEFAULT_MAX_PENDING,
    DEFAULT_PENDING_TTL, DEFAULT_TITLE,
};
use crate::error::CerberusError;
use crate::ipblock::PrefixConfig;
use crate::keys;

/// Configuration of one Cerberus instance.
///
/// Every option has a default; a fully empty config section provisions a
/// working instance with a freshly generated key.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Challenge difficulty (leading zero half-bytes of the answer hash)
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,

    /// Drop the connection instead of answering 403 when an IP is blocked
    #[serde(default)]
    pub drop: bool,

    /// When false the gate stamps DISABLED and forwards everything
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Pending (and failed) challenges per IP block before it is blocked
    #[serde(default = "default_max_pending")]
    pub max_pending: i32,

    /// Gate passes granted per solved challenge
    #[serde(default = "default_access_per_approval")]
    pub access_per_approval: i32,

    /// Lifetime of a blocklist entry
    #[serde(with = "humantime_serde", default = "default_block_ttl")]
    pub block_ttl: Duration,

    /// Lifetime of a pending counter
    #[serde(with = "humantime_serde", default = "default_pending_ttl")]
    pub pending_ttl: Duration,

    /// Lifetime of an approval counter and its cookie
    #[serde(with = "humantime_serde", default = "default_approval_ttl")]
    pub approval_ttl: Duration,

    /// Total memory budget for the pending/blocklist/approval caches
    #[serde(default = "default_max_mem_usage")]
    pub max_mem_usage: u64,

    /// Name of the approval cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Name of the response header carrying the decision tag
    #[serde(default = "default_header_name")]
    pub header_name: String,

    /// Title shown on challenge and error pages
    #[serde(default = "default_title")]
    pub title: String,

    /// Contact address shown on error pages
    #[serde(default)]
    pub mail: String,

    /// IP prefix lengths used for aggregation
    #[serde(default)]
    pub prefix_cfg: PrefixConfig,

    /// Inline Ed25519 key material (PEM, OpenSSH, or hex seed)
    #[serde(default)]
    pub ed25519_key: Option<String>,

    /// Path to an Ed25519 key file
    #[serde(default)]
    pub ed25519_key_file: Option<PathBuf>,
}

// Default value functions
fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}
fn default_enabled() -> bool {
    true
}
fn default_max_pending() -> i32 {
    DEFAULT_MAX_PENDING
}
fn default_access_per_approval() -> i32 {
    DEFAULT_ACCESS_PER_APPROVAL
}
fn default_block_ttl() -> Duration {
    DEFAULT_BLOCK_TTL
}
fn default_pending_ttl() -> Duration {
    DEFAULT_PENDING_TTL
}
fn default_approval_ttl() -> Duration {
    DEFAULT_APPROVAL_TTL
}
fn default_max_mem_usage() -> u64 {
    DEFAULT_MAX_MEM_USAGE
}
fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}
fn default_header_name() -> String {
    DEFAULT_HEADER_NAME.to_string()
}
fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            drop: false,
            enabled: true,
            max_pending: default_max_pending(),
            access_per_approval: default_access_per_approval(),
            block_ttl: default_block_ttl(),
            pending_ttl: default_pending_ttl(),
            approval_ttl: default_approval_ttl(),
            max_mem_usage: default_max_mem_usage(),
            cookie_name: default_cookie_name(),
            header_name: default_header_name(),
            title: default_title(),
            mail: String::new(),
            prefix_cfg: PrefixConfig::default(),
            ed25519_key: None,
            ed25519_key_file: None,
        }
    }
}

impl Config {
    /// Check option bounds. Fatal to the instance when it fails.
    pub fn validate(&self) -> Result<(), CerberusError> {
        if self.difficulty < 1 {
            return Err(CerberusError::Config("difficulty must be at least 1".into()));
        }
        if self.max_pending < 1 {
            return Err(CerberusError::Config("max_pending must be at least 1".into()));
        }
        if self.access_per_approval < 1 {
            return Err(CerberusError::Config(
                "access_per_approval must be at least 1".into(),
            ));
        }
        if self.max_mem_usage < 1 {
            return Err(CerberusError::Config("max_mem_usage must be at least 1".into()));
        }
        if self.ed25519_key.is_some() && self.ed25519_key_file.is_some() {
            return Err(CerberusError::Config(
                "ed25519_key and ed25519_key_file cannot both be set".into(),
            ));
        }
        self.prefix_cfg
            .validate()
            .map_err(|e| CerberusError::Config(format!("prefix_cfg: {e}")))?;

        Ok(())
    }

    /// True iff a reload with `other` can keep the existing caches.
    pub fn state_compatible(&self, other: &Config) -> bool {
        self.block_ttl == other.block_ttl
            && self.pending_ttl == other.pending_ttl
            && self.approval_ttl == other.approval_ttl
            && self.access_per_approval == other.access_per_approval
            && self.max_mem_usage == other.max_mem_usage
            && self.prefix_cfg == other.prefix_cfg
    }

    /// Load the configured signing key, or generate a fresh one when no key
    /// material is given.
    pub fn load_signing_key(&self) -> Result<SigningKey, CerberusError> {
        if let Some(path) = &self.ed25519_key_file {
            tracing::info!(path = %path.display(), "loading ed25519 key from file");
            let raw = std::fs::read_to_string(path).map_err(|e| {
                CerberusError::KeyLoad(format!("failed to read ed25519 key file: {e}"))
            })?;
            return keys::load_ed25519_key(&raw);
        }

        if let Some(raw) = &self.ed25519_key {
            return keys::load_ed25519_key(raw);
        }

        tracing::info!("generating new ed25519 key");
        Ok(SigningKey::generate(&mut OsRng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.max_pending, 128);
        assert_eq!(config.access_per_approval, 8);
        assert_eq!(config.block_ttl, Duration::from_secs(86400));
        assert_eq!(config.cookie_name, "cerberus-auth");
        assert!(config.enabled);
    }

    #[test]
    fn rejects_out_of_range_options() {
        let mut config = Config::default();
        config.difficulty = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_pending = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.prefix_cfg.v6_prefix = 65;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_conflicting_key_sources() {
        let mut config = Config::default();
        config.ed25519_key = Some("aa".repeat(32));
        config.ed25519_key_file = Some(PathBuf::from("/tmp/key"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn compatibility_ignores_presentation_options() {
        let a = Config::default();
        let mut b = Config::default();
        b.difficulty = 6;
        b.cookie_name = "other".into();
        b.title = "Other".into();
        assert!(a.state_compatible(&b));

        let mut c = Config::default();
        c.approval_ttl = Duration::from_secs(1);
        assert!(!a.state_compatible(&c));

        let mut d = Config::default();
        d.prefix_cfg.v4_prefix = 24;
        assert!(!a.state_compatible(&d));
    }

    #[test]
    fn inline_key_is_loaded() {
        let mut config = Config::default();
        config.ed25519_key = Some("ab".repeat(32));
        let key = config.load_signing_key().unwrap();
        assert_eq!(hex::encode(key.to_bytes()), "ab".repeat(32));
    }
}
