//! Service configuration for the gate binary.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use cerberus_core::Config;

/// Gate service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base path the challenge endpoints are mounted under
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Registry name of the instance this gate drives
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Core instance configuration
    #[serde(default)]
    pub cerberus: Config,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8923".to_string()
}

fn default_base_url() -> String {
    "/cerberus".to_string()
}

fn default_instance_id() -> String {
    "default".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            base_url: default_base_url(),
            instance_id: default_instance_id(),
            cerberus: Config::default(),
        }
    }
}

impl Settings {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, listen_override: Option<&str>) -> Result<Self> {
        let mut settings = if Path::new(config_path).exists() {
            let loaded = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            loaded
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        if let Some(listen) = listen_override {
            settings.listen_addr = listen.to_string();
        }

        // The router nests under this path; keep it in canonical form.
        if !settings.base_url.starts_with('/') {
            settings.base_url.insert(0, '/');
        }
        while settings.base_url.len() > 1 && settings.base_url.ends_with('/') {
            settings.base_url.pop();
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load("/nonexistent/gate.toml", None).unwrap();
        assert_eq!(settings.base_url, "/cerberus");
        assert_eq!(settings.instance_id, "default");
        assert_eq!(settings.cerberus.difficulty, 4);
    }

    #[test]
    fn listen_override_wins() {
        let settings = Settings::load("/nonexistent/gate.toml", Some("0.0.0.0:80")).unwrap();
        assert_eq!(settings.listen_addr, "0.0.0.0:80");
    }
}
