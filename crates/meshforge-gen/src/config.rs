//! Layered configuration
//!
//! Each source is read into a [`ConfigLayer`] where every field is optional.
//! Layers are stacked from lowest to highest precedence and only the fields a
//! layer actually sets replace what is underneath:
//!
//! 1. Global: `~/.meshforge/config.toml`
//! 2. Project-local: `.meshforge/config.toml`
//! 3. Environment variables: `MESHFORGE_{PROVIDER}_API_KEY`, then
//!    `MESHY_API_KEY` and `MESHY_API_URL`
//!
//! Built-in defaults fill whatever is still unset when the stack is resolved.

use meshforge_core::{ForgeError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::providers::meshy::client::DEFAULT_TIMEOUT_SECS;

const DEFAULT_PROVIDER: &str = "meshy";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Resolved settings for one provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            enabled: true,
        }
    }
}

/// Defaults applied when a command does not say otherwise
#[derive(Debug, Clone)]
pub struct DefaultsConfig {
    pub provider: String,
    /// Delay between polls when waiting on a job
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        ConfigLayer::default().resolve().defaults
    }
}

/// One provider table as written in a config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderLayer {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub enabled: Option<bool>,
}

impl ProviderLayer {
    fn stack(self, upper: ProviderLayer) -> ProviderLayer {
        ProviderLayer {
            api_key: upper.api_key.or(self.api_key),
            api_url: upper.api_url.or(self.api_url),
            enabled: upper.enabled.or(self.enabled),
        }
    }
}

/// The `[defaults]` table as written in a config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsLayer {
    pub provider: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl DefaultsLayer {
    fn stack(self, upper: DefaultsLayer) -> DefaultsLayer {
        DefaultsLayer {
            provider: upper.provider.or(self.provider),
            poll_interval_secs: upper.poll_interval_secs.or(self.poll_interval_secs),
            request_timeout_secs: upper.request_timeout_secs.or(self.request_timeout_secs),
        }
    }
}

/// A single configuration source with nothing filled in by default
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigLayer {
    #[serde(default)]
    pub providers: HashMap<String, ProviderLayer>,
    #[serde(default)]
    pub defaults: DefaultsLayer,
}

impl ConfigLayer {
    /// Read a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            ForgeError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    /// Read the credential variables from the process environment
    pub fn from_env() -> Self {
        let mut layer = ConfigLayer::default();
        for name in crate::providers::available_providers() {
            let var = format!("MESHFORGE_{}_API_KEY", name.to_uppercase());
            if let Ok(key) = std::env::var(&var) {
                layer.provider_mut(name).api_key = Some(key);
            }
        }

        // The bare Meshy variables win, matching the backend's own docs
        if let Ok(key) = std::env::var("MESHY_API_KEY") {
            layer.provider_mut("meshy").api_key = Some(key);
        }
        if let Ok(url) = std::env::var("MESHY_API_URL") {
            layer.provider_mut("meshy").api_url = Some(url);
        }
        layer
    }

    fn provider_mut(&mut self, name: &str) -> &mut ProviderLayer {
        self.providers.entry(name.to_string()).or_default()
    }

    /// Put `upper` on top of this layer
    pub fn stack(mut self, upper: ConfigLayer) -> ConfigLayer {
        for (name, provider) in upper.providers {
            let below = self.providers.remove(&name).unwrap_or_default();
            self.providers.insert(name, below.stack(provider));
        }
        ConfigLayer {
            providers: self.providers,
            defaults: self.defaults.stack(upper.defaults),
        }
    }

    /// Fill every unset field with its built-in default
    pub fn resolve(self) -> ForgeConfig {
        let providers = self
            .providers
            .into_iter()
            .map(|(name, p)| {
                let resolved = ProviderConfig {
                    api_key: p.api_key,
                    api_url: p.api_url,
                    enabled: p.enabled.unwrap_or(true),
                };
                (name, resolved)
            })
            .collect();

        let d = self.defaults;
        ForgeConfig {
            providers,
            defaults: DefaultsConfig {
                provider: d.provider.unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
                poll_interval_secs: d.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                request_timeout_secs: d.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            },
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, Default)]
pub struct ForgeConfig {
    pub providers: HashMap<String, ProviderConfig>,
    pub defaults: DefaultsConfig,
}

impl ForgeConfig {
    /// Stack the global file, the project file and the environment
    pub fn load() -> Result<Self> {
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".meshforge").join("config.toml"));
        }
        paths.push(PathBuf::from(".meshforge/config.toml"));

        let mut stacked = ConfigLayer::default();
        for path in paths.iter().filter(|p| p.exists()) {
            tracing::debug!(path = %path.display(), "Reading config layer");
            stacked = stacked.stack(ConfigLayer::from_file(path)?);
        }

        let config = stacked.stack(ConfigLayer::from_env()).resolve();
        tracing::debug!(providers = config.providers.len(), "Configuration loaded");
        Ok(config)
    }

    /// One file plus the environment, without the global or project lookup
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Ok(ConfigLayer::from_file(path)?
            .stack(ConfigLayer::from_env())
            .resolve())
    }

    /// API key for a provider; an empty key counts as missing
    pub fn api_key(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_key.as_deref())
            .filter(|k| !k.is_empty())
    }

    pub fn api_url(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_url.as_deref())
    }

    /// Providers nobody configured are enabled
    pub fn is_enabled(&self, provider_name: &str) -> bool {
        self.providers
            .get(provider_name)
            .map_or(true, |p| p.enabled)
    }
}
