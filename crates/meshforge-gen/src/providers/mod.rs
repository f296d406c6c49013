//! Provider registry
//!
//! Maps provider names to concrete implementations.

pub mod meshy;
pub mod mock;

use crate::config::ForgeConfig;
use crate::provider::AssetProvider;
use meshforge_core::{ForgeError, Result};

/// Create a provider by name with configuration
pub fn create_provider(name: &str, config: &ForgeConfig) -> Result<Box<dyn AssetProvider>> {
    if !config.is_enabled(name) {
        return Err(ForgeError::Config(format!(
            "Provider '{}' is disabled in configuration",
            name
        )));
    }

    match name {
        "mock" => Ok(Box::new(mock::MockProvider::new())),
        "meshy" => Ok(Box::new(meshy::MeshyProvider::from_config(config)?)),
        _ => Err(ForgeError::Config(format!(
            "Unknown provider '{}'. Available: {}",
            name,
            available_providers().join(", ")
        ))),
    }
}

/// List all available provider names
pub fn available_providers() -> Vec<&'static str> {
    vec!["meshy", "mock"]
}
