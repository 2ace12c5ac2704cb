//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;
use tracing::info;

use super::types::EngineConfig;
use crate::common::errors::{DecisionError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with DECISION__)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<EngineConfig> {
    // Try to load from .env file
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            info!("Loading configuration from {}", path);
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("DECISION")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| DecisionError::Configuration(e.to_string()))?;

    let engine: EngineConfig = config
        .try_deserialize()
        .map_err(|e| DecisionError::Configuration(e.to_string()))?;

    engine.validate()?;
    Ok(engine)
}

/// Parse configuration from an in-memory TOML string
pub fn load_from_str(toml: &str) -> Result<EngineConfig> {
    let config = Config::builder()
        .add_source(File::from_str(toml, config::FileFormat::Toml))
        .build()
        .map_err(|e| DecisionError::Configuration(e.to_string()))?;

    let engine: EngineConfig = config
        .try_deserialize()
        .map_err(|e| DecisionError::Configuration(e.to_string()))?;

    engine.validate()?;
    Ok(engine)
}
