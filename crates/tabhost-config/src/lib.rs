//! tabhost configuration.
//!
//! TOML-based configuration for the host process. Every section uses
//! serde defaults so an empty or partial file is valid.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tabhost_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    BoundsConfig, CertificatePolicy, ChromeMargins, EventsConfig, LogLevel, LoggingConfig,
    SecurityConfig, SurfaceConfig, TabHostConfig, WindowConfig, CONFIG_SCHEMA_VERSION,
};
pub use toml_loader::{default_config_path, load_default, load_from_path};

use tabhost_common::ConfigError;

/// Load config from the platform default path and validate it.
pub fn load_config() -> Result<TabHostConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &TabHostConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
