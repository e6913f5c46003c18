//! TOML config loading: read from a path or the platform default.

use std::path::{Path, PathBuf};

use tabhost_common::ConfigError;
use tracing::{info, warn};

use crate::schema::TabHostConfig;
use crate::validation;

const DEFAULT_CONFIG_TOML: &str = r#"# tabhost configuration
# Every key is optional; missing keys use the defaults shown here.

[window]
width = 1280
height = 800

[bounds]
# Bounds requests arriving faster than this are coalesced.
debounce_ms = 50

[bounds.chrome]
top = 80
right = 0
bottom = 0
left = 0

[surface]
default_url = "about:blank"
headless_load_ms = 20

[security]
# accept-all | allow-list | strict
certificate_policy = "accept-all"
allowed_hosts = []

[events]
channel_capacity = 256

[logging]
level = "info"
"#;

/// Get the platform-specific default config file path.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("tabhost").join("config.toml"))
}

/// Load config from a specific TOML file path.
///
/// Missing fields take their defaults. A config that parses but fails
/// validation is returned with a warning; callers that need a strict
/// check run [`validation::validate`] themselves.
pub fn load_from_path(path: &Path) -> Result<TabHostConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: TabHostConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform default path, writing a documented
/// default file first if none exists.
pub fn load_default() -> Result<TabHostConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            create_default_config(&path)?;
            Ok(TabHostConfig::default())
        }
        Err(e) => Err(e),
    }
}

/// Write the documented default config file.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TOML).map_err(|e| {
        ConfigError::ParseError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    })?;

    info!("created default config at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CertificatePolicy;

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_path(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn loads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[bounds]\ndebounce_ms = 75\n").unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.bounds.debounce_ms, 75);
        assert_eq!(config.window.height, 800);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[bounds\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(ref m) if m.contains("TOML")));
    }

    #[test]
    fn default_template_matches_defaults() {
        let parsed: TabHostConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        let defaults = TabHostConfig::default();
        assert_eq!(parsed.bounds.debounce_ms, defaults.bounds.debounce_ms);
        assert_eq!(parsed.bounds.chrome, defaults.bounds.chrome);
        assert_eq!(parsed.security.certificate_policy, CertificatePolicy::AcceptAll);
        assert!(validation::validate(&parsed).is_ok());
    }

    #[test]
    fn create_default_writes_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        create_default_config(&path).unwrap();
        assert!(load_from_path(&path).is_ok());
    }
}
