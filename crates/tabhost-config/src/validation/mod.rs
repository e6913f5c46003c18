//! Full configuration validation.
//!
//! Collects every problem into a single `ConfigError` instead of stopping
//! at the first one.

mod helpers;

use crate::schema::{CertificatePolicy, TabHostConfig};
use tabhost_common::ConfigError;

use helpers::validate_range;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &TabHostConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_range(&mut errors, "window.width", config.window.width, 1, 16384);
    validate_range(&mut errors, "window.height", config.window.height, 1, 16384);
    validate_range(&mut errors, "bounds.debounce_ms", config.bounds.debounce_ms, 1, 2000);
    validate_range(
        &mut errors,
        "surface.headless_load_ms",
        config.surface.headless_load_ms,
        0,
        60_000,
    );
    validate_range(
        &mut errors,
        "events.channel_capacity",
        config.events.channel_capacity,
        16,
        65536,
    );

    let chrome = &config.bounds.chrome;
    for (name, value) in [
        ("bounds.chrome.top", chrome.top),
        ("bounds.chrome.right", chrome.right),
        ("bounds.chrome.bottom", chrome.bottom),
        ("bounds.chrome.left", chrome.left),
    ] {
        validate_range(&mut errors, name, value, 0, 16384);
    }
    if chrome.horizontal() >= config.window.width {
        errors.push("bounds.chrome left + right leaves no content width".into());
    }
    if chrome.vertical() >= config.window.height {
        errors.push("bounds.chrome top + bottom leaves no content height".into());
    }

    if config.security.certificate_policy == CertificatePolicy::AllowList
        && config.security.allowed_hosts.is_empty()
    {
        errors.push("security.allowed_hosts is empty under the allow-list policy".into());
    }

    if config.surface.default_url.trim().is_empty() {
        errors.push("surface.default_url must not be empty".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&TabHostConfig::default()).is_ok());
    }

    #[test]
    fn debounce_out_of_range() {
        let mut config = TabHostConfig::default();
        config.bounds.debounce_ms = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("bounds.debounce_ms = 0"));
    }

    #[test]
    fn chrome_larger_than_window() {
        let mut config = TabHostConfig::default();
        config.bounds.chrome.top = 500;
        config.bounds.chrome.bottom = 400;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("no content height"));
    }

    #[test]
    fn huge_chrome_margins_are_reported() {
        let mut config = TabHostConfig::default();
        config.bounds.chrome.left = u32::MAX;
        config.bounds.chrome.right = 1;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("bounds.chrome.left"));
        assert!(err.contains("no content width"));
    }

    #[test]
    fn allow_list_needs_hosts() {
        let mut config = TabHostConfig::default();
        config.security.certificate_policy = CertificatePolicy::AllowList;
        assert!(validate(&config).is_err());
        config.security.allowed_hosts.push("localhost".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = TabHostConfig::default();
        config.bounds.debounce_ms = 5000;
        config.events.channel_capacity = 1;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("bounds.debounce_ms"));
        assert!(err.contains("events.channel_capacity"));
    }
}
