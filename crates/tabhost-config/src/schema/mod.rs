//! Configuration schema types for tabhost.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod security;
mod surface;
mod system;
mod window;

pub use security::*;
pub use surface::*;
pub use system::*;
pub use window::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for the host process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct TabHostConfig {
    pub window: WindowConfig,
    pub bounds: BoundsConfig,
    pub surface: SurfaceConfig,
    pub security: SecurityConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: TabHostConfig = toml::from_str("").unwrap();
        assert_eq!(config.bounds.debounce_ms, 50);
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.security.certificate_policy, CertificatePolicy::AcceptAll);
        assert_eq!(config.events.channel_capacity, 256);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let toml_str = r#"
[bounds]
debounce_ms = 120

[bounds.chrome]
top = 96

[security]
certificate_policy = "allow-list"
allowed_hosts = ["intranet.local"]
"#;
        let config: TabHostConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bounds.debounce_ms, 120);
        assert_eq!(config.bounds.chrome.top, 96);
        assert_eq!(config.bounds.chrome.left, 0);
        assert_eq!(config.security.certificate_policy, CertificatePolicy::AllowList);
        assert_eq!(config.security.allowed_hosts, vec!["intranet.local".to_string()]);
        assert_eq!(config.surface.default_url, "about:blank");
    }
}
