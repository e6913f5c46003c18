//! Per-surface creation settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// URL loaded when a tab is created with an empty URL.
    pub default_url: String,
    pub user_agent: Option<String>,
    pub devtools: bool,
    /// Simulated load time of the headless engine, in milliseconds.
    pub headless_load_ms: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            default_url: "about:blank".into(),
            user_agent: Some(concat!("tabhost/", env!("CARGO_PKG_VERSION")).into()),
            devtools: cfg!(debug_assertions),
            headless_load_ms: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_defaults() {
        let config = SurfaceConfig::default();
        assert_eq!(config.default_url, "about:blank");
        assert!(config.user_agent.as_deref().unwrap().starts_with("tabhost/"));
        assert_eq!(config.headless_load_ms, 20);
    }
}
