//! Window geometry and bounds planning settings.

use serde::{Deserialize, Serialize};

/// Outer window size used when no native window supplies one
/// (headless mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Space taken by the UI chrome around the content area, in pixels.
///
/// Only used to estimate the content rectangle when the UI has not sent
/// precise geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChromeMargins {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl ChromeMargins {
    /// Left plus right, saturating.
    pub fn horizontal(&self) -> u32 {
        self.left.saturating_add(self.right)
    }

    /// Top plus bottom, saturating.
    pub fn vertical(&self) -> u32 {
        self.top.saturating_add(self.bottom)
    }
}

impl Default for ChromeMargins {
    fn default() -> Self {
        Self {
            top: 80,
            right: 0,
            bottom: 0,
            left: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsConfig {
    /// Bounds requests closer together than this are coalesced
    /// (valid range: 1-2000).
    pub debounce_ms: u32,
    pub chrome: ChromeMargins,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            chrome: ChromeMargins::default(),
        }
    }
}
