use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::id::TabId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Errors returned by host commands.
///
/// These travel across the boundary, so they are serializable and carry
/// plain strings rather than source errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum HostError {
    #[error("tab not found: {0}")]
    NotFound(TabId),

    #[error("no active tab")]
    NoActiveTab,

    #[error("surface creation failed: {0}")]
    Creation(String),

    #[error("script execution failed: {0}")]
    Execution(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("boundary error: {0}")]
    Boundary(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl HostError {
    /// True for failures of the transport rather than of the command.
    pub fn is_boundary(&self) -> bool {
        matches!(self, Self::Boundary(_) | Self::Protocol(_))
    }
}
