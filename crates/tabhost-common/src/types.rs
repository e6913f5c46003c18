use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::TabId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Snap to whole pixels, clamping the size so it is never negative.
    pub fn to_pixels(self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
            width: self.width.round().max(0.0),
            height: self.height.round().max(0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Navigation state of one tab as seen by the host.
///
/// `tab_id` is `None` for the "no tab" sentinel returned when nothing is
/// in the foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub tab_id: Option<TabId>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub is_loading: bool,
    pub url: String,
    pub title: String,
}

impl NavigationState {
    pub fn no_tab() -> Self {
        Self {
            tab_id: None,
            can_go_back: false,
            can_go_forward: false,
            is_loading: false,
            url: String::new(),
            title: String::new(),
        }
    }

    pub fn is_no_tab(&self) -> bool {
        self.tab_id.is_none()
    }
}

/// Result of a history navigation. Refusal is an ordinary outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NavigationOutcome {
    pub fn done() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSummary {
    pub id: TabId,
    pub url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}
