//! The boundary contract between the UI process and the privileged host.
//!
//! Requests and responses are paired one-to-one by the transport. Events
//! flow the other way without acknowledgement. On a byte stream every
//! message is one line of JSON (see [`WireMessage`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::HostError;
use crate::events::HostEvent;
use crate::id::TabId;
use crate::types::{NavigationOutcome, NavigationState, Rect, TabSummary};

/// Bumped whenever a request or response shape changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;

/// Per-tab creation options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TabOptions {
    /// Bring the tab to the foreground once it is created.
    pub activate: bool,
    /// Override the configured user agent for this tab.
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "method",
    content = "params",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum HostRequest {
    CreateTab {
        url: String,
        #[serde(default)]
        options: TabOptions,
    },
    SwitchTab {
        tab_id: TabId,
    },
    #[serde(rename = "loadURL")]
    LoadUrl {
        url: String,
        tab_id: Option<TabId>,
    },
    GoBack {
        tab_id: Option<TabId>,
    },
    GoForward {
        tab_id: Option<TabId>,
    },
    Reload {
        tab_id: Option<TabId>,
    },
    ExecuteScript {
        script: String,
        tab_id: Option<TabId>,
    },
    GetNavigationState {
        tab_id: Option<TabId>,
    },
    CloseTab {
        tab_id: TabId,
    },
    UpdateBounds {
        bounds: Option<Rect>,
    },
    ListTabs,
}

impl HostRequest {
    /// Short name used in logs and UI failure reports.
    pub fn method(&self) -> &'static str {
        match self {
            Self::CreateTab { .. } => "createTab",
            Self::SwitchTab { .. } => "switchTab",
            Self::LoadUrl { .. } => "loadURL",
            Self::GoBack { .. } => "goBack",
            Self::GoForward { .. } => "goForward",
            Self::Reload { .. } => "reload",
            Self::ExecuteScript { .. } => "executeScript",
            Self::GetNavigationState { .. } => "getNavigationState",
            Self::CloseTab { .. } => "closeTab",
            Self::UpdateBounds { .. } => "updateBounds",
            Self::ListTabs => "listTabs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum HostResponse {
    TabCreated {
        tab_id: TabId,
        url: String,
        created_at: DateTime<Utc>,
    },
    Switched { id: TabId },
    Loaded { success: bool, url: String, tab_id: TabId },
    History(NavigationOutcome),
    Reloaded { success: bool, tab_id: TabId },
    ScriptResult { value: serde_json::Value },
    NavigationState(NavigationState),
    Closed { success: bool, tab_id: TabId },
    Bounds { success: bool },
    Tabs { tabs: Vec<TabSummary> },
}

/// One line on a byte-stream boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "kebab-case")]
pub enum WireMessage {
    Request {
        id: u64,
        version: u32,
        request: HostRequest,
    },
    Response {
        id: u64,
        result: Result<HostResponse, HostError>,
    },
    Event {
        event: HostEvent,
    },
    /// `skipped` host events were lost before reaching the wire. The
    /// client can no longer trust a mirror built from events alone.
    Lagged {
        skipped: u64,
    },
}

impl WireMessage {
    pub fn request(id: u64, request: HostRequest) -> Self {
        Self::Request {
            id,
            version: PROTOCOL_VERSION,
            request,
        }
    }

    pub fn to_line(&self) -> Result<String, HostError> {
        let mut line =
            serde_json::to_string(self).map_err(|e| HostError::Protocol(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_line(line: &str) -> Result<Self, HostError> {
        serde_json::from_str(line.trim()).map_err(|e| HostError::Protocol(e.to_string()))
    }
}
