//! View models kept by the UI process.

use chrono::{DateTime, Utc};
use tabhost_common::{NavigationState, TabId, TabSummary};

/// What the UI knows about one tab. Only ever copied from host responses
/// and events, so it may lag the host but never runs ahead of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabRecord {
    pub id: TabId,
    pub url: String,
    pub title: String,
    pub is_loading: bool,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub created_at: DateTime<Utc>,
}

impl TabRecord {
    pub fn new(id: TabId, url: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            url,
            title: String::new(),
            is_loading: false,
            can_go_back: false,
            can_go_forward: false,
            created_at,
        }
    }

    pub fn from_summary(summary: &TabSummary) -> Self {
        Self {
            title: summary.title.clone(),
            ..Self::new(summary.id, summary.url.clone(), summary.created_at)
        }
    }

    /// Copy an authoritative state read into the record.
    pub fn absorb(&mut self, state: &NavigationState) {
        self.url = state.url.clone();
        self.title = state.title.clone();
        self.is_loading = state.is_loading;
        self.can_go_back = state.can_go_back;
        self.can_go_forward = state.can_go_forward;
    }

    /// The record as a navigation state, for cache fallbacks.
    pub fn to_state(&self) -> NavigationState {
        NavigationState {
            tab_id: Some(self.id),
            can_go_back: self.can_go_back,
            can_go_forward: self.can_go_forward,
            is_loading: self.is_loading,
            url: self.url.clone(),
            title: self.title.clone(),
        }
    }
}

/// Local notifications for UI controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    TabAdded(TabId),
    TabRemoved(TabId),
    ActiveChanged(Option<TabId>),
    RecordUpdated(TabId),
    /// A command could not be delivered or the host could not carry it
    /// out. Shown as a generic failure on the control named by `action`.
    ActionFailed { action: String, message: String },
}
