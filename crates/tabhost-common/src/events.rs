use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::id::TabId;

/// Whether a committed navigation replaced the document or only moved
/// within it (fragment change, pushState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationKind {
    InPage,
    Full,
}

/// One-way events from the host to the UI process.
///
/// Every variant carries the id of the tab it concerns so a subscriber can
/// drop events for tabs it does not track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum HostEvent {
    Navigation {
        tab_id: TabId,
        url: String,
        kind: NavigationKind,
    },
    LoadingStarted {
        tab_id: TabId,
    },
    LoadingFinished {
        tab_id: TabId,
        url: String,
        title: String,
    },
    LoadingFailed {
        tab_id: TabId,
        error_code: i32,
        error_description: String,
        url: String,
    },
    TitleUpdated {
        tab_id: TabId,
        title: String,
    },
    TabCreated {
        tab_id: TabId,
        url: String,
        created_at: DateTime<Utc>,
    },
    TabSwitched {
        tab_id: TabId,
        previous: Option<TabId>,
    },
    TabClosed {
        tab_id: TabId,
    },
}

impl HostEvent {
    pub fn tab_id(&self) -> TabId {
        match self {
            Self::Navigation { tab_id, .. }
            | Self::LoadingStarted { tab_id }
            | Self::LoadingFinished { tab_id, .. }
            | Self::LoadingFailed { tab_id, .. }
            | Self::TitleUpdated { tab_id, .. }
            | Self::TabCreated { tab_id, .. }
            | Self::TabSwitched { tab_id, .. }
            | Self::TabClosed { tab_id } => *tab_id,
        }
    }
}

/// Fan-out channel for host events. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HostEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: HostEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(HostEvent::LoadingStarted { tab_id: TabId(1) });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, HostEvent::LoadingStarted { tab_id: TabId(1) });
    }

    #[test]
    fn publish_returns_zero_with_no_subscribers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(HostEvent::TabClosed { tab_id: TabId(1) }), 0);
    }

    #[test]
    fn event_wire_shape() {
        let event = HostEvent::LoadingFailed {
            tab_id: TabId(4),
            error_code: -105,
            error_description: "ERR_NAME_NOT_RESOLVED".into(),
            url: "https://nope.invalid".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "loading-failed");
        assert_eq!(json["tabId"], 4);
        assert_eq!(json["errorCode"], -105);
        assert_eq!(json["errorDescription"], "ERR_NAME_NOT_RESOLVED");

        let nav = HostEvent::Navigation {
            tab_id: TabId(1),
            url: "https://example.com/#top".into(),
            kind: NavigationKind::InPage,
        };
        let json = serde_json::to_value(&nav).unwrap();
        assert_eq!(json["kind"], "in-page");
    }

    #[test]
    fn every_event_reports_its_tab() {
        let events = [
            HostEvent::LoadingStarted { tab_id: TabId(3) },
            HostEvent::TabSwitched {
                tab_id: TabId(3),
                previous: Some(TabId(1)),
            },
            HostEvent::TabClosed { tab_id: TabId(3) },
        ];
        assert!(events.iter().all(|e| e.tab_id() == TabId(3)));
    }
}
