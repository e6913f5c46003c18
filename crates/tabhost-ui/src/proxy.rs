//! UI-side mirror of the host's tabs.
//!
//! [`TabProxy`] forwards commands over a [`Boundary`] and keeps a cache of
//! [`TabRecord`]s. The cache is written only from responses to its own
//! commands and from host events about tabs it tracks, so it trails the
//! host but never contradicts it. Read-only queries fall back to the
//! cache when the boundary fails.

use std::collections::HashMap;

use serde_json::Value;
use tabhost_common::{
    Boundary, HostError, HostEvent, HostRequest, HostResponse, NavigationOutcome,
    NavigationState, Rect, TabId, TabOptions,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use crate::record::{TabRecord, UiEvent};

pub struct TabProxy<B> {
    boundary: B,
    host_events: broadcast::Receiver<HostEvent>,
    gaps: Option<broadcast::Receiver<u64>>,
    records: HashMap<TabId, TabRecord>,
    order: Vec<TabId>,
    active: Option<TabId>,
    ui_events: broadcast::Sender<UiEvent>,
}

/// Resolves with the next gap notice; never resolves for boundaries that
/// send none.
async fn next_gap(gaps: &mut Option<broadcast::Receiver<u64>>) -> u64 {
    if let Some(rx) = gaps.as_mut() {
        match rx.recv().await {
            Ok(skipped) | Err(RecvError::Lagged(skipped)) => return skipped,
            Err(RecvError::Closed) => {}
        }
    }
    *gaps = None;
    std::future::pending().await
}

fn unexpected(method: &str, response: HostResponse) -> HostError {
    HostError::Protocol(format!("unexpected response to {method}: {response:?}"))
}

impl<B: Boundary> TabProxy<B> {
    pub fn new(boundary: B, event_capacity: usize) -> Self {
        let host_events = boundary.subscribe();
        let gaps = boundary.subscribe_gaps();
        let (ui_events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            boundary,
            host_events,
            gaps,
            records: HashMap::new(),
            order: Vec::new(),
            active: None,
            ui_events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.ui_events.subscribe()
    }

    pub fn boundary(&self) -> &B {
        &self.boundary
    }

    pub fn active(&self) -> Option<TabId> {
        self.active
    }

    pub fn record(&self, tab_id: TabId) -> Option<&TabRecord> {
        self.records.get(&tab_id)
    }

    /// Tracked tabs in the order they were first seen.
    pub fn records(&self) -> impl Iterator<Item = &TabRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    // -- commands -----------------------------------------------------------

    pub async fn create_tab(&mut self, url: &str, options: TabOptions) -> Result<TabId, HostError> {
        let activate = options.activate;
        let request = HostRequest::CreateTab {
            url: url.to_string(),
            options,
        };
        match self.call(request).await? {
            HostResponse::TabCreated {
                tab_id,
                url,
                created_at,
            } => {
                self.track(TabRecord::new(tab_id, url, created_at));
                if activate {
                    self.set_active(Some(tab_id));
                }
                Ok(tab_id)
            }
            other => Err(unexpected("createTab", other)),
        }
    }

    pub async fn switch_tab(&mut self, tab_id: TabId) -> Result<(), HostError> {
        match self.call(HostRequest::SwitchTab { tab_id }).await? {
            HostResponse::Switched { id } => {
                self.set_active(Some(id));
                Ok(())
            }
            other => Err(unexpected("switchTab", other)),
        }
    }

    pub async fn load_url(&mut self, url: &str, tab_id: Option<TabId>) -> Result<TabId, HostError> {
        let request = HostRequest::LoadUrl {
            url: url.to_string(),
            tab_id,
        };
        match self.call(request).await? {
            HostResponse::Loaded { tab_id, .. } => Ok(tab_id),
            other => Err(unexpected("loadURL", other)),
        }
    }

    pub async fn go_back(&mut self, tab_id: Option<TabId>) -> Result<NavigationOutcome, HostError> {
        match self.call(HostRequest::GoBack { tab_id }).await? {
            HostResponse::History(outcome) => Ok(outcome),
            other => Err(unexpected("goBack", other)),
        }
    }

    pub async fn go_forward(
        &mut self,
        tab_id: Option<TabId>,
    ) -> Result<NavigationOutcome, HostError> {
        match self.call(HostRequest::GoForward { tab_id }).await? {
            HostResponse::History(outcome) => Ok(outcome),
            other => Err(unexpected("goForward", other)),
        }
    }

    pub async fn reload(&mut self, tab_id: Option<TabId>) -> Result<TabId, HostError> {
        match self.call(HostRequest::Reload { tab_id }).await? {
            HostResponse::Reloaded { tab_id, .. } => Ok(tab_id),
            other => Err(unexpected("reload", other)),
        }
    }

    pub async fn execute_script(
        &mut self,
        script: &str,
        tab_id: Option<TabId>,
    ) -> Result<Value, HostError> {
        let request = HostRequest::ExecuteScript {
            script: script.to_string(),
            tab_id,
        };
        match self.call(request).await? {
            HostResponse::ScriptResult { value } => Ok(value),
            other => Err(unexpected("executeScript", other)),
        }
    }

    /// Read-through navigation state.
    ///
    /// A fresh answer updates the cached record. If the boundary fails the
    /// cached record is returned instead, or the "no tab" sentinel when
    /// nothing is cached for the tab.
    pub async fn navigation_state(
        &mut self,
        tab_id: Option<TabId>,
    ) -> Result<NavigationState, HostError> {
        match self
            .boundary
            .call(HostRequest::GetNavigationState { tab_id })
            .await
        {
            Ok(HostResponse::NavigationState(state)) => {
                if let Some(id) = state.tab_id {
                    let changed = match self.records.get_mut(&id) {
                        Some(record) if record.to_state() != state => {
                            record.absorb(&state);
                            true
                        }
                        _ => false,
                    };
                    if changed {
                        self.notify(UiEvent::RecordUpdated(id));
                    }
                }
                Ok(state)
            }
            Ok(other) => Err(unexpected("getNavigationState", other)),
            Err(e) if e.is_boundary() => {
                warn!(error = %e, "navigation state unavailable, using cache");
                Ok(tab_id
                    .or(self.active)
                    .and_then(|id| self.records.get(&id))
                    .map(TabRecord::to_state)
                    .unwrap_or_else(NavigationState::no_tab))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn close_tab(&mut self, tab_id: TabId) -> Result<(), HostError> {
        match self.call(HostRequest::CloseTab { tab_id }).await? {
            HostResponse::Closed { tab_id, .. } => {
                self.untrack(tab_id);
                Ok(())
            }
            other => Err(unexpected("closeTab", other)),
        }
    }

    /// Send the content rectangle, or `None` to let the host estimate it.
    /// Returns whether a foreground tab will be sized.
    pub async fn update_bounds(&mut self, bounds: Option<Rect>) -> Result<bool, HostError> {
        match self.call(HostRequest::UpdateBounds { bounds }).await? {
            HostResponse::Bounds { success } => Ok(success),
            other => Err(unexpected("updateBounds", other)),
        }
    }

    /// Rebuild the cache from the host's tab list.
    pub async fn refresh_tabs(&mut self) -> Result<(), HostError> {
        let tabs = match self.call(HostRequest::ListTabs).await? {
            HostResponse::Tabs { tabs } => tabs,
            other => return Err(unexpected("listTabs", other)),
        };

        let stale: Vec<TabId> = self
            .order
            .iter()
            .copied()
            .filter(|id| !tabs.iter().any(|t| t.id == *id))
            .collect();
        for id in stale {
            self.untrack(id);
        }

        let mut active = None;
        for summary in &tabs {
            if summary.active {
                active = Some(summary.id);
            }
            match self.records.get_mut(&summary.id) {
                Some(record) => {
                    if record.url != summary.url || record.title != summary.title {
                        record.url = summary.url.clone();
                        record.title = summary.title.clone();
                        self.notify(UiEvent::RecordUpdated(summary.id));
                    }
                }
                None => self.track(TabRecord::from_summary(summary)),
            }
        }
        self.set_active(active);
        Ok(())
    }

    // -- events -------------------------------------------------------------

    /// Apply every host event that has already arrived. Returns how many
    /// were seen.
    pub async fn sync_events(&mut self) -> usize {
        let mut seen = 0;
        loop {
            match self.host_events.try_recv() {
                Ok(event) => {
                    self.handle_event(event).await;
                    seen += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "host events lagged, resyncing");
                    self.resync().await;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if let Some(skipped) = self.take_gaps() {
            warn!(skipped, "host lost events, resyncing");
            self.resync().await;
        }
        seen
    }

    /// Wait for the next host event and apply it. `None` once the host is
    /// gone.
    pub async fn next_event(&mut self) -> Option<HostEvent> {
        loop {
            let next = tokio::select! {
                biased;
                skipped = next_gap(&mut self.gaps) => Err(skipped),
                received = self.host_events.recv() => Ok(received),
            };
            let received = match next {
                Ok(received) => received,
                Err(skipped) => {
                    warn!(skipped, "host lost events, resyncing");
                    self.resync().await;
                    continue;
                }
            };
            match received {
                Ok(event) => {
                    self.handle_event(event.clone()).await;
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "host events lagged, resyncing");
                    self.resync().await;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn handle_event(&mut self, event: HostEvent) {
        let finished = match &event {
            HostEvent::LoadingFinished { tab_id, .. } if self.records.contains_key(tab_id) => {
                Some(*tab_id)
            }
            _ => None,
        };
        self.apply_event(&event);
        // History flags are not part of any event.
        if let Some(tab_id) = finished {
            if let Err(e) = self.navigation_state(Some(tab_id)).await {
                debug!(%tab_id, error = %e, "read-through after load failed");
            }
        }
    }

    /// Fold one host event into the cache. Returns `false` when the event
    /// concerned a tab this proxy does not track.
    pub fn apply_event(&mut self, event: &HostEvent) -> bool {
        let tab_id = event.tab_id();
        match event {
            HostEvent::TabCreated {
                url, created_at, ..
            } => {
                if !self.records.contains_key(&tab_id) {
                    self.track(TabRecord::new(tab_id, url.clone(), *created_at));
                }
                return true;
            }
            HostEvent::TabClosed { .. } => {
                return self.untrack(tab_id);
            }
            HostEvent::TabSwitched { .. } => {
                if !self.records.contains_key(&tab_id) {
                    return false;
                }
                self.set_active(Some(tab_id));
                return true;
            }
            _ => {}
        }

        let Some(record) = self.records.get_mut(&tab_id) else {
            debug!(%tab_id, "event for untracked tab ignored");
            return false;
        };
        match event {
            HostEvent::Navigation { url, .. } => record.url = url.clone(),
            HostEvent::LoadingStarted { .. } => record.is_loading = true,
            HostEvent::LoadingFinished { url, title, .. } => {
                record.is_loading = false;
                record.url = url.clone();
                if !title.is_empty() {
                    record.title = title.clone();
                }
            }
            HostEvent::LoadingFailed { .. } => record.is_loading = false,
            HostEvent::TitleUpdated { title, .. } => record.title = title.clone(),
            HostEvent::TabCreated { .. }
            | HostEvent::TabClosed { .. }
            | HostEvent::TabSwitched { .. } => {}
        }
        self.notify(UiEvent::RecordUpdated(tab_id));
        true
    }

    /// Total of the gap notices waiting, if any.
    fn take_gaps(&mut self) -> Option<u64> {
        let gaps = self.gaps.as_mut()?;
        let mut total = None;
        loop {
            match gaps.try_recv() {
                Ok(skipped) | Err(TryRecvError::Lagged(skipped)) => {
                    total = Some(total.unwrap_or(0) + skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return total,
            }
        }
    }

    async fn resync(&mut self) {
        if let Err(e) = self.refresh_tabs().await {
            warn!(error = %e, "resync failed");
        }
    }

    // -- internals ----------------------------------------------------------

    /// Forward a command, raising `ActionFailed` for failures the user
    /// should see on the control.
    async fn call(&self, request: HostRequest) -> Result<HostResponse, HostError> {
        let action = request.method();
        let result = self.boundary.call(request).await;
        if let Err(e) = &result {
            if e.is_boundary() || matches!(e, HostError::Creation(_)) {
                warn!(action, error = %e, "action failed");
                self.notify(UiEvent::ActionFailed {
                    action: action.to_string(),
                    message: e.to_string(),
                });
            }
        }
        result
    }

    fn track(&mut self, record: TabRecord) {
        let id = record.id;
        if self.records.insert(id, record).is_none() {
            self.order.push(id);
            self.notify(UiEvent::TabAdded(id));
        }
    }

    fn untrack(&mut self, tab_id: TabId) -> bool {
        if self.records.remove(&tab_id).is_none() {
            return false;
        }
        self.order.retain(|id| *id != tab_id);
        self.notify(UiEvent::TabRemoved(tab_id));
        if self.active == Some(tab_id) {
            self.set_active(None);
        }
        true
    }

    fn set_active(&mut self, active: Option<TabId>) {
        if self.active != active {
            self.active = active;
            self.notify(UiEvent::ActiveChanged(active));
        }
    }

    fn notify(&self, event: UiEvent) {
        // No subscribers is fine; the cache is still updated.
        let _ = self.ui_events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    /// Answers calls from a script and records which methods were called.
    struct ScriptedBoundary {
        replies: Mutex<VecDeque<Result<HostResponse, HostError>>>,
        calls: Mutex<Vec<&'static str>>,
        events: broadcast::Sender<HostEvent>,
        gaps: broadcast::Sender<u64>,
    }

    impl ScriptedBoundary {
        fn new() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                events: broadcast::channel(64).0,
                gaps: broadcast::channel(4).0,
            }
        }

        fn reply(&self, result: Result<HostResponse, HostError>) {
            self.replies.lock().unwrap().push_back(result);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Boundary for ScriptedBoundary {
        async fn call(&self, request: HostRequest) -> Result<HostResponse, HostError> {
            self.calls.lock().unwrap().push(request.method());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(HostError::Boundary("no scripted reply".into())))
        }

        fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
            self.events.subscribe()
        }

        fn subscribe_gaps(&self) -> Option<broadcast::Receiver<u64>> {
            Some(self.gaps.subscribe())
        }
    }

    fn created(id: u64, url: &str) -> Result<HostResponse, HostError> {
        Ok(HostResponse::TabCreated {
            tab_id: TabId(id),
            url: url.into(),
            created_at: Utc::now(),
        })
    }

    fn state(id: u64, url: &str, can_go_back: bool) -> NavigationState {
        NavigationState {
            tab_id: Some(TabId(id)),
            can_go_back,
            can_go_forward: false,
            is_loading: false,
            url: url.into(),
            title: "Title".into(),
        }
    }

    #[tokio::test]
    async fn boundary_failure_falls_back_to_cached_record() {
        let mut proxy = TabProxy::new(ScriptedBoundary::new(), 16);
        proxy.boundary().reply(created(1, "https://a.test/"));
        proxy.boundary().reply(Ok(HostResponse::Switched { id: TabId(1) }));
        proxy
            .boundary()
            .reply(Ok(HostResponse::NavigationState(state(1, "https://a.test/", true))));

        let id = proxy
            .create_tab("https://a.test/", TabOptions::default())
            .await
            .unwrap();
        proxy.switch_tab(id).await.unwrap();
        let fresh = proxy.navigation_state(None).await.unwrap();
        assert!(fresh.can_go_back);

        let mut ui = proxy.subscribe();
        proxy
            .boundary()
            .reply(Err(HostError::Boundary("pipe closed".into())));
        let cached = proxy.navigation_state(None).await.unwrap();
        assert_eq!(cached, fresh);
        assert!(ui.try_recv().is_err(), "read-only fallback is silent");
    }

    #[tokio::test]
    async fn fallback_without_cache_is_the_sentinel() {
        let mut proxy = TabProxy::new(ScriptedBoundary::new(), 16);
        let state = proxy.navigation_state(Some(TabId(9))).await.unwrap();
        assert!(state.is_no_tab());
    }

    #[tokio::test]
    async fn command_errors_are_not_masked() {
        let mut proxy = TabProxy::new(ScriptedBoundary::new(), 16);
        proxy
            .boundary()
            .reply(Err(HostError::NotFound(TabId(4))));
        assert_eq!(
            proxy.navigation_state(Some(TabId(4))).await,
            Err(HostError::NotFound(TabId(4)))
        );
    }

    #[tokio::test]
    async fn creation_failure_raises_action_failed() {
        let mut proxy = TabProxy::new(ScriptedBoundary::new(), 16);
        let mut ui = proxy.subscribe();
        proxy
            .boundary()
            .reply(Err(HostError::Creation("engine refused".into())));

        let err = proxy
            .create_tab("https://a.test/", TabOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Creation(_)));
        match ui.try_recv().unwrap() {
            UiEvent::ActionFailed { action, message } => {
                assert_eq!(action, "createTab");
                assert!(message.contains("engine refused"));
            }
            other => panic!("unexpected ui event: {other:?}"),
        }
        assert_eq!(proxy.records().count(), 0);
    }

    #[tokio::test]
    async fn refused_history_is_not_a_failure() {
        let mut proxy = TabProxy::new(ScriptedBoundary::new(), 16);
        let mut ui = proxy.subscribe();
        proxy.boundary().reply(Ok(HostResponse::History(
            NavigationOutcome::refused("Cannot go back"),
        )));
        let outcome = proxy.go_back(None).await.unwrap();
        assert!(!outcome.success);
        assert!(ui.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_only_touch_tracked_tabs() {
        let mut proxy = TabProxy::new(ScriptedBoundary::new(), 16);
        assert!(!proxy.apply_event(&HostEvent::TitleUpdated {
            tab_id: TabId(5),
            title: "ghost".into(),
        }));
        assert!(proxy.record(TabId(5)).is_none());

        assert!(proxy.apply_event(&HostEvent::TabCreated {
            tab_id: TabId(5),
            url: "https://e.test/".into(),
            created_at: Utc::now(),
        }));
        assert!(proxy.apply_event(&HostEvent::LoadingStarted { tab_id: TabId(5) }));
        assert!(proxy.record(TabId(5)).unwrap().is_loading);
        assert!(proxy.apply_event(&HostEvent::TitleUpdated {
            tab_id: TabId(5),
            title: "E".into(),
        }));
        assert_eq!(proxy.record(TabId(5)).unwrap().title, "E");

        assert!(proxy.apply_event(&HostEvent::TabSwitched {
            tab_id: TabId(5),
            previous: None,
        }));
        assert_eq!(proxy.active(), Some(TabId(5)));
        assert!(proxy.apply_event(&HostEvent::TabClosed { tab_id: TabId(5) }));
        assert_eq!(proxy.active(), None);
        assert!(proxy.record(TabId(5)).is_none());
    }

    #[tokio::test]
    async fn loading_finished_reads_history_flags_through() {
        let boundary = ScriptedBoundary::new();
        let events = boundary.events.clone();
        let mut proxy = TabProxy::new(boundary, 16);
        proxy.boundary().reply(created(2, "https://b.test/"));
        proxy
            .create_tab("https://b.test/", TabOptions::default())
            .await
            .unwrap();

        proxy
            .boundary()
            .reply(Ok(HostResponse::NavigationState(state(2, "https://b.test/next", true))));
        events
            .send(HostEvent::LoadingStarted { tab_id: TabId(2) })
            .unwrap();
        events
            .send(HostEvent::LoadingFinished {
                tab_id: TabId(2),
                url: "https://b.test/next".into(),
                title: "Next".into(),
            })
            .unwrap();
        assert_eq!(proxy.sync_events().await, 2);

        let record = proxy.record(TabId(2)).unwrap();
        assert!(record.can_go_back);
        assert!(!record.is_loading);
        assert_eq!(
            proxy.boundary().calls(),
            vec!["createTab", "getNavigationState"]
        );
    }

    #[tokio::test]
    async fn closing_the_active_tab_clears_it() {
        let mut proxy = TabProxy::new(ScriptedBoundary::new(), 16);
        proxy.boundary().reply(created(1, "https://a.test/"));
        proxy.boundary().reply(Ok(HostResponse::Closed {
            success: true,
            tab_id: TabId(1),
        }));
        let id = proxy
            .create_tab(
                "https://a.test/",
                TabOptions {
                    activate: true,
                    user_agent: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(proxy.active(), Some(id));

        let mut ui = proxy.subscribe();
        proxy.close_tab(id).await.unwrap();
        assert_eq!(ui.try_recv().unwrap(), UiEvent::TabRemoved(id));
        assert_eq!(ui.try_recv().unwrap(), UiEvent::ActiveChanged(None));
        assert_eq!(proxy.active(), None);
    }

    fn listed(id: u64, url: &str, title: &str) -> Result<HostResponse, HostError> {
        Ok(HostResponse::Tabs {
            tabs: vec![tabhost_common::TabSummary {
                id: TabId(id),
                url: url.into(),
                title: title.into(),
                created_at: Utc::now(),
                active: true,
            }],
        })
    }

    #[tokio::test]
    async fn lost_host_events_trigger_a_resync() {
        let mut proxy = TabProxy::new(ScriptedBoundary::new(), 16);
        proxy.boundary().reply(created(1, "https://a.test/"));
        proxy
            .create_tab("https://a.test/", TabOptions::default())
            .await
            .unwrap();

        proxy.boundary().gaps.send(20).unwrap();
        proxy
            .boundary()
            .reply(listed(1, "https://a.test/next", "Next"));
        proxy.sync_events().await;

        assert_eq!(proxy.boundary().calls(), vec!["createTab", "listTabs"]);
        let record = proxy.record(TabId(1)).unwrap();
        assert_eq!(record.url, "https://a.test/next");
        assert_eq!(record.title, "Next");
        assert_eq!(proxy.active(), Some(TabId(1)));
    }

    #[tokio::test]
    async fn waiting_for_events_resyncs_on_a_gap() {
        let mut proxy = TabProxy::new(ScriptedBoundary::new(), 16);
        proxy.boundary().gaps.send(3).unwrap();
        proxy
            .boundary()
            .reply(listed(4, "https://d.test/", "Dee"));
        proxy
            .boundary()
            .events
            .send(HostEvent::TitleUpdated {
                tab_id: TabId(4),
                title: "Dee 2".into(),
            })
            .unwrap();

        let event = proxy.next_event().await.unwrap();
        assert_eq!(event.tab_id(), TabId(4));
        assert_eq!(proxy.boundary().calls(), vec!["listTabs"]);
        assert_eq!(proxy.record(TabId(4)).unwrap().title, "Dee 2");
    }
}
