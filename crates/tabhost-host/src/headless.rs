//! In-memory rendering engine.
//!
//! Behaves like a real engine at the seams this crate cares about: loads
//! complete asynchronously after a configurable latency, history is kept
//! per surface, and lifecycle signals go through the [`SignalSink`].
//! Used by the stdio host binary and by tests.
//!
//! A few host names trigger engine behaviour on purpose:
//! - `*.invalid` fails with `ERR_NAME_NOT_RESOLVED` (-105);
//! - `self-signed.*` raises a certificate problem before loading.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tabhost_common::{Rect, TabId};
use tracing::debug;
use url::Url;

use crate::bridge::{CertificateVerdict, NativeSignal, SignalSink};
use crate::surface::{Surface, SurfaceError, SurfaceFactory, SurfaceSpec};

#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub load_latency: Duration,
    /// Whether new surfaces can be positioned. Can be flipped per surface
    /// through [`PageInspector::set_bounds_supported`].
    pub bounds_supported: bool,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            load_latency: Duration::from_millis(20),
            bounds_supported: true,
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    history: Vec<String>,
    cursor: usize,
    title: String,
    loading: bool,
    visible: bool,
    bounds: Vec<Rect>,
    bounds_supported: bool,
    closed: bool,
    generation: u64,
    user_agent: Option<String>,
}

impl PageState {
    fn current_url(&self) -> String {
        self.history.get(self.cursor).cloned().unwrap_or_default()
    }
}

type SharedPage = Arc<Mutex<PageState>>;

fn lock(page: &SharedPage) -> MutexGuard<'_, PageState> {
    page.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct EngineState {
    options: HeadlessOptions,
    fail_next_allocation: bool,
    pages: HashMap<TabId, SharedPage>,
}

/// Shared handle to the engine. Clones see the same pages.
#[derive(Debug, Clone, Default)]
pub struct HeadlessEngine {
    inner: Arc<Mutex<EngineState>>,
}

impl HeadlessEngine {
    pub fn new(options: HeadlessOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineState {
                options,
                ..Default::default()
            })),
        }
    }

    pub fn factory(&self) -> HeadlessFactory {
        HeadlessFactory {
            engine: self.clone(),
        }
    }

    /// Make the next `create` fail with an allocation error.
    pub fn fail_next_allocation(&self) {
        self.state().fail_next_allocation = true;
    }

    /// Inspect the page backing a tab, if one was ever allocated.
    pub fn page(&self, tab_id: TabId) -> Option<PageInspector> {
        self.state()
            .pages
            .get(&tab_id)
            .map(|page| PageInspector {
                page: Arc::clone(page),
            })
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct HeadlessFactory {
    engine: HeadlessEngine,
}

#[async_trait(?Send)]
impl SurfaceFactory for HeadlessFactory {
    async fn create(
        &mut self,
        spec: SurfaceSpec,
        signals: SignalSink,
    ) -> Result<Box<dyn Surface>, SurfaceError> {
        let mut engine = self.engine.state();
        if std::mem::take(&mut engine.fail_next_allocation) {
            return Err(SurfaceError::Allocation("headless engine refused".into()));
        }

        let page = Arc::new(Mutex::new(PageState {
            bounds_supported: engine.options.bounds_supported,
            user_agent: spec.user_agent,
            ..Default::default()
        }));
        engine.pages.insert(spec.tab_id, Arc::clone(&page));
        debug!(tab_id = %spec.tab_id, "headless surface allocated");

        Ok(Box::new(HeadlessSurface {
            page,
            signals,
            latency: engine.options.load_latency,
        }))
    }
}

/// Read-mostly view of one headless page.
#[derive(Debug, Clone)]
pub struct PageInspector {
    page: SharedPage,
}

impl PageInspector {
    pub fn is_visible(&self) -> bool {
        lock(&self.page).visible
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.page).closed
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.page).loading
    }

    pub fn url(&self) -> String {
        lock(&self.page).current_url()
    }

    pub fn user_agent(&self) -> Option<String> {
        lock(&self.page).user_agent.clone()
    }

    /// Every rectangle applied to the page, oldest first.
    pub fn bounds_log(&self) -> Vec<Rect> {
        lock(&self.page).bounds.clone()
    }

    pub fn set_bounds_supported(&self, supported: bool) {
        lock(&self.page).bounds_supported = supported;
    }
}

pub struct HeadlessSurface {
    page: SharedPage,
    signals: SignalSink,
    latency: Duration,
}

impl HeadlessSurface {
    fn navigate(&self, url: String, in_page: bool) {
        if in_page {
            self.signals
                .emit(NativeSignal::NavigationCommitted { url, in_page: true });
            return;
        }

        let generation = {
            let mut page = lock(&self.page);
            page.generation += 1;
            page.loading = true;
            page.generation
        };
        self.signals.emit(NativeSignal::LoadStarted);
        self.signals.emit(NativeSignal::NavigationCommitted {
            url: url.clone(),
            in_page: false,
        });

        let page = Arc::clone(&self.page);
        let signals = self.signals.clone();
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            complete_load(&page, &signals, generation, url);
        });
    }
}

fn complete_load(page: &SharedPage, signals: &SignalSink, generation: u64, url: String) {
    let host = Url::parse(&url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default();

    let failure = if host.ends_with(".invalid") {
        Some((-105, "ERR_NAME_NOT_RESOLVED"))
    } else if host.starts_with("self-signed.")
        && signals.certificate_error(&url, "ERR_CERT_AUTHORITY_INVALID")
            == CertificateVerdict::Reject
    {
        Some((-202, "ERR_CERT_AUTHORITY_INVALID"))
    } else {
        None
    };

    let title = {
        let mut state = lock(page);
        if state.closed || state.generation != generation {
            return;
        }
        state.loading = false;
        if failure.is_none() {
            state.title = if host.is_empty() { url.clone() } else { host };
        }
        state.title.clone()
    };

    match failure {
        Some((code, description)) => signals.emit(NativeSignal::LoadFailed {
            code,
            description: description.into(),
            url,
        }),
        None => {
            signals.emit(NativeSignal::TitleUpdated {
                title: title.clone(),
            });
            signals.emit(NativeSignal::LoadFinished {
                url,
                title: Some(title),
            });
        }
    }
}

/// Same document, different fragment.
fn is_in_page(current: &str, next: &Url) -> bool {
    let Ok(mut current) = Url::parse(current) else {
        return false;
    };
    let mut next = next.clone();
    if next.fragment().is_none() {
        return false;
    }
    current.set_fragment(None);
    next.set_fragment(None);
    current == next
}

#[async_trait(?Send)]
impl Surface for HeadlessSurface {
    async fn load_url(&mut self, url: &str) -> Result<(), SurfaceError> {
        let parsed =
            Url::parse(url).map_err(|e| SurfaceError::Navigation(format!("{url}: {e}")))?;
        let in_page = {
            let mut page = lock(&self.page);
            if page.closed {
                return Err(SurfaceError::Gone);
            }
            let in_page = is_in_page(&page.current_url(), &parsed);
            if !page.history.is_empty() {
                let keep = page.cursor + 1;
                page.history.truncate(keep);
            }
            page.history.push(url.to_string());
            page.cursor = page.history.len() - 1;
            in_page
        };
        self.navigate(url.to_string(), in_page);
        Ok(())
    }

    fn can_go_back(&self) -> bool {
        lock(&self.page).cursor > 0
    }

    fn can_go_forward(&self) -> bool {
        let page = lock(&self.page);
        page.cursor + 1 < page.history.len()
    }

    async fn go_back(&mut self) -> Result<(), SurfaceError> {
        let url = {
            let mut page = lock(&self.page);
            if page.cursor == 0 {
                return Err(SurfaceError::Navigation("no previous entry".into()));
            }
            page.cursor -= 1;
            page.current_url()
        };
        self.navigate(url, false);
        Ok(())
    }

    async fn go_forward(&mut self) -> Result<(), SurfaceError> {
        let url = {
            let mut page = lock(&self.page);
            if page.cursor + 1 >= page.history.len() {
                return Err(SurfaceError::Navigation("no next entry".into()));
            }
            page.cursor += 1;
            page.current_url()
        };
        self.navigate(url, false);
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), SurfaceError> {
        let url = lock(&self.page).current_url();
        if url.is_empty() {
            return Err(SurfaceError::Navigation("nothing to reload".into()));
        }
        self.navigate(url, false);
        Ok(())
    }

    async fn execute_script(&mut self, script: &str) -> Result<Value, SurfaceError> {
        let page = lock(&self.page);
        if page.closed {
            return Err(SurfaceError::Gone);
        }
        let script = script.trim().trim_end_matches(';');
        match script {
            "document.title" => Ok(Value::String(page.title.clone())),
            "location.href" | "window.location.href" | "document.URL" => {
                Ok(Value::String(page.current_url()))
            }
            "navigator.userAgent" => Ok(page
                .user_agent
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null)),
            _ => {
                if let Some(thrown) = script.strip_prefix("throw ") {
                    return Err(SurfaceError::Script(format!("Uncaught {thrown}")));
                }
                Ok(serde_json::from_str(script).unwrap_or(Value::Null))
            }
        }
    }

    fn url(&self) -> String {
        lock(&self.page).current_url()
    }

    fn title(&self) -> String {
        lock(&self.page).title.clone()
    }

    fn is_loading(&self) -> bool {
        lock(&self.page).loading
    }

    fn supports_bounds(&self) -> bool {
        lock(&self.page).bounds_supported
    }

    fn set_bounds(&mut self, rect: Rect) -> Result<(), SurfaceError> {
        let mut page = lock(&self.page);
        if page.closed {
            return Err(SurfaceError::Gone);
        }
        if !page.bounds_supported {
            return Err(SurfaceError::Unsupported("set_bounds"));
        }
        page.bounds.push(rect);
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) -> Result<(), SurfaceError> {
        let mut page = lock(&self.page);
        if page.closed {
            return Err(SurfaceError::Gone);
        }
        page.visible = visible;
        Ok(())
    }

    fn close(&mut self) {
        let mut page = lock(&self.page);
        page.closed = true;
        page.visible = false;
        page.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CertificateGate, NavigationBridge};
    use tabhost_common::{EventBus, HostEvent};
    use tabhost_config::{CertificatePolicy, SecurityConfig};

    async fn surface_with(security: SecurityConfig) -> Fixture {
        let bus = EventBus::new(64);
        let rx = bus.subscribe();
        let bridge = NavigationBridge::new(bus, CertificateGate::new(&security));
        let engine = HeadlessEngine::new(HeadlessOptions {
            load_latency: Duration::from_millis(10),
            bounds_supported: true,
        });
        let spec = SurfaceSpec {
            tab_id: TabId(1),
            user_agent: Some("test-agent".into()),
            devtools: false,
        };
        let surface = engine
            .factory()
            .create(spec, bridge.register(TabId(1)))
            .await
            .unwrap();
        // The bridge only needs to outlive registration; the sink holds the state.
        drop(bridge);
        (engine, surface, rx)
    }

    type Fixture = (
        HeadlessEngine,
        Box<dyn Surface>,
        tokio::sync::broadcast::Receiver<HostEvent>,
    );

    async fn surface() -> Fixture {
        surface_with(SecurityConfig::default()).await
    }

    #[tokio::test(start_paused = true)]
    async fn load_completes_after_latency() {
        let (_engine, mut surface, mut rx) = surface().await;
        surface.load_url("https://example.com").await.unwrap();
        assert!(surface.is_loading());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!surface.is_loading());
        assert_eq!(surface.title(), "example.com");

        let mut kinds = Vec::new();
        while let Ok(e) = rx.try_recv() {
            kinds.push(e);
        }
        assert!(matches!(kinds.first(), Some(HostEvent::LoadingStarted { .. })));
        assert!(matches!(kinds.last(), Some(HostEvent::LoadingFinished { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn history_tracks_back_and_forward() {
        let (_engine, mut surface, _rx) = surface().await;
        assert!(!surface.can_go_back());
        surface.load_url("https://a.test/").await.unwrap();
        surface.load_url("https://b.test/").await.unwrap();
        assert!(surface.can_go_back());
        assert!(!surface.can_go_forward());

        surface.go_back().await.unwrap();
        assert_eq!(surface.url(), "https://a.test/");
        assert!(surface.can_go_forward());

        surface.load_url("https://c.test/").await.unwrap();
        assert!(!surface.can_go_forward(), "new load drops forward entries");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_host_fails_the_load() {
        let (_engine, mut surface, mut rx) = surface().await;
        surface.load_url("https://nowhere.invalid/").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut failed = None;
        while let Ok(e) = rx.try_recv() {
            if let HostEvent::LoadingFailed { error_code, .. } = e {
                failed = Some(error_code);
            }
        }
        assert_eq!(failed, Some(-105));
    }

    #[tokio::test(start_paused = true)]
    async fn strict_policy_rejects_self_signed() {
        let (_engine, mut surface, mut rx) = surface_with(SecurityConfig {
            certificate_policy: CertificatePolicy::Strict,
            allowed_hosts: Vec::new(),
        })
        .await;
        surface.load_url("https://self-signed.test/").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut failed = None;
        while let Ok(e) = rx.try_recv() {
            if let HostEvent::LoadingFailed { error_code, .. } = e {
                failed = Some(error_code);
            }
        }
        assert_eq!(failed, Some(-202));
    }

    #[tokio::test(start_paused = true)]
    async fn fragment_change_is_in_page() {
        let (_engine, mut surface, mut rx) = surface().await;
        surface.load_url("https://example.com/doc").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        while rx.try_recv().is_ok() {}

        surface.load_url("https://example.com/doc#section").await.unwrap();
        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            HostEvent::Navigation {
                kind: tabhost_common::NavigationKind::InPage,
                ..
            }
        ));
        assert!(!surface.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_surface_abandons_pending_load() {
        let (engine, mut surface, mut rx) = surface().await;
        surface.load_url("https://example.com").await.unwrap();
        surface.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        while let Ok(e) = rx.try_recv() {
            assert!(!matches!(e, HostEvent::LoadingFinished { .. }));
        }
        assert!(engine.page(TabId(1)).unwrap().is_closed());
    }

    #[tokio::test]
    async fn scripts_settle_or_throw() {
        let (_engine, mut surface, _rx) = surface().await;
        assert_eq!(
            surface.execute_script("1 + 1").await.unwrap(),
            Value::Null,
            "unknown expressions settle to null"
        );
        assert_eq!(
            surface.execute_script("{\"a\": 1}").await.unwrap(),
            serde_json::json!({"a": 1})
        );
        assert_eq!(
            surface.execute_script("navigator.userAgent").await.unwrap(),
            Value::String("test-agent".into())
        );
        let err = surface
            .execute_script("throw new Error('boom')")
            .await
            .unwrap_err();
        assert!(matches!(err, SurfaceError::Script(ref m) if m.contains("boom")));
    }

    #[tokio::test]
    async fn allocation_failure_is_one_shot() {
        let engine = HeadlessEngine::default();
        let bridge = NavigationBridge::new(
            EventBus::new(8),
            CertificateGate::new(&SecurityConfig::default()),
        );
        engine.fail_next_allocation();
        let spec = SurfaceSpec {
            tab_id: TabId(1),
            user_agent: None,
            devtools: false,
        };
        let mut factory = engine.factory();
        assert!(factory
            .create(spec.clone(), bridge.register(TabId(1)))
            .await
            .is_err());
        assert!(factory.create(spec, bridge.register(TabId(1))).await.is_ok());
    }

    #[tokio::test]
    async fn unsupported_bounds_are_refused() {
        let (engine, mut surface, _rx) = surface().await;
        engine.page(TabId(1)).unwrap().set_bounds_supported(false);
        assert!(!surface.supports_bounds());
        assert_eq!(
            surface.set_bounds(Rect::new(0.0, 0.0, 10.0, 10.0)),
            Err(SurfaceError::Unsupported("set_bounds"))
        );
    }
}
