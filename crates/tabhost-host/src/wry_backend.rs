//! Native surfaces backed by `wry` child webviews.
//!
//! Every surface is built as a child of one host window and starts
//! hidden; pair the factory with [`crate::tree::VisibilityTree`].
//! wry reports page starts, page finishes and title changes. It has no
//! load-failure or certificate callbacks, so those signals never come
//! from this backend.

use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tabhost_common::Rect;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;
use wry::raw_window_handle::HasWindowHandle;
use wry::{PageLoadEvent, WebView, WebViewBuilder};

use crate::bridge::{NativeSignal, SignalSink};
use crate::surface::{Surface, SurfaceError, SurfaceFactory, SurfaceSpec};

/// Convert a host `Rect` (logical pixels) to a wry `Rect`.
pub fn to_wry_rect(rect: Rect) -> wry::Rect {
    wry::Rect {
        position: wry::dpi::Position::Logical(wry::dpi::LogicalPosition::new(rect.x, rect.y)),
        size: wry::dpi::Size::Logical(wry::dpi::LogicalSize::new(rect.width, rect.height)),
    }
}

/// Builds child webviews inside one window.
pub struct WryFactory<W> {
    window: Rc<W>,
}

impl<W: HasWindowHandle + 'static> WryFactory<W> {
    pub fn new(window: Rc<W>) -> Self {
        Self { window }
    }
}

#[async_trait(?Send)]
impl<W: HasWindowHandle + 'static> SurfaceFactory for WryFactory<W> {
    async fn create(
        &mut self,
        spec: SurfaceSpec,
        signals: SignalSink,
    ) -> Result<Box<dyn Surface>, SurfaceError> {
        let tracked = Arc::new(Mutex::new(Tracked::default()));

        let mut builder = WebViewBuilder::new()
            .with_visible(false)
            .with_devtools(spec.devtools)
            .with_focused(false)
            .with_url(BLANK);
        if let Some(ua) = &spec.user_agent {
            builder = builder.with_user_agent(ua);
        }
        builder = attach_page_load_handler(builder, Arc::clone(&tracked), signals.clone());
        builder = attach_title_handler(builder, Arc::clone(&tracked), signals);

        let webview = builder
            .build_as_child(self.window.as_ref())
            .map_err(|e| SurfaceError::Allocation(e.to_string()))?;
        debug!(tab_id = %spec.tab_id, "child webview created");

        Ok(Box::new(WrySurface {
            webview: Some(webview),
            tracked,
        }))
    }
}

fn attach_page_load_handler<'a>(
    builder: WebViewBuilder<'a>,
    tracked: Arc<Mutex<Tracked>>,
    signals: SignalSink,
) -> WebViewBuilder<'a> {
    builder.with_on_page_load_handler(move |event, url| match event {
        PageLoadEvent::Started => {
            {
                let mut t = lock(&tracked);
                t.loading = true;
                t.started(&url);
            }
            signals.emit(NativeSignal::LoadStarted);
            signals.emit(NativeSignal::NavigationCommitted {
                url,
                in_page: false,
            });
        }
        PageLoadEvent::Finished => {
            lock(&tracked).loading = false;
            signals.emit(NativeSignal::LoadFinished { url, title: None });
        }
    })
}

fn attach_title_handler<'a>(
    builder: WebViewBuilder<'a>,
    tracked: Arc<Mutex<Tracked>>,
    signals: SignalSink,
) -> WebViewBuilder<'a> {
    builder.with_document_title_changed_handler(move |title| {
        lock(&tracked).title = title.clone();
        signals.emit(NativeSignal::TitleUpdated { title });
    })
}

/// Best-effort mirror of the page's session history. wry exposes no
/// history API, so entries are recorded from page starts only.
#[derive(Debug, Default)]
struct Tracked {
    history: Vec<String>,
    cursor: usize,
    title: String,
    loading: bool,
}

impl Tracked {
    fn current(&self) -> &str {
        self.history.get(self.cursor).map(String::as_str).unwrap_or("")
    }

    /// A page started loading. Back and forward moves have already set
    /// the cursor, so a start at the current entry is not a new one.
    fn started(&mut self, url: &str) {
        if url == BLANK || same_page(self.current(), url) {
            return;
        }
        self.push(url.to_string());
    }

    fn push(&mut self, url: String) {
        if !self.history.is_empty() {
            self.history.truncate(self.cursor + 1);
        }
        self.history.push(url);
        self.cursor = self.history.len() - 1;
    }
}

const BLANK: &str = "about:blank";

/// Compare as parsed URLs so `https://a.test` and `https://a.test/` match.
fn same_page(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn lock(tracked: &Mutex<Tracked>) -> MutexGuard<'_, Tracked> {
    tracked
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct WrySurface {
    webview: Option<WebView>,
    tracked: Arc<Mutex<Tracked>>,
}

impl WrySurface {
    fn webview(&self) -> Result<&WebView, SurfaceError> {
        self.webview.as_ref().ok_or(SurfaceError::Gone)
    }

    fn run(&self, js: &str) -> Result<(), SurfaceError> {
        self.webview()?
            .evaluate_script(js)
            .map_err(|e| SurfaceError::Navigation(e.to_string()))
    }
}

/// Wrap a script so its settled value, or the exception it threw, comes
/// back as JSON.
fn settle_script(script: &str) -> String {
    let source = serde_json::to_string(script).unwrap_or_else(|_| "\"\"".into());
    format!(
        "(function() {{ try {{ var v = (0, eval)({source}); \
         return {{ ok: v === undefined ? null : v }}; }} \
         catch (e) {{ return {{ err: String(e) }}; }} }})()"
    )
}

fn parse_settled(raw: &str) -> Result<Value, SurfaceError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| SurfaceError::Script(e.to_string()))?;
    if let Some(err) = value.get("err") {
        return Err(SurfaceError::Script(
            err.as_str().unwrap_or("script threw").to_string(),
        ));
    }
    Ok(value.get("ok").cloned().unwrap_or(Value::Null))
}

#[async_trait(?Send)]
impl Surface for WrySurface {
    async fn load_url(&mut self, url: &str) -> Result<(), SurfaceError> {
        self.webview()?
            .load_url(url)
            .map_err(|e| SurfaceError::Navigation(e.to_string()))
    }

    fn can_go_back(&self) -> bool {
        lock(&self.tracked).cursor > 0
    }

    fn can_go_forward(&self) -> bool {
        let t = lock(&self.tracked);
        t.cursor + 1 < t.history.len()
    }

    async fn go_back(&mut self) -> Result<(), SurfaceError> {
        self.run("history.back()")?;
        let mut t = lock(&self.tracked);
        t.cursor = t.cursor.saturating_sub(1);
        Ok(())
    }

    async fn go_forward(&mut self) -> Result<(), SurfaceError> {
        self.run("history.forward()")?;
        let mut t = lock(&self.tracked);
        if t.cursor + 1 < t.history.len() {
            t.cursor += 1;
        }
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), SurfaceError> {
        self.run("location.reload()")
    }

    async fn execute_script(&mut self, script: &str) -> Result<Value, SurfaceError> {
        let (tx, rx) = oneshot::channel::<String>();
        let tx = Mutex::new(Some(tx));
        self.webview()?
            .evaluate_script_with_callback(&settle_script(script), move |raw| {
                if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                    let _ = tx.send(raw);
                }
            })
            .map_err(|e| SurfaceError::Script(e.to_string()))?;
        let raw = rx.await.map_err(|_| SurfaceError::Gone)?;
        parse_settled(&raw)
    }

    fn url(&self) -> String {
        match self.webview.as_ref().and_then(|w| w.url().ok()) {
            Some(url) => url,
            None => lock(&self.tracked).current().to_string(),
        }
    }

    fn title(&self) -> String {
        lock(&self.tracked).title.clone()
    }

    fn is_loading(&self) -> bool {
        lock(&self.tracked).loading
    }

    fn supports_bounds(&self) -> bool {
        self.webview.is_some()
    }

    fn set_bounds(&mut self, rect: Rect) -> Result<(), SurfaceError> {
        self.webview()?
            .set_bounds(to_wry_rect(rect))
            .map_err(|e| SurfaceError::Navigation(e.to_string()))
    }

    fn set_visible(&mut self, visible: bool) -> Result<(), SurfaceError> {
        self.webview()?
            .set_visible(visible)
            .map_err(|e| SurfaceError::Navigation(e.to_string()))
    }

    fn close(&mut self) {
        if let Some(webview) = self.webview.take() {
            if let Err(e) = webview.set_visible(false) {
                warn!(error = %e, "failed to hide webview before drop");
            }
        }
        lock(&self.tracked).loading = false;
    }
}
