//! Seams to the native layer: rendering surfaces, the window's visible
//! content tree, and window geometry.
//!
//! All async traits are `?Send`. Surfaces live on the single privileged
//! event loop and native webviews are not thread-safe.

use async_trait::async_trait;
use tabhost_common::{Rect, TabId};

use crate::bridge::SignalSink;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("{0}")]
    Script(String),

    #[error("navigation rejected: {0}")]
    Navigation(String),

    #[error("not supported by this surface: {0}")]
    Unsupported(&'static str),

    #[error("native view is gone")]
    Gone,
}

/// Everything a factory needs to allocate one surface.
#[derive(Debug, Clone)]
pub struct SurfaceSpec {
    pub tab_id: TabId,
    pub user_agent: Option<String>,
    pub devtools: bool,
}

/// One privileged rendering-engine instance.
#[async_trait(?Send)]
pub trait Surface {
    /// Begin navigating. Completion is reported through the surface's
    /// [`SignalSink`], not by this future.
    async fn load_url(&mut self, url: &str) -> Result<(), SurfaceError>;

    fn can_go_back(&self) -> bool;

    fn can_go_forward(&self) -> bool;

    async fn go_back(&mut self) -> Result<(), SurfaceError>;

    async fn go_forward(&mut self) -> Result<(), SurfaceError>;

    async fn reload(&mut self) -> Result<(), SurfaceError>;

    /// Run a script and wait for its settled value.
    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, SurfaceError>;

    fn url(&self) -> String;

    fn title(&self) -> String;

    fn is_loading(&self) -> bool;

    /// Whether [`Surface::set_bounds`] can be called right now.
    fn supports_bounds(&self) -> bool {
        true
    }

    fn set_bounds(&mut self, rect: Rect) -> Result<(), SurfaceError>;

    fn set_visible(&mut self, visible: bool) -> Result<(), SurfaceError>;

    /// Release native resources. In-flight loads are abandoned.
    fn close(&mut self);
}

#[async_trait(?Send)]
pub trait SurfaceFactory {
    /// Allocate a surface whose lifecycle signals go to `signals`.
    ///
    /// The sink is wired before the surface exists, so nothing the engine
    /// raises during the initial load is lost.
    async fn create(
        &mut self,
        spec: SurfaceSpec,
        signals: SignalSink,
    ) -> Result<Box<dyn Surface>, SurfaceError>;
}

/// The window's visible content tree.
#[async_trait(?Send)]
pub trait ContentTree {
    async fn attach(&mut self, tab_id: TabId, surface: &mut dyn Surface)
        -> Result<(), SurfaceError>;

    async fn detach(&mut self, tab_id: TabId, surface: &mut dyn Surface)
        -> Result<(), SurfaceError>;

    fn contains(&self, tab_id: TabId) -> bool;
}

/// Current outer size of the host window, in pixels.
pub trait WindowGeometry {
    fn outer_size(&self) -> (u32, u32);
}

impl<F> WindowGeometry for F
where
    F: Fn() -> (u32, u32),
{
    fn outer_size(&self) -> (u32, u32) {
        self()
    }
}

/// Geometry for windows that never resize (headless mode, tests).
#[derive(Debug, Clone, Copy)]
pub struct FixedGeometry {
    pub width: u32,
    pub height: u32,
}

impl WindowGeometry for FixedGeometry {
    fn outer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
