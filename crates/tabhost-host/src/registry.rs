//! Owner of every live surface in one window.
//!
//! The registry maps tab ids to surfaces, remembers creation order and
//! tracks which tab is in the foreground. Exactly one surface may be
//! attached to the window's content tree at a time; switching always
//! detaches the previous surface before attaching the next.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tabhost_common::{
    EventBus, HostError, HostEvent, NavigationOutcome, NavigationState, Rect, Result, TabId,
    TabIdAllocator, TabOptions, TabSummary,
};
use tabhost_config::SurfaceConfig;
use tracing::{debug, info, warn};

use crate::bridge::NavigationBridge;
use crate::surface::{ContentTree, Surface, SurfaceError, SurfaceFactory, SurfaceSpec};

/// What happened when a rectangle was handed to the foreground surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsApplication {
    Applied,
    /// The surface cannot be positioned yet; try again later.
    Deferred,
    NoForeground,
    /// The surface refused the rectangle for good.
    Failed,
}

struct TabEntry {
    surface: Box<dyn Surface>,
    created_at: DateTime<Utc>,
}

pub struct SurfaceRegistry {
    factory: Box<dyn SurfaceFactory>,
    tree: Box<dyn ContentTree>,
    bridge: NavigationBridge,
    bus: EventBus,
    ids: TabIdAllocator,
    tabs: HashMap<TabId, TabEntry>,
    order: Vec<TabId>,
    foreground: Option<TabId>,
    applied_bounds: Option<Rect>,
    defaults: SurfaceConfig,
}

impl SurfaceRegistry {
    pub fn new(
        factory: Box<dyn SurfaceFactory>,
        tree: Box<dyn ContentTree>,
        bridge: NavigationBridge,
        bus: EventBus,
        defaults: SurfaceConfig,
    ) -> Self {
        Self {
            factory,
            tree,
            bridge,
            bus,
            ids: TabIdAllocator::new(),
            tabs: HashMap::new(),
            order: Vec::new(),
            foreground: None,
            applied_bounds: None,
            defaults,
        }
    }

    pub fn foreground(&self) -> Option<TabId> {
        self.foreground
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.tabs.contains_key(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Last rectangle a surface actually accepted.
    pub fn applied_bounds(&self) -> Option<Rect> {
        self.applied_bounds
    }

    /// Allocate a surface, register it and start the initial load.
    ///
    /// The surface's signal sink is registered with the bridge before the
    /// surface exists, so the first `loading-started` is never missed. A
    /// load the engine rejects outright leaves the tab open on its blank
    /// page.
    pub async fn create_tab(&mut self, url: &str, options: TabOptions) -> Result<TabSummary> {
        let tab_id = self.ids.allocate();
        let url = if url.trim().is_empty() {
            self.defaults.default_url.clone()
        } else {
            url.to_string()
        };

        let spec = SurfaceSpec {
            tab_id,
            user_agent: options
                .user_agent
                .clone()
                .or_else(|| self.defaults.user_agent.clone()),
            devtools: self.defaults.devtools,
        };
        let signals = self.bridge.register(tab_id);
        let surface = match self.factory.create(spec, signals).await {
            Ok(surface) => surface,
            Err(e) => {
                self.bridge.forget(tab_id);
                warn!(%tab_id, error = %e, "surface allocation failed");
                return Err(HostError::Creation(e.to_string()));
            }
        };

        let created_at = Utc::now();
        self.tabs.insert(
            tab_id,
            TabEntry {
                surface,
                created_at,
            },
        );
        self.order.push(tab_id);
        info!(%tab_id, %url, "tab created");
        self.bus.publish(HostEvent::TabCreated {
            tab_id,
            url: url.clone(),
            created_at,
        });

        if let Some(entry) = self.tabs.get_mut(&tab_id) {
            if let Err(e) = entry.surface.load_url(&url).await {
                warn!(%tab_id, %url, error = %e, "initial load rejected");
            }
        }

        if options.activate {
            self.switch_tab(tab_id).await?;
        }

        Ok(TabSummary {
            id: tab_id,
            url,
            title: String::new(),
            created_at,
            active: self.foreground == Some(tab_id),
        })
    }

    /// Bring a tab to the foreground. Switching to the current foreground
    /// tab does nothing.
    pub async fn switch_tab(&mut self, tab_id: TabId) -> Result<()> {
        if !self.tabs.contains_key(&tab_id) {
            return Err(HostError::NotFound(tab_id));
        }
        if self.foreground == Some(tab_id) {
            debug!(%tab_id, "already in foreground");
            return Ok(());
        }

        let previous = self.foreground.take();
        if let Some(prev) = previous {
            if let Some(entry) = self.tabs.get_mut(&prev) {
                // A view that is already gone must not block the switch.
                if let Err(e) = self.tree.detach(prev, entry.surface.as_mut()).await {
                    warn!(tab_id = %prev, error = %e, "detach failed during switch");
                }
            }
        }

        let entry = self
            .tabs
            .get_mut(&tab_id)
            .ok_or(HostError::NotFound(tab_id))?;
        if let Err(e) = self.tree.attach(tab_id, entry.surface.as_mut()).await {
            warn!(%tab_id, error = %e, "attach failed during switch");
        }
        self.foreground = Some(tab_id);

        debug!(%tab_id, previous = ?previous, "tab switched");
        self.bus.publish(HostEvent::TabSwitched { tab_id, previous });
        Ok(())
    }

    /// Dispose of a tab. Safe while it is still loading; the pending load
    /// is abandoned and its signals are dropped.
    pub async fn close_tab(&mut self, tab_id: TabId) -> Result<()> {
        let mut entry = self
            .tabs
            .remove(&tab_id)
            .ok_or(HostError::NotFound(tab_id))?;

        if self.foreground == Some(tab_id) {
            self.foreground = None;
        }
        if self.tree.contains(tab_id) {
            if let Err(e) = self.tree.detach(tab_id, entry.surface.as_mut()).await {
                warn!(%tab_id, error = %e, "detach failed during close");
            }
        }

        self.bridge.forget(tab_id);
        entry.surface.close();
        self.order.retain(|id| *id != tab_id);

        info!(%tab_id, "tab closed");
        self.bus.publish(HostEvent::TabClosed { tab_id });
        Ok(())
    }

    /// Close every tab, newest first. Used during shutdown.
    pub async fn close_all(&mut self) {
        let ids: Vec<TabId> = self.order.iter().rev().copied().collect();
        for tab_id in ids {
            if let Err(e) = self.close_tab(tab_id).await {
                warn!(%tab_id, error = %e, "close during shutdown failed");
            }
        }
    }

    pub async fn load_url(&mut self, url: &str, tab_id: Option<TabId>) -> Result<TabId> {
        let (tab_id, surface) = self.surface_mut(tab_id)?;
        surface.load_url(url).await.map_err(navigation_error)?;
        debug!(%tab_id, %url, "navigation started");
        Ok(tab_id)
    }

    pub async fn go_back(&mut self, tab_id: Option<TabId>) -> Result<NavigationOutcome> {
        let (_, surface) = self.surface_mut(tab_id)?;
        if !surface.can_go_back() {
            return Ok(NavigationOutcome::refused("Cannot go back"));
        }
        surface.go_back().await.map_err(navigation_error)?;
        Ok(NavigationOutcome::done())
    }

    pub async fn go_forward(&mut self, tab_id: Option<TabId>) -> Result<NavigationOutcome> {
        let (_, surface) = self.surface_mut(tab_id)?;
        if !surface.can_go_forward() {
            return Ok(NavigationOutcome::refused("Cannot go forward"));
        }
        surface.go_forward().await.map_err(navigation_error)?;
        Ok(NavigationOutcome::done())
    }

    pub async fn reload(&mut self, tab_id: Option<TabId>) -> Result<TabId> {
        let (tab_id, surface) = self.surface_mut(tab_id)?;
        surface.reload().await.map_err(navigation_error)?;
        Ok(tab_id)
    }

    pub async fn execute_script(&mut self, script: &str, tab_id: Option<TabId>) -> Result<Value> {
        let (tab_id, surface) = self.surface_mut(tab_id)?;
        surface.execute_script(script).await.map_err(|e| {
            debug!(%tab_id, error = %e, "script failed");
            match e {
                SurfaceError::Script(message) => HostError::Execution(message),
                other => HostError::Execution(other.to_string()),
            }
        })
    }

    /// Read the navigation state without waiting on the surface.
    ///
    /// With no id and nothing in the foreground this is the "no tab"
    /// sentinel rather than an error.
    pub fn navigation_state(&self, tab_id: Option<TabId>) -> Result<NavigationState> {
        let tab_id = match tab_id.or(self.foreground) {
            Some(id) => id,
            None => return Ok(NavigationState::no_tab()),
        };
        let entry = self.tabs.get(&tab_id).ok_or(HostError::NotFound(tab_id))?;
        let surface = &entry.surface;
        Ok(NavigationState {
            tab_id: Some(tab_id),
            can_go_back: surface.can_go_back(),
            can_go_forward: surface.can_go_forward(),
            is_loading: surface.is_loading(),
            url: surface.url(),
            title: surface.title(),
        })
    }

    /// Every open tab in creation order.
    pub fn list_tabs(&self) -> Vec<TabSummary> {
        self.order
            .iter()
            .filter_map(|id| {
                self.tabs.get(id).map(|entry| TabSummary {
                    id: *id,
                    url: entry.surface.url(),
                    title: entry.surface.title(),
                    created_at: entry.created_at,
                    active: self.foreground == Some(*id),
                })
            })
            .collect()
    }

    /// Hand a rectangle to the foreground surface.
    pub fn apply_bounds(&mut self, rect: Rect) -> BoundsApplication {
        let Some(tab_id) = self.foreground else {
            return BoundsApplication::NoForeground;
        };
        let Some(entry) = self.tabs.get_mut(&tab_id) else {
            return BoundsApplication::NoForeground;
        };
        if !entry.surface.supports_bounds() {
            return BoundsApplication::Deferred;
        }
        match entry.surface.set_bounds(rect) {
            Ok(()) => {
                self.applied_bounds = Some(rect);
                debug!(%tab_id, ?rect, "bounds applied");
                BoundsApplication::Applied
            }
            Err(SurfaceError::Unsupported(_)) => BoundsApplication::Deferred,
            Err(e) => {
                warn!(%tab_id, ?rect, error = %e, "bounds rejected");
                BoundsApplication::Failed
            }
        }
    }

    fn surface_mut(&mut self, tab_id: Option<TabId>) -> Result<(TabId, &mut dyn Surface)> {
        let tab_id = match tab_id {
            Some(id) => id,
            None => self.foreground.ok_or(HostError::NoActiveTab)?,
        };
        let entry = self
            .tabs
            .get_mut(&tab_id)
            .ok_or(HostError::NotFound(tab_id))?;
        Ok((tab_id, entry.surface.as_mut()))
    }
}

fn navigation_error(e: SurfaceError) -> HostError {
    HostError::Navigation(e.to_string())
}
