//! One host window: its surfaces, its foreground and its bounds.
//!
//! Each window gets its own session, so foreground state is never shared
//! between windows. The session is driven by a single task (see
//! [`crate::service::HostService`]) and needs no locking.

use tabhost_common::{EventBus, HostRequest, HostResponse, Result};
use tabhost_config::{CertificatePolicy, TabHostConfig};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::bounds::BoundsPlanner;
use crate::bridge::{CertificateGate, NavigationBridge};
use crate::registry::{BoundsApplication, SurfaceRegistry};
use crate::surface::{ContentTree, SurfaceFactory, WindowGeometry};

pub struct WindowSession {
    registry: SurfaceRegistry,
    planner: BoundsPlanner,
    bus: EventBus,
}

impl WindowSession {
    pub fn new(
        config: &TabHostConfig,
        factory: Box<dyn SurfaceFactory>,
        tree: Box<dyn ContentTree>,
        geometry: Box<dyn WindowGeometry>,
    ) -> Self {
        let bus = EventBus::new(config.events.channel_capacity as usize);
        if config.security.certificate_policy == CertificatePolicy::AcceptAll {
            warn!("certificate problems will be accepted for every host");
        }
        let bridge = NavigationBridge::new(bus.clone(), CertificateGate::new(&config.security));
        let registry = SurfaceRegistry::new(factory, tree, bridge, bus.clone(), config.surface.clone());
        let planner = BoundsPlanner::new(&config.bounds, geometry);
        Self {
            registry,
            planner,
            bus,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    /// When the pending bounds request falls due, if there is one.
    pub fn bounds_deadline(&self) -> Option<Instant> {
        self.planner.deadline()
    }

    /// Execute one boundary call.
    pub async fn handle(&mut self, request: HostRequest) -> Result<HostResponse> {
        let method = request.method();
        let result = self.dispatch(request).await;
        match &result {
            Ok(_) => trace!(method, "call completed"),
            Err(e) => debug!(method, error = %e, "call failed"),
        }
        result
    }

    async fn dispatch(&mut self, request: HostRequest) -> Result<HostResponse> {
        match request {
            HostRequest::CreateTab { url, options } => {
                let activate = options.activate;
                let tab = self.registry.create_tab(&url, options).await?;
                if activate {
                    self.foreground_changed();
                }
                Ok(HostResponse::TabCreated {
                    tab_id: tab.id,
                    url: tab.url,
                    created_at: tab.created_at,
                })
            }
            HostRequest::SwitchTab { tab_id } => {
                self.registry.switch_tab(tab_id).await?;
                self.foreground_changed();
                Ok(HostResponse::Switched { id: tab_id })
            }
            HostRequest::LoadUrl { url, tab_id } => {
                let tab_id = self.registry.load_url(&url, tab_id).await?;
                Ok(HostResponse::Loaded {
                    success: true,
                    url,
                    tab_id,
                })
            }
            HostRequest::GoBack { tab_id } => {
                Ok(HostResponse::History(self.registry.go_back(tab_id).await?))
            }
            HostRequest::GoForward { tab_id } => {
                Ok(HostResponse::History(self.registry.go_forward(tab_id).await?))
            }
            HostRequest::Reload { tab_id } => {
                let tab_id = self.registry.reload(tab_id).await?;
                Ok(HostResponse::Reloaded {
                    success: true,
                    tab_id,
                })
            }
            HostRequest::ExecuteScript { script, tab_id } => {
                let value = self.registry.execute_script(&script, tab_id).await?;
                Ok(HostResponse::ScriptResult { value })
            }
            HostRequest::GetNavigationState { tab_id } => Ok(HostResponse::NavigationState(
                self.registry.navigation_state(tab_id)?,
            )),
            HostRequest::CloseTab { tab_id } => {
                self.registry.close_tab(tab_id).await?;
                Ok(HostResponse::Closed {
                    success: true,
                    tab_id,
                })
            }
            HostRequest::UpdateBounds { bounds } => {
                self.planner.schedule(bounds, Instant::now());
                Ok(HostResponse::Bounds {
                    success: self.registry.foreground().is_some(),
                })
            }
            HostRequest::ListTabs => Ok(HostResponse::Tabs {
                tabs: self.registry.list_tabs(),
            }),
        }
    }

    /// Apply the pending bounds request if its debounce window has passed.
    pub fn flush_bounds(&mut self, now: Instant) {
        let Some(rect) = self.planner.take_due(now) else {
            return;
        };
        match self.registry.apply_bounds(rect) {
            BoundsApplication::Applied | BoundsApplication::Failed => {}
            BoundsApplication::Deferred => {
                trace!(?rect, "surface cannot be positioned yet, retrying");
                self.planner.retry_later(rect, now);
            }
            BoundsApplication::NoForeground => {
                trace!(?rect, "no foreground tab to size");
            }
        }
    }

    /// A new surface is in front. A pending request will land on it when
    /// due; otherwise it gets the latest rectangle, at once if that one
    /// was already applied to the window, else after a debounce window.
    fn foreground_changed(&mut self) {
        if self.planner.is_pending() {
            return;
        }
        let Some(latest) = self.planner.latest() else {
            return;
        };
        let now = Instant::now();
        if self.registry.applied_bounds() != Some(latest) {
            self.planner.retry_later(latest, now);
            return;
        }
        if self.registry.apply_bounds(latest) == BoundsApplication::Deferred {
            self.planner.retry_later(latest, now);
        }
    }

    /// Close every surface and drop any pending bounds.
    pub async fn shutdown(&mut self) {
        self.planner.cancel();
        self.registry.close_all().await;
    }
}
