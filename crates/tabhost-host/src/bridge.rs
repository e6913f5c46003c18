//! Re-emits native surface lifecycle signals as tagged [`HostEvent`]s.
//!
//! Each tab has a small load-phase machine:
//!
//! ```text
//! Idle -> Loading -> Loaded
//!                 \-> Failed
//! (Loaded | Failed) -> Loading on the next navigation
//! ```
//!
//! Native callbacks may fire from engine threads, so the per-tab state is
//! behind a mutex and the event is published while it is held. That keeps
//! delivery FIFO per tab.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tabhost_common::{EventBus, HostEvent, NavigationKind, TabId};
use tabhost_config::{CertificatePolicy, SecurityConfig};
use tracing::{debug, warn};

/// Lifecycle signal raised by a native surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeSignal {
    NavigationCommitted { url: String, in_page: bool },
    LoadStarted,
    /// `title` is `None` when the engine does not report one with the
    /// load; the last title seen for the tab is used instead.
    LoadFinished { url: String, title: Option<String> },
    LoadFailed { code: i32, description: String, url: String },
    TitleUpdated { title: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateVerdict {
    /// Suppress the interstitial and treat the certificate as trusted.
    Proceed,
    /// Leave the engine's rejection in place.
    Reject,
}

/// Decides certificate overrides from the configured policy.
#[derive(Debug, Clone)]
pub struct CertificateGate {
    policy: CertificatePolicy,
    allowed_hosts: Vec<String>,
}

impl CertificateGate {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            policy: config.certificate_policy,
            allowed_hosts: config
                .allowed_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn verdict(&self, url: &str) -> CertificateVerdict {
        match self.policy {
            CertificatePolicy::AcceptAll => CertificateVerdict::Proceed,
            CertificatePolicy::Strict => CertificateVerdict::Reject,
            CertificatePolicy::AllowList => {
                let host = url::Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
                match host {
                    Some(h) if self.allowed_hosts.contains(&h) => CertificateVerdict::Proceed,
                    _ => CertificateVerdict::Reject,
                }
            }
        }
    }
}

#[derive(Debug)]
struct TabTrack {
    phase: LoadPhase,
    title: String,
}

type SharedTracks = Arc<Mutex<HashMap<TabId, TabTrack>>>;

/// Owner of the per-tab phase machines.
pub struct NavigationBridge {
    tracks: SharedTracks,
    bus: EventBus,
    gate: Arc<CertificateGate>,
}

impl NavigationBridge {
    pub fn new(bus: EventBus, gate: CertificateGate) -> Self {
        Self {
            tracks: Arc::new(Mutex::new(HashMap::new())),
            bus,
            gate: Arc::new(gate),
        }
    }

    /// Start tracking a tab and return the sink its surface reports to.
    pub fn register(&self, tab_id: TabId) -> SignalSink {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.insert(
                tab_id,
                TabTrack {
                    phase: LoadPhase::Idle,
                    title: String::new(),
                },
            );
        }
        SignalSink {
            tab_id,
            tracks: Arc::clone(&self.tracks),
            bus: self.bus.clone(),
            gate: Arc::clone(&self.gate),
        }
    }

    /// Stop tracking a tab. Later signals from its surface are dropped.
    pub fn forget(&self, tab_id: TabId) {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.remove(&tab_id);
        }
    }

    pub fn phase(&self, tab_id: TabId) -> Option<LoadPhase> {
        self.tracks
            .lock()
            .ok()
            .and_then(|tracks| tracks.get(&tab_id).map(|t| t.phase))
    }
}

/// Per-surface handle into the bridge. Cheap to clone; safe to move into
/// native callbacks.
#[derive(Clone)]
pub struct SignalSink {
    tab_id: TabId,
    tracks: SharedTracks,
    bus: EventBus,
    gate: Arc<CertificateGate>,
}

impl SignalSink {
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn emit(&self, signal: NativeSignal) {
        let Ok(mut tracks) = self.tracks.lock() else {
            return;
        };
        let tab_id = self.tab_id;
        let Some(track) = tracks.get_mut(&tab_id) else {
            debug!(%tab_id, ?signal, "signal for untracked tab dropped");
            return;
        };

        let event = match signal {
            NativeSignal::NavigationCommitted { url, in_page } => {
                let kind = if in_page {
                    NavigationKind::InPage
                } else {
                    NavigationKind::Full
                };
                HostEvent::Navigation { tab_id, url, kind }
            }
            NativeSignal::LoadStarted => {
                track.phase = LoadPhase::Loading;
                HostEvent::LoadingStarted { tab_id }
            }
            NativeSignal::LoadFinished { url, title } => {
                if track.phase != LoadPhase::Loading {
                    debug!(%tab_id, phase = ?track.phase, "load-finished outside a load dropped");
                    return;
                }
                track.phase = LoadPhase::Loaded;
                if let Some(title) = title {
                    track.title = title;
                }
                HostEvent::LoadingFinished {
                    tab_id,
                    url,
                    title: track.title.clone(),
                }
            }
            NativeSignal::LoadFailed {
                code,
                description,
                url,
            } => {
                if track.phase != LoadPhase::Loading {
                    debug!(%tab_id, phase = ?track.phase, "load-failed outside a load dropped");
                    return;
                }
                track.phase = LoadPhase::Failed;
                warn!(%tab_id, code, %description, %url, "page load failed");
                HostEvent::LoadingFailed {
                    tab_id,
                    error_code: code,
                    error_description: description,
                    url,
                }
            }
            NativeSignal::TitleUpdated { title } => {
                track.title = title.clone();
                HostEvent::TitleUpdated { tab_id, title }
            }
        };

        self.bus.publish(event);
    }

    /// Ask whether to proceed past a certificate problem on `url`.
    pub fn certificate_error(&self, url: &str, error: &str) -> CertificateVerdict {
        let verdict = self.gate.verdict(url);
        match verdict {
            CertificateVerdict::Proceed => {
                warn!(tab_id = %self.tab_id, %url, %error, "certificate problem overridden")
            }
            CertificateVerdict::Reject => {
                debug!(tab_id = %self.tab_id, %url, %error, "certificate problem left in place")
            }
        }
        verdict
    }
}
