//! The privileged event loop.
//!
//! [`HostService`] owns a [`WindowSession`] and processes boundary calls
//! one at a time. The only other thing it waits on is the bounds
//! deadline, so a pending resize is applied between calls without a
//! separate timer task.
//!
//! Surfaces are not `Send`; run the service with `spawn_local` inside a
//! `LocalSet`. The [`HostHandle`] it hands out is `Send` and can be used
//! from anywhere.

use async_trait::async_trait;
use tabhost_common::{Boundary, EventBus, HostError, HostEvent, HostRequest, HostResponse};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::session::WindowSession;

/// A boundary call waiting for the host loop.
#[derive(Debug)]
pub struct HostCall {
    pub request: HostRequest,
    pub reply: oneshot::Sender<Result<HostResponse, HostError>>,
}

/// In-process end of the boundary. Cheap to clone.
#[derive(Clone)]
pub struct HostHandle {
    calls: mpsc::Sender<HostCall>,
    bus: EventBus,
}

impl HostHandle {
    /// How many calls may wait for the host loop at once.
    pub fn queue_capacity(&self) -> usize {
        self.calls.max_capacity()
    }
}

#[async_trait]
impl Boundary for HostHandle {
    async fn call(&self, request: HostRequest) -> Result<HostResponse, HostError> {
        let (reply, response) = oneshot::channel();
        self.calls
            .send(HostCall { request, reply })
            .await
            .map_err(|_| HostError::Boundary("host service is not running".into()))?;
        response
            .await
            .map_err(|_| HostError::Boundary("host service dropped the call".into()))?
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.bus.subscribe()
    }
}

pub struct HostService {
    session: WindowSession,
    calls: mpsc::Receiver<HostCall>,
}

impl HostService {
    pub fn new(session: WindowSession, capacity: usize) -> (Self, HostHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = HostHandle {
            calls: tx,
            bus: session.events().clone(),
        };
        (
            Self {
                session,
                calls: rx,
            },
            handle,
        )
    }

    /// Run until every [`HostHandle`] is dropped, then close all tabs.
    pub async fn run(mut self) {
        info!("host service started");
        loop {
            let deadline = self.session.bounds_deadline();
            tokio::select! {
                call = self.calls.recv() => {
                    let Some(HostCall { request, reply }) = call else {
                        break;
                    };
                    let method = request.method();
                    let result = self.session.handle(request).await;
                    if reply.send(result).is_err() {
                        debug!(method, "caller went away before the reply");
                    }
                }
                _ = wait_until(deadline) => {
                    self.session.flush_bounds(Instant::now());
                }
            }
        }
        self.session.shutdown().await;
        info!("host service stopped");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
