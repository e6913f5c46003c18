//! The UI side's view of the host: one call at a time, plus a stream of
//! events. Transports implement [`Boundary`].

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::HostError;
use crate::events::HostEvent;
use crate::protocol::{HostRequest, HostResponse};

#[async_trait]
pub trait Boundary: Send + Sync {
    /// Deliver one request and wait for its response.
    ///
    /// There is no implicit timeout. Transport failures are reported as
    /// [`HostError::Boundary`].
    async fn call(&self, request: HostRequest) -> Result<HostResponse, HostError>;

    /// Subscribe to host events from this point on.
    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;

    /// Notices that host events were lost before reaching this side, with
    /// how many. `None` when every loss already shows up on
    /// [`Boundary::subscribe`] receivers as `RecvError::Lagged`.
    fn subscribe_gaps(&self) -> Option<broadcast::Receiver<u64>> {
        None
    }
}
