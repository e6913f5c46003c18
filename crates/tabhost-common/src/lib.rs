//! Types shared by the privileged host process and the UI process.
//!
//! Everything that crosses the boundary lives here: tab ids, geometry,
//! the mirrored navigation state, the request/response contract and the
//! one-way event stream.

pub mod boundary;
pub mod errors;
pub mod events;
pub mod id;
pub mod protocol;
pub mod types;

pub use boundary::Boundary;
pub use errors::{ConfigError, HostError};
pub use events::{EventBus, HostEvent, NavigationKind};
pub use id::{TabId, TabIdAllocator};
pub use protocol::{HostRequest, HostResponse, TabOptions, WireMessage, PROTOCOL_VERSION};
pub use types::{NavigationOutcome, NavigationState, Rect, TabSummary};

pub type Result<T> = std::result::Result<T, HostError>;
