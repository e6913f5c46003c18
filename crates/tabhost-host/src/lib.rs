//! The privileged side of tabhost.
//!
//! Owns every rendering surface of a window and answers boundary calls
//! from the UI process:
//!
//! - [`registry::SurfaceRegistry`] creates, switches and closes surfaces;
//! - [`bounds::BoundsPlanner`] debounces foreground resizes;
//! - [`bridge::NavigationBridge`] turns native lifecycle signals into
//!   tagged [`tabhost_common::HostEvent`]s;
//! - [`service::HostService`] runs the loop and hands out a
//!   [`service::HostHandle`] implementing [`tabhost_common::Boundary`];
//! - [`wire::serve_lines`] exposes a handle over newline-delimited JSON.

pub mod bounds;
pub mod bridge;
pub mod headless;
pub mod registry;
pub mod service;
pub mod session;
pub mod surface;
pub mod tree;
pub mod wire;

#[cfg(feature = "wry")]
pub mod wry_backend;

pub use bounds::BoundsPlanner;
pub use bridge::{CertificateGate, NavigationBridge, NativeSignal, SignalSink};
pub use headless::{HeadlessEngine, HeadlessOptions};
pub use registry::SurfaceRegistry;
pub use service::{HostHandle, HostService};
pub use session::WindowSession;
pub use surface::{ContentTree, FixedGeometry, Surface, SurfaceError, SurfaceFactory, WindowGeometry};
pub use tree::VisibilityTree;
pub use wire::serve_lines;
