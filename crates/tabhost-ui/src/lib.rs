//! The UI process's side of tabhost.
//!
//! The UI holds no surface handles. It talks to the host through a
//! [`tabhost_common::Boundary`] and mirrors tab state in a [`TabProxy`].

pub mod boundary;
pub mod proxy;
pub mod record;

pub use boundary::LineBoundary;
pub use proxy::TabProxy;
pub use record::{TabRecord, UiEvent};
