//! A content tree that attaches surfaces by making them visible.
//!
//! Child webviews are always parented to the window; "attached" means
//! shown, "detached" means hidden. The tree keeps a log of operations so
//! the attach/detach ordering can be inspected.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tabhost_common::TabId;

use crate::surface::{ContentTree, Surface, SurfaceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOp {
    Attach(TabId),
    Detach(TabId),
}

#[derive(Debug, Default)]
struct TreeState {
    attached: Vec<TabId>,
    log: Vec<TreeOp>,
    peak: usize,
}

/// Visibility-based [`ContentTree`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct VisibilityTree {
    state: Arc<Mutex<TreeState>>,
}

impl VisibilityTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached(&self) -> Vec<TabId> {
        self.state
            .lock()
            .map(|s| s.attached.clone())
            .unwrap_or_default()
    }

    pub fn log(&self) -> Vec<TreeOp> {
        self.state.lock().map(|s| s.log.clone()).unwrap_or_default()
    }

    /// Largest number of simultaneously attached surfaces ever observed.
    pub fn peak(&self) -> usize {
        self.state.lock().map(|s| s.peak).unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl ContentTree for VisibilityTree {
    async fn attach(
        &mut self,
        tab_id: TabId,
        surface: &mut dyn Surface,
    ) -> Result<(), SurfaceError> {
        surface.set_visible(true)?;
        let mut state = self.state.lock().map_err(|_| SurfaceError::Gone)?;
        if !state.attached.contains(&tab_id) {
            state.attached.push(tab_id);
        }
        state.log.push(TreeOp::Attach(tab_id));
        state.peak = state.peak.max(state.attached.len());
        Ok(())
    }

    async fn detach(
        &mut self,
        tab_id: TabId,
        surface: &mut dyn Surface,
    ) -> Result<(), SurfaceError> {
        {
            let mut state = self.state.lock().map_err(|_| SurfaceError::Gone)?;
            state.attached.retain(|id| *id != tab_id);
            state.log.push(TreeOp::Detach(tab_id));
        }
        surface.set_visible(false)
    }

    fn contains(&self, tab_id: TabId) -> bool {
        self.state
            .lock()
            .map(|s| s.attached.contains(&tab_id))
            .unwrap_or(false)
    }
}
