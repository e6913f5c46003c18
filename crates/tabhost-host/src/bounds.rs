//! Debounced placement of the foreground surface.
//!
//! The planner holds a single pending slot. Scheduling always replaces the
//! slot, so a burst of requests collapses into one application of the last
//! rectangle once the debounce window passes quietly. The planner never
//! touches a surface itself; the host loop asks it for the deadline and
//! takes the due rectangle when it fires.

use std::time::Duration;

use tabhost_common::Rect;
use tabhost_config::{BoundsConfig, ChromeMargins};
use tokio::time::Instant;
use tracing::trace;

use crate::surface::WindowGeometry;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingBounds {
    rect: Rect,
    due: Instant,
}

pub struct BoundsPlanner {
    debounce: Duration,
    chrome: ChromeMargins,
    geometry: Box<dyn WindowGeometry>,
    pending: Option<PendingBounds>,
    latest: Option<Rect>,
}

impl BoundsPlanner {
    pub fn new(config: &BoundsConfig, geometry: Box<dyn WindowGeometry>) -> Self {
        Self {
            debounce: Duration::from_millis(u64::from(config.debounce_ms)),
            chrome: config.chrome.clone(),
            geometry,
            pending: None,
            latest: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Resolve the rectangle a request stands for.
    ///
    /// Precise geometry from the UI wins. Without it the content area is
    /// estimated as the window minus the configured chrome margins.
    pub fn resolve(&self, precise: Option<Rect>) -> Rect {
        match precise {
            Some(rect) => rect.to_pixels(),
            None => self.estimate(),
        }
    }

    fn estimate(&self) -> Rect {
        let (width, height) = self.geometry.outer_size();
        let c = &self.chrome;
        Rect::new(
            f64::from(c.left),
            f64::from(c.top),
            f64::from(width.saturating_sub(c.horizontal())),
            f64::from(height.saturating_sub(c.vertical())),
        )
    }

    /// Replace whatever is pending with a new request due one debounce
    /// window from `now`. Returns the resolved rectangle.
    pub fn schedule(&mut self, precise: Option<Rect>, now: Instant) -> Rect {
        let rect = self.resolve(precise);
        if let Some(prev) = self.pending.replace(PendingBounds {
            rect,
            due: now + self.debounce,
        }) {
            trace!(superseded = ?prev.rect, "bounds request superseded");
        }
        self.latest = Some(rect);
        rect
    }

    /// Put a rectangle that could not be applied back in the slot, unless
    /// something newer has been scheduled meanwhile.
    pub fn retry_later(&mut self, rect: Rect, now: Instant) {
        if self.pending.is_none() && self.latest == Some(rect) {
            self.pending = Some(PendingBounds {
                rect,
                due: now + self.debounce,
            });
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.due)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the pending rectangle if its window has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<Rect> {
        match self.pending {
            Some(p) if p.due <= now => {
                self.pending = None;
                Some(p.rect)
            }
            _ => None,
        }
    }

    /// The most recent authoritative rectangle, applied or not.
    pub fn latest(&self) -> Option<Rect> {
        self.latest
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::FixedGeometry;

    fn planner() -> BoundsPlanner {
        BoundsPlanner::new(
            &BoundsConfig::default(),
            Box::new(FixedGeometry {
                width: 1280,
                height: 800,
            }),
        )
    }

    #[test]
    fn estimate_subtracts_chrome() {
        let p = planner();
        assert_eq!(p.resolve(None), Rect::new(0.0, 80.0, 1280.0, 720.0));
    }

    #[test]
    fn precise_rect_wins_and_is_snapped() {
        let p = planner();
        assert_eq!(
            p.resolve(Some(Rect::new(10.2, 90.7, 799.6, 600.0))),
            Rect::new(10.0, 91.0, 800.0, 600.0)
        );
    }

    #[test]
    fn estimate_follows_live_geometry() {
        let size = std::rc::Rc::new(std::cell::Cell::new((1000u32, 700u32)));
        let live = std::rc::Rc::clone(&size);
        let p = BoundsPlanner::new(&BoundsConfig::default(), Box::new(move || live.get()));
        assert_eq!(p.resolve(None).width, 1000.0);
        size.set((1600, 900));
        assert_eq!(p.resolve(None), Rect::new(0.0, 80.0, 1600.0, 820.0));
    }

    #[test]
    fn tiny_window_clamps_to_zero() {
        let p = BoundsPlanner::new(
            &BoundsConfig::default(),
            Box::new(FixedGeometry {
                width: 10,
                height: 40,
            }),
        );
        let rect = p.resolve(None);
        assert_eq!(rect.height, 0.0);
        assert!(rect.is_empty());
    }

    #[test]
    fn oversized_margins_do_not_wrap() {
        let mut config = BoundsConfig::default();
        config.chrome.left = u32::MAX;
        config.chrome.right = 1;
        let p = BoundsPlanner::new(
            &config,
            Box::new(FixedGeometry {
                width: 1280,
                height: 800,
            }),
        );
        let rect = p.resolve(None);
        assert_eq!(rect.width, 0.0);
        assert_eq!(rect.height, 720.0);
    }

    #[test]
    fn burst_collapses_to_last_request() {
        let mut p = planner();
        let t0 = Instant::now();
        for (i, width) in [700.0, 800.0, 900.0].into_iter().enumerate() {
            p.schedule(
                Some(Rect::new(0.0, 0.0, width, 600.0)),
                t0 + Duration::from_millis(10 * i as u64),
            );
        }
        assert_eq!(p.take_due(t0 + Duration::from_millis(50)), None);
        let due = p.deadline().unwrap();
        assert_eq!(due, t0 + Duration::from_millis(70));
        assert_eq!(p.take_due(due), Some(Rect::new(0.0, 0.0, 900.0, 600.0)));
        assert!(!p.is_pending());
        assert_eq!(p.take_due(due + Duration::from_secs(1)), None);
    }

    #[test]
    fn retry_is_dropped_when_superseded() {
        let mut p = planner();
        let t0 = Instant::now();
        let old = p.schedule(Some(Rect::new(0.0, 0.0, 100.0, 100.0)), t0);
        let taken = p.take_due(t0 + p.debounce()).unwrap();
        assert_eq!(taken, old);

        let newer = p.schedule(Some(Rect::new(0.0, 0.0, 200.0, 100.0)), t0);
        p.retry_later(old, t0);
        assert_eq!(p.take_due(t0 + p.debounce()), Some(newer));
    }

    #[test]
    fn retry_rearms_the_latest() {
        let mut p = planner();
        let t0 = Instant::now();
        let rect = p.schedule(None, t0);
        let taken = p.take_due(t0 + p.debounce()).unwrap();
        p.retry_later(taken, t0 + p.debounce());
        assert_eq!(p.deadline(), Some(t0 + p.debounce() * 2));
        assert_eq!(p.latest(), Some(rect));
    }

    #[test]
    fn cancel_clears_the_slot() {
        let mut p = planner();
        p.schedule(None, Instant::now());
        p.cancel();
        assert_eq!(p.deadline(), None);
    }
}
