//! Transient detection overlays drawn over the live preview.
//!
//! The store only tracks membership; expiry is driven by the dashboard's
//! timer queue (one timer per overlay, see `Dashboard::add_overlay`).

use std::time::Duration;

use serde::Serialize;

use crate::detect::{Severity, Shape};

/// How long an overlay stays on screen.
pub const OVERLAY_DWELL: Duration = Duration::from_millis(3_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OverlayId(u64);

impl OverlayId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Overlay {
    pub id: OverlayId,
    pub name: String,
    pub severity: Severity,
    pub shape: Shape,
    /// Session time at which the overlay is removed.
    #[serde(skip)]
    pub expires_at: Duration,
}

#[derive(Default)]
pub struct OverlayStore {
    overlays: Vec<Overlay>,
    next_id: u64,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an overlay. Returns `None` for shapes that cannot be drawn
    /// (polygons with fewer than three points).
    pub fn add(
        &mut self,
        shape: Shape,
        name: &str,
        severity: Severity,
        expires_at: Duration,
    ) -> Option<OverlayId> {
        if !shape.is_drawable() {
            return None;
        }
        self.next_id += 1;
        let id = OverlayId(self.next_id);
        self.overlays.push(Overlay {
            id,
            name: name.to_string(),
            severity,
            shape,
            expires_at,
        });
        Some(id)
    }

    /// Remove an overlay. Removing an unknown or already-removed id is a no-op.
    pub fn remove(&mut self, id: OverlayId) -> bool {
        let before = self.overlays.len();
        self.overlays.retain(|overlay| overlay.id != id);
        self.overlays.len() != before
    }

    pub fn get(&self, id: OverlayId) -> Option<&Overlay> {
        self.overlays.iter().find(|overlay| overlay.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays.iter()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Remove everything, returning the ids that were present.
    pub fn clear(&mut self) -> Vec<OverlayId> {
        self.overlays.drain(..).map(|overlay| overlay.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Point;

    fn square() -> Shape {
        Shape::bbox(10.0, 10.0, 50.0, 50.0)
    }

    #[test]
    fn ids_are_unique_and_removal_is_idempotent() {
        let mut store = OverlayStore::new();
        let a = store.add(square(), "포트홀", Severity::Medium, OVERLAY_DWELL).unwrap();
        let b = store.add(square(), "포트홀", Severity::Medium, OVERLAY_DWELL).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);

        assert!(store.remove(a));
        assert!(!store.remove(a));
        assert_eq!(store.len(), 1);
        assert!(store.get(b).is_some());
    }

    #[test]
    fn degenerate_polygons_are_rejected() {
        let mut store = OverlayStore::new();
        let shape = Shape::polygon(vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        assert!(store.add(shape, "낙하물", Severity::High, OVERLAY_DWELL).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_reports_removed_ids() {
        let mut store = OverlayStore::new();
        let a = store.add(square(), "a", Severity::Low, OVERLAY_DWELL).unwrap();
        let b = store.add(square(), "b", Severity::Low, OVERLAY_DWELL).unwrap();
        assert_eq!(store.clear(), vec![a, b]);
        assert!(store.is_empty());
        let c = store.add(square(), "c", Severity::Low, OVERLAY_DWELL).unwrap();
        assert!(c > b);
    }
}
