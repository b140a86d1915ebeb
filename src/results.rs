use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::detect::{Severity, ShapeKind};

/// Live results shown at once.
pub const MAX_LIVE_DETECTIONS: usize = 10;
/// Detections kept for the history tab.
pub const MAX_HISTORY_DETECTIONS: usize = 100;

static NEXT_DETECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique detection id. Two detections created in the same
/// millisecond still get distinct ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DetectionId(u64);

impl DetectionId {
    fn next() -> Self {
        DetectionId(NEXT_DETECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A hazard finding shown as a result entry. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub id: DetectionId,
    pub name: String,
    pub details: String,
    pub severity: Severity,
    pub shape_kind: Option<ShapeKind>,
    pub created_at_ms: u64,
}

impl Detection {
    pub fn new(
        name: &str,
        details: &str,
        severity: Severity,
        shape_kind: Option<ShapeKind>,
    ) -> Self {
        let created_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            id: DetectionId::next(),
            name: name.to_string(),
            details: details.to_string(),
            severity,
            shape_kind,
            created_at_ms,
        }
    }
}

/// Most-recent-first list capped at a fixed size; inserting evicts the oldest.
#[derive(Clone, Debug)]
pub struct RecentDetections {
    items: VecDeque<Detection>,
    capacity: usize,
}

impl RecentDetections {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(MAX_HISTORY_DETECTIONS)),
            capacity: capacity.max(1),
        }
    }

    /// Insert at the front. Returns the evicted entry, if any.
    pub fn push(&mut self, detection: Detection) -> Option<Detection> {
        self.items.push_front(detection);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&Detection> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Totals by severity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DetectionStats {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl DetectionStats {
    pub fn from_detections<'a>(detections: impl IntoIterator<Item = &'a Detection>) -> Self {
        detections
            .into_iter()
            .fold(Self::default(), |mut stats, detection| {
                stats.total += 1;
                match detection.severity {
                    Severity::High => stats.high += 1,
                    Severity::Medium => stats.medium += 1,
                    Severity::Low => stats.low += 1,
                }
                stats
            })
    }
}
