//! Ordered waypoint list for a drag session.

use crate::snap::Snapper;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A recorded point along the dragged path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub point: Point,
    /// Already traversed by the token. Rendered dimmed and never deletable.
    #[serde(default)]
    pub is_previous: bool,
    /// Visited-space bookkeeping owned by the path annotator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visited_spaces: Option<Value>,
    /// Movement state at this waypoint, owned by the path annotator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<Value>,
}

impl Waypoint {
    pub fn new(point: Point) -> Self {
        Self {
            point,
            is_previous: false,
            visited_spaces: None,
            final_state: None,
        }
    }

    pub fn previous(point: Point) -> Self {
        Self {
            is_previous: true,
            ..Self::new(point)
        }
    }
}

/// Cached per-waypoint data produced by a [`WaypointAnnotator`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaypointCache {
    pub visited_spaces: Option<Value>,
    pub final_state: Option<Value>,
}

/// Computes visited-space and final-state caches for waypoints.
///
/// `path` holds every waypoint before `waypoint`, already refreshed.
pub trait WaypointAnnotator {
    fn annotate(&self, path: &[Waypoint], waypoint: &Waypoint) -> WaypointCache;
}

/// Annotator that clears every cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnnotations;

impl WaypointAnnotator for NoAnnotations {
    fn annotate(&self, _path: &[Waypoint], _waypoint: &Waypoint) -> WaypointCache {
        WaypointCache::default()
    }
}

/// Owns the waypoints of the active drag session.
///
/// While active the list is never empty: the drag-start anchor is always present.
#[derive(Debug, Clone, Default)]
pub struct WaypointStore {
    waypoints: Vec<Waypoint>,
    /// Index of the drag-start anchor. Everything before it is history.
    anchor: usize,
    active: bool,
}

impl WaypointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session anchored at `anchor`.
    pub fn begin(&mut self, anchor: Point) {
        self.begin_with_history(&[], anchor);
    }

    /// Start a session whose earlier movement is `history`.
    ///
    /// History points come first and are marked as traversed; `anchor` is the
    /// first pending waypoint.
    pub fn begin_with_history(&mut self, history: &[Point], anchor: Point) {
        self.waypoints = history.iter().copied().map(Waypoint::previous).collect();
        self.anchor = self.waypoints.len();
        self.waypoints.push(Waypoint::new(anchor));
        self.active = true;
    }

    /// Adopt a waypoint list received from another client. Ignored if empty.
    pub fn restore(&mut self, waypoints: Vec<Waypoint>, anchor: usize) {
        if waypoints.is_empty() {
            return;
        }
        self.anchor = anchor.min(waypoints.len() - 1);
        self.waypoints = waypoints;
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Index of the drag-start anchor.
    pub fn anchor_index(&self) -> usize {
        self.anchor
    }

    /// The drag-start anchor, if any waypoint exists.
    pub fn anchor(&self) -> Option<&Waypoint> {
        self.waypoints.get(self.anchor)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn last(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }

    /// Number of waypoints not yet traversed.
    pub fn pending_count(&self) -> usize {
        self.waypoints.iter().filter(|w| !w.is_previous).count()
    }

    /// Append a waypoint, snapping it through `snapper` when `center` is set.
    ///
    /// Returns the stored point, or `None` when no session is active.
    pub fn add_waypoint(&mut self, point: Point, center: bool, snapper: &Snapper<'_>) -> Option<Point> {
        if !self.active {
            return None;
        }
        let point = if center { snapper.snap(point) } else { point };
        self.waypoints.push(Waypoint::new(point));
        Some(point)
    }

    /// Remove the newest pending waypoint. Traversed waypoints and the
    /// anchor are never removed.
    pub fn delete_last_waypoint(&mut self) -> Option<Waypoint> {
        if self.waypoints.len() <= self.anchor + 1 {
            return None;
        }
        match self.waypoints.last() {
            Some(last) if !last.is_previous => self.waypoints.pop(),
            _ => None,
        }
    }

    /// Reset to a single anchor at `anchor` and deactivate.
    pub fn clear(&mut self, anchor: Point) {
        self.waypoints.clear();
        self.waypoints.push(Waypoint::new(anchor));
        self.anchor = 0;
        self.active = false;
    }

    /// Mark every waypoint up to and including `upto` as traversed.
    pub fn mark_traversed(&mut self, upto: usize) {
        for waypoint in self.waypoints.iter_mut().take(upto.saturating_add(1)) {
            waypoint.is_previous = true;
        }
    }

    /// Refresh every waypoint's cached data, keeping order and flags.
    pub fn recalculate(&mut self, annotator: &dyn WaypointAnnotator) {
        for i in 0..self.waypoints.len() {
            let (path, rest) = self.waypoints.split_at_mut(i);
            let waypoint = &mut rest[0];
            let cache = annotator.annotate(path, waypoint);
            waypoint.visited_spaces = cache.visited_spaces;
            waypoint.final_state = cache.final_state;
        }
    }
}
