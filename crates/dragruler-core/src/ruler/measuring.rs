//! Reference host ruler with click-to-place waypoints and rate-limited measuring.

use super::{BoxFuture, MoveOutcome, PointerMove, Ruler, RulerError, RulerResult, RulerState, RulerUpdate};
use super::Instant;
use crate::grid::GridGeometry;
use crate::token::{MemoryTokenRegistry, TokenId, TokenRegistry};
use kurbo::Point;
use std::sync::Arc;
use std::time::Duration;

/// Minimum time between two measurements.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(50);

/// Base ruler used by the replay tool and tests.
///
/// Records every measurement, broadcast and movement so callers can observe
/// what the drag layer forwarded.
pub struct MeasuringRuler {
    state: RulerState,
    waypoints: Vec<Point>,
    destination: Option<Point>,
    grid: Arc<dyn GridGeometry>,
    tokens: Arc<MemoryTokenRegistry>,
    /// Token selected on the host side, used outside drag sessions.
    controlled_token: Option<TokenId>,
    rate_limit: Duration,
    last_measured: Option<Instant>,
    deferred: Option<Point>,
    /// Destinations measured, in order.
    pub measurements: Vec<Point>,
    /// Broadcasts applied through `update`.
    pub updates: Vec<RulerUpdate>,
    /// Paths tokens were moved along.
    pub moves: Vec<(TokenId, Vec<Point>)>,
}

impl std::fmt::Debug for MeasuringRuler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasuringRuler")
            .field("state", &self.state)
            .field("waypoints", &self.waypoints)
            .field("destination", &self.destination)
            .field("controlled_token", &self.controlled_token)
            .field("rate_limit", &self.rate_limit)
            .field("deferred", &self.deferred)
            .field("measurements", &self.measurements.len())
            .finish_non_exhaustive()
    }
}

impl MeasuringRuler {
    pub fn new(grid: Arc<dyn GridGeometry>, tokens: Arc<MemoryTokenRegistry>) -> Self {
        Self {
            state: RulerState::Inactive,
            waypoints: Vec::new(),
            destination: None,
            grid,
            tokens,
            controlled_token: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            last_measured: None,
            deferred: None,
            measurements: Vec::new(),
            updates: Vec::new(),
            moves: Vec::new(),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn set_controlled_token(&mut self, token: Option<TokenId>) {
        self.controlled_token = token;
    }

    /// The measurement skipped most recently, if not cancelled.
    pub fn deferred(&self) -> Option<Point> {
        self.deferred
    }

    fn path(&self) -> Vec<Point> {
        let mut path = self.waypoints.clone();
        path.extend(self.destination);
        path
    }
}

impl Ruler for MeasuringRuler {
    fn state(&self) -> RulerState {
        self.state
    }

    fn set_state(&mut self, state: RulerState) {
        self.state = state;
    }

    fn waypoints(&self) -> &[Point] {
        &self.waypoints
    }

    fn destination(&self) -> Option<Point> {
        self.destination
    }

    fn clear(&mut self) {
        self.state = RulerState::Inactive;
        self.waypoints.clear();
        self.destination = None;
        self.last_measured = None;
        self.deferred = None;
    }

    fn update(&mut self, data: &RulerUpdate) {
        self.state = data.state;
        self.waypoints = data.waypoints.clone();
        self.destination = data.destination;
        self.updates.push(data.clone());
    }

    fn to_update(&self) -> RulerUpdate {
        RulerUpdate {
            state: self.state,
            waypoints: self.waypoints.clone(),
            destination: self.destination,
            drag: None,
        }
    }

    fn end_measurement(&mut self) {
        self.clear();
    }

    fn on_pointer_move(&mut self, event: &PointerMove) -> MoveOutcome {
        if !self.state.is_measuring() {
            return MoveOutcome::Ignored;
        }
        if let Some(last) = self.last_measured {
            if event.time.saturating_duration_since(last) < self.rate_limit {
                return MoveOutcome::RateLimited;
            }
        }
        self.last_measured = Some(event.time);
        self.measure(event.destination);
        MoveOutcome::Measured
    }

    fn set_destination(&mut self, destination: Point) {
        self.destination = Some(destination);
    }

    fn add_waypoint(&mut self, point: Point, center: bool) {
        let point = if center { self.grid.center_of(point) } else { point };
        self.waypoints.push(point);
        if self.state == RulerState::Inactive {
            self.state = RulerState::Starting;
        }
    }

    fn remove_last_waypoint(&mut self) {
        self.waypoints.pop();
    }

    fn measure(&mut self, destination: Point) {
        self.set_destination(destination);
        self.measurements.push(destination);
        if self.state == RulerState::Starting {
            self.state = RulerState::Measuring;
        }
    }

    fn defer_measurement(&mut self, destination: Point, _event: &PointerMove) {
        self.deferred = Some(destination);
    }

    fn cancel_scheduled_measurement(&mut self) {
        self.deferred = None;
    }

    fn movement_token(&self) -> Option<TokenId> {
        self.controlled_token
    }

    fn move_token_along(&mut self, token: TokenId) -> BoxFuture<'_, RulerResult<()>> {
        Box::pin(async move {
            let path = self.path();
            let Some(&end) = path.last() else {
                return Err(RulerError::MovementRejected("empty path".to_string()));
            };
            if self.tokens.get(token).is_none() {
                return Err(RulerError::TokenNotFound(token));
            }
            self.state = RulerState::Moving;
            log::debug!("Moving token {} along {} points", token, path.len());
            self.tokens.move_to(token, end);
            self.moves.push((token, path));
            self.end_measurement();
            Ok(())
        })
    }
}
