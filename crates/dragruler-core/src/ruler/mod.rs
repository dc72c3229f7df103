//! Host ruler contract and its drag-aware decorator.
//!
//! [`Ruler`] is the extension-point contract of the host's measurement tool.
//! [`DragRuler`] implements the same trait around any base ruler, adding drag
//! session behavior while delegating untouched whenever no session is active.

mod drag;
mod measuring;

pub use drag::{DragRuler, RulerEnv};
pub use measuring::{DEFAULT_RATE_LIMIT, MeasuringRuler};

use crate::session::DragSession;
use crate::token::TokenId;
use crate::waypoint::Waypoint;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

#[cfg(target_arch = "wasm32")]
pub use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
pub use std::time::Instant;

/// Ruler errors.
#[derive(Debug, Error)]
pub enum RulerError {
    #[error("A drag session is already active")]
    SessionActive,
    #[error("Token not found: {0}")]
    TokenNotFound(TokenId),
    #[error("No token to move")]
    NoMovementToken,
    #[error("Movement rejected: {0}")]
    MovementRejected(String),
}

/// Result type for ruler operations.
pub type RulerResult<T> = Result<T, RulerError>;

/// Boxed future for host operations that animate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Lifecycle state of a ruler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulerState {
    #[default]
    Inactive,
    Starting,
    Measuring,
    Moving,
}

impl RulerState {
    pub fn is_measuring(self) -> bool {
        matches!(self, RulerState::Starting | RulerState::Measuring)
    }
}

/// Role of a user relative to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Player,
    Gamemaster,
}

impl Role {
    pub fn is_gm(self) -> bool {
        self == Role::Gamemaster
    }
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

/// A pointer move while the ruler is measuring.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerMove {
    /// Pointer position in world coordinates.
    pub destination: Point,
    pub modifiers: Modifiers,
    pub time: Instant,
}

impl PointerMove {
    pub fn new(destination: Point, time: Instant) -> Self {
        Self {
            destination,
            modifiers: Modifiers::default(),
            time,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// What the base ruler did with a pointer move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The destination was measured immediately.
    Measured,
    /// Skipped by rate limiting; the caller should defer the measurement.
    RateLimited,
    /// The ruler was not measuring.
    Ignored,
}

/// Drag session details carried in a ruler broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragUpdate {
    pub session: DragSession,
    pub waypoints: Vec<Waypoint>,
    /// Index of the drag-start anchor in `waypoints`.
    #[serde(default)]
    pub anchor: usize,
}

/// Ruler state broadcast to other viewers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulerUpdate {
    pub state: RulerState,
    pub waypoints: Vec<Point>,
    pub destination: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drag: Option<DragUpdate>,
}

/// The host measurement tool.
pub trait Ruler {
    fn state(&self) -> RulerState;

    fn set_state(&mut self, state: RulerState);

    /// Waypoints placed so far.
    fn waypoints(&self) -> &[Point];

    /// Current measured destination.
    fn destination(&self) -> Option<Point>;

    /// Clear the ruler's display and state.
    fn clear(&mut self);

    /// Apply a broadcast from the ruler's owner.
    fn update(&mut self, data: &RulerUpdate);

    /// Snapshot for broadcasting.
    fn to_update(&self) -> RulerUpdate;

    /// Finish measuring.
    fn end_measurement(&mut self);

    /// Measure towards the pointer, subject to rate limiting.
    fn on_pointer_move(&mut self, event: &PointerMove) -> MoveOutcome;

    fn set_destination(&mut self, destination: Point);

    /// Append a waypoint, centering it in its grid cell when `center` is set.
    fn add_waypoint(&mut self, point: Point, center: bool);

    fn remove_last_waypoint(&mut self);

    /// Measure from the waypoints to `destination` now.
    fn measure(&mut self, destination: Point);

    /// Called when a measurement was skipped by rate limiting.
    fn defer_measurement(&mut self, destination: Point, event: &PointerMove);

    fn cancel_scheduled_measurement(&mut self);

    /// The token a move would animate.
    fn movement_token(&self) -> Option<TokenId>;

    /// Animate `token` along the measured path.
    fn move_token_along(&mut self, token: TokenId) -> BoxFuture<'_, RulerResult<()>>;

    /// Move the movement token along the measured path.
    fn move_token(&mut self) -> BoxFuture<'_, RulerResult<()>> {
        match self.movement_token() {
            Some(token) => self.move_token_along(token),
            None => Box::pin(async { Err(RulerError::NoMovementToken) }),
        }
    }
}
