//! DragRuler Core Library
//!
//! Drag-driven measurement for a host ruler: session state, waypoints,
//! token-aware snapping, deferred measurement and segment composition.

pub mod grid;
pub mod ruler;
pub mod scheduler;
pub mod segment;
pub mod session;
pub mod settings;
pub mod snap;
pub mod token;
pub mod waypoint;

pub use grid::{Grid, GridCell, GridError, GridGeometry, GridKind};
pub use ruler::{
    DragRuler, DragUpdate, Instant, MeasuringRuler, Modifiers, MoveOutcome, PointerMove, Role, Ruler, RulerEnv,
    RulerError, RulerResult, RulerState, RulerUpdate,
};
pub use scheduler::{DeferredMeasurementScheduler, DeferredRequest, MeasurementWait, SchedulerState, WaitOutcome};
pub use segment::{DragSegment, RecordingSegment, Ray, RulerSegment, SegmentStyle, build_segments};
pub use session::DragSession;
pub use settings::{ConfigError, DragRulerSettings, SettingsProvider, SharedSettings};
pub use snap::{Snapper, area_for_shape_at, snap_destination};
pub use token::{MemoryTokenRegistry, Token, TokenFootprint, TokenId, TokenRegistry, TokenShape};
pub use waypoint::{NoAnnotations, Waypoint, WaypointAnnotator, WaypointStore};
