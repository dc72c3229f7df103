//! Scripted drag scenarios.
//!
//! A scenario is a JSON document describing the scene (grid, tokens, settings,
//! roles) and a list of input steps. Replaying it drives a [`DragRuler`] over
//! the reference [`MeasuringRuler`] and reports the resulting segments.
//!
//! ```json
//! {
//!   "grid": { "kind": "square", "size": 100 },
//!   "tokens": [{ "name": "goblin", "center": { "x": 50, "y": 50 } }],
//!   "steps": [
//!     { "type": "start_drag", "token": "goblin", "pointer": { "x": 50, "y": 50 } },
//!     { "type": "move", "to": { "x": 250, "y": 50 }, "at_ms": 0 },
//!     { "type": "drop" }
//!   ]
//! }
//! ```

use dragruler_core::{
    DragRuler, DragRulerSettings, Grid, GridCell, Instant, MeasuringRuler, MemoryTokenRegistry, Modifiers,
    NoAnnotations, PointerMove, RecordingSegment, Role, Ruler, RulerEnv, RulerError, RulerSegment, RulerUpdate,
    SharedSettings, Token, TokenFootprint, TokenId, TokenRegistry,
};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Replay errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unknown token: {0}")]
    UnknownToken(String),
    #[error("Duplicate token name: {0}")]
    DuplicateToken(String),
    #[error("Step {step} failed: {source}")]
    Step {
        step: usize,
        #[source]
        source: RulerError,
    },
}

fn one() -> f64 {
    1.0
}

fn default_rate_limit_ms() -> u64 {
    50
}

/// A named token placed on the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneToken {
    pub name: String,
    pub center: Point,
    #[serde(default = "one")]
    pub width: f64,
    #[serde(default = "one")]
    pub height: f64,
}

/// One scripted input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Grab a token with the pointer at `pointer`.
    StartDrag {
        token: String,
        pointer: Point,
        #[serde(default)]
        history: Vec<Point>,
    },
    /// Pointer moved to `to`, `at_ms` after the scenario started.
    Move {
        to: Point,
        at_ms: u64,
        #[serde(default)]
        shift: bool,
    },
    Spacebar,
    RightClick,
    /// Let the deferred-measurement timer fire.
    Tick,
    MarkTraversed { upto: usize },
    Recalculate,
    Abort,
    /// Release the pointer and move the token.
    Drop,
}

/// A complete scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub settings: DragRulerSettings,
    #[serde(default)]
    pub grid: Grid,
    #[serde(default)]
    pub owner: Role,
    #[serde(default)]
    pub viewer: Role,
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    pub tokens: Vec<SceneToken>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// A rendered segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub from: Point,
    pub to: Point,
    pub distance: f64,
    pub is_previous: bool,
    pub line_opacity: f32,
    pub cells: Vec<GridCell>,
}

impl SegmentReport {
    fn from_segment(segment: &RecordingSegment) -> Self {
        let ray = segment.ray();
        Self {
            from: ray.a,
            to: ray.b,
            distance: segment.distance,
            is_previous: ray.is_previous,
            line_opacity: segment.opacity().line,
            cells: segment.filled_cells(),
        }
    }
}

/// Result of replaying a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Segments as they stood after the last step.
    pub segments: Vec<SegmentReport>,
    /// Final token centres by name.
    pub tokens: BTreeMap<String, Point>,
    /// Number of measurements the host ruler performed.
    pub measurements: usize,
    /// Paths tokens were moved along.
    pub moves: Vec<Vec<Point>>,
    /// Final broadcast snapshot.
    pub update: RulerUpdate,
}

/// Drives a drag ruler through scenario steps.
pub struct Replay {
    ruler: DragRuler<MeasuringRuler>,
    tokens: Arc<MemoryTokenRegistry>,
    names: BTreeMap<String, TokenId>,
    cell_size: f64,
    start: Instant,
}

impl Replay {
    pub fn new(scenario: &Scenario) -> Result<Self, ReplayError> {
        let grid = Arc::new(scenario.grid);
        let tokens = Arc::new(MemoryTokenRegistry::new());
        let mut names = BTreeMap::new();
        for placed in &scenario.tokens {
            let token = Token::new(placed.center, TokenFootprint::new(placed.width, placed.height));
            if names.insert(placed.name.clone(), token.id).is_some() {
                return Err(ReplayError::DuplicateToken(placed.name.clone()));
            }
            tokens.insert(token);
        }

        let base = MeasuringRuler::new(grid.clone(), Arc::clone(&tokens))
            .with_rate_limit(Duration::from_millis(scenario.rate_limit_ms));
        let env = RulerEnv {
            tokens: tokens.clone(),
            grid,
            settings: Arc::new(SharedSettings::new(scenario.settings)),
        };
        Ok(Self {
            ruler: DragRuler::new(base, env, scenario.owner, scenario.viewer),
            tokens,
            names,
            cell_size: scenario.grid.size,
            start: Instant::now(),
        })
    }

    fn token_id(&self, name: &str) -> Result<TokenId, ReplayError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ReplayError::UnknownToken(name.to_string()))
    }

    /// Apply one step.
    pub fn apply(&mut self, index: usize, step: &Step) -> Result<(), ReplayError> {
        log::debug!("Step {}: {:?}", index, step);
        let fail = |source| ReplayError::Step { step: index, source };
        match step {
            Step::StartDrag { token, pointer, history } => {
                let id = self.token_id(token)?;
                self.ruler
                    .start_drag_with_history(id, *pointer, history)
                    .map_err(fail)?;
            }
            Step::Move { to, at_ms, shift } => {
                let time = self.start + Duration::from_millis(*at_ms);
                let event = PointerMove::new(*to, time).with_modifiers(Modifiers {
                    shift: *shift,
                    ..Modifiers::default()
                });
                let outcome = self.ruler.on_pointer_move(&event);
                log::trace!("Pointer move to {:?}: {:?}", to, outcome);
            }
            Step::Spacebar => pollster::block_on(self.ruler.move_token()).map_err(fail)?,
            Step::RightClick => self.ruler.on_right_click(),
            Step::Tick => {
                self.ruler.on_tick();
            }
            Step::MarkTraversed { upto } => self.ruler.mark_traversed(*upto),
            Step::Recalculate => self.ruler.recalculate(&NoAnnotations),
            Step::Abort => self.ruler.abort_drag(),
            Step::Drop => pollster::block_on(self.ruler.on_drop()).map_err(fail)?,
        }
        Ok(())
    }

    /// Snapshot the ruler and scene.
    pub fn report(&self) -> Report {
        let cell_size = self.cell_size;
        let segments = self
            .ruler
            .render_segments(|index, ray| RecordingSegment::new(index, ray, cell_size))
            .iter()
            .map(SegmentReport::from_segment)
            .collect();
        let tokens = self
            .names
            .iter()
            .filter_map(|(name, id)| self.tokens.get(*id).map(|token| (name.clone(), token.center)))
            .collect();
        let base = self.ruler.base();
        Report {
            segments,
            tokens,
            measurements: base.measurements.len(),
            moves: base.moves.iter().map(|(_, path)| path.clone()).collect(),
            update: self.ruler.to_update(),
        }
    }
}

/// Replay every step of `scenario` and report the outcome.
pub fn run(scenario: &Scenario) -> Result<Report, ReplayError> {
    let mut replay = Replay::new(scenario)?;
    for (index, step) in scenario.steps.iter().enumerate() {
        replay.apply(index, step)?;
    }
    Ok(replay.report())
}

/// Load and replay the scenario at `path`.
pub fn replay_file(path: &Path) -> Result<Report, ReplayError> {
    let scenario = Scenario::load(path)?;
    log::info!(
        "Replaying {} steps over {} tokens from {}",
        scenario.steps.len(),
        scenario.tokens.len(),
        path.display()
    );
    run(&scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DRAG: &str = r#"{
        "grid": { "kind": "square", "size": 10 },
        "tokens": [{ "name": "goblin", "center": { "x": 5, "y": 5 } }],
        "steps": [
            { "type": "start_drag", "token": "goblin", "pointer": { "x": 5, "y": 5 } },
            { "type": "move", "to": { "x": 27, "y": 3 }, "at_ms": 0 },
            { "type": "spacebar" },
            { "type": "move", "to": { "x": 24, "y": 28 }, "at_ms": 100 }
        ]
    }"#;

    #[test]
    fn test_parse_defaults() {
        let scenario = Scenario::from_json(DRAG).unwrap();
        assert_eq!(scenario.rate_limit_ms, 50);
        assert_eq!(scenario.owner, Role::Player);
        assert!(scenario.settings.show_gm_ruler_to_players);
        assert_eq!(scenario.tokens[0].width, 1.0);
        assert_eq!(scenario.steps.len(), 4);
    }

    #[test]
    fn test_replay_segments() {
        let report = run(&Scenario::from_json(DRAG).unwrap()).unwrap();
        assert_eq!(report.segments.len(), 2);
        assert_eq!(report.segments[0].from, Point::new(5.0, 5.0));
        assert_eq!(report.segments[0].to, Point::new(25.0, 5.0));
        assert_eq!(report.segments[1].to, Point::new(25.0, 25.0));
        assert_eq!(report.measurements, 2);
        assert!(report.update.drag.is_some());
    }

    #[test]
    fn test_drop_moves_token() {
        let mut scenario = Scenario::from_json(DRAG).unwrap();
        scenario.steps.push(Step::Drop);
        let report = run(&scenario).unwrap();

        assert_eq!(report.tokens["goblin"], Point::new(25.0, 25.0));
        assert_eq!(report.moves.len(), 1);
        assert!(report.update.drag.is_none());
        assert!(report.segments.is_empty());
    }

    #[test]
    fn test_unknown_token() {
        let json = r#"{
            "tokens": [],
            "steps": [{ "type": "start_drag", "token": "orc", "pointer": { "x": 0, "y": 0 } }]
        }"#;
        let result = run(&Scenario::from_json(json).unwrap());
        assert!(matches!(result, Err(ReplayError::UnknownToken(name)) if name == "orc"));
    }

    #[test]
    fn test_zero_grid_size_rejected() {
        let json = r#"{
            "grid": { "kind": "square", "size": 0 },
            "tokens": [],
            "steps": []
        }"#;
        assert!(matches!(Scenario::from_json(json), Err(ReplayError::Parse(_))));
    }

    #[test]
    fn test_duplicate_token_names() {
        let json = r#"{
            "tokens": [
                { "name": "a", "center": { "x": 5, "y": 5 } },
                { "name": "a", "center": { "x": 15, "y": 5 } }
            ],
            "steps": []
        }"#;
        assert!(matches!(Replay::new(&Scenario::from_json(json).unwrap()), Err(ReplayError::DuplicateToken(_))));
    }

    #[test]
    fn test_demo_scenario() {
        let scenario = Scenario::from_json(include_str!("../../../demos/waypoints.json")).unwrap();
        let report = run(&scenario).unwrap();

        // The ogre is 2x2, so it lands on grid intersections.
        assert_eq!(report.tokens["ogre"], Point::new(600.0, 800.0));
        assert_eq!(report.moves.len(), 1);

        assert_eq!(report.segments.len(), 2);
        assert!(report.segments[0].is_previous);
        assert!(!report.segments[1].is_previous);
        // Shift held: the measured destination is not snapped, only the drawn ray is centred.
        assert_eq!(report.update.destination, Some(Point::new(250.0, 260.0)));
        assert_eq!(report.segments[1].to, Point::new(250.0, 250.0));
    }

    #[test]
    fn test_replay_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DRAG.as_bytes()).unwrap();
        let report = replay_file(file.path()).unwrap();
        assert_eq!(report.segments.len(), 2);

        let missing = file.path().with_extension("missing");
        assert!(matches!(replay_file(&missing), Err(ReplayError::Io(_))));
    }
}
