//! Segment composition and per-segment rendering.
//!
//! Rays are derived values: rebuilt from the waypoint list (plus the live
//! destination) on every pass and never mutated in place.

use crate::grid::{GridCell, GridGeometry};
use crate::snap::Snapper;
use crate::waypoint::Waypoint;
use kurbo::{Line, Point};
use peniko::Color;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opacity multiplier for segments already traversed.
pub const PREVIOUS_OPACITY: f32 = 0.33;

/// Opacity multiplier for pending segments.
pub const PENDING_OPACITY: f32 = 1.0;

/// Opacity multiplier for a segment classification.
pub fn opacity_for(is_previous: bool) -> f32 {
    if is_previous {
        PREVIOUS_OPACITY
    } else {
        PENDING_OPACITY
    }
}

/// Scale `color`'s alpha by `opacity`.
pub fn with_opacity(color: Color, opacity: f32) -> Color {
    let rgba = color.to_rgba8();
    let alpha = (rgba.a as f32 * opacity) as u8;
    Color::from_rgba8(rgba.r, rgba.g, rgba.b, alpha)
}

/// A directed segment between two consecutive waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub a: Point,
    pub b: Point,
    pub is_previous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visited_spaces: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<Value>,
}

impl Ray {
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            a,
            b,
            is_previous: false,
            visited_spaces: None,
            final_state: None,
        }
    }

    /// Carry classification and caches from the waypoint the ray starts at.
    pub fn from_origin(origin: &Waypoint, b: Point) -> Self {
        Self {
            a: origin.point,
            b,
            is_previous: origin.is_previous,
            visited_spaces: origin.visited_spaces.clone(),
            final_state: origin.final_state.clone(),
        }
    }

    pub fn line(&self) -> Line {
        Line::new(self.a, self.b)
    }

    pub fn length(&self) -> f64 {
        self.a.distance(self.b)
    }

    pub fn opacity(&self) -> f32 {
        opacity_for(self.is_previous)
    }

    /// The same ray with both endpoints snapped to the token's centre line.
    pub fn centered(&self, snapper: &Snapper<'_>) -> Self {
        Self {
            a: snapper.snap(self.a),
            b: snapper.snap(self.b),
            ..self.clone()
        }
    }
}

/// Build one ray per consecutive pair of waypoints, with `live_destination`
/// appended as a final implicit waypoint.
///
/// N waypoints yield N-1 rays, or N with a live destination.
pub fn build_segments(waypoints: &[Waypoint], live_destination: Option<Point>) -> Vec<Ray> {
    let mut rays: Vec<Ray> = waypoints
        .windows(2)
        .map(|pair| Ray::from_origin(&pair[0], pair[1].point))
        .collect();
    if let (Some(destination), Some(last)) = (live_destination, waypoints.last()) {
        rays.push(Ray::from_origin(last, destination));
    }
    rays
}

/// Upper bound on sample points taken along a single ray.
pub const MAX_HIGHLIGHT_STEPS: usize = 4096;

/// Points along `ray` at which the grid should be highlighted, one per cell
/// crossed. Empty on gridless scenes and on grids without a usable cell size.
/// Rays longer than [`MAX_HIGHLIGHT_STEPS`] cells are sampled that many times.
pub fn highlight_positions(ray: &Ray, grid: &dyn GridGeometry) -> Vec<Point> {
    let size = grid.size();
    if grid.is_gridless() || !size.is_finite() || size <= 0.0 {
        return Vec::new();
    }
    let cells = (ray.length() / size).ceil();
    if !cells.is_finite() {
        return Vec::new();
    }
    let steps = (cells.max(0.0) as usize).min(MAX_HIGHLIGHT_STEPS);
    let mut positions: Vec<Point> = Vec::with_capacity(steps + 1);
    let mut last_cell: Option<GridCell> = None;
    for i in 0..=steps {
        let t = if steps == 0 { 1.0 } else { i as f64 / steps as f64 };
        let position = ray.a.lerp(ray.b, t);
        let cell = grid.cell_at(position);
        if last_cell != Some(cell) {
            positions.push(position);
            last_cell = Some(cell);
        }
    }
    positions
}

/// Opacity multipliers applied when drawing a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacityMultipliers {
    pub line: f32,
    pub highlight: f32,
}

impl Default for OpacityMultipliers {
    fn default() -> Self {
        Self::uniform(PENDING_OPACITY)
    }
}

impl OpacityMultipliers {
    pub fn uniform(value: f32) -> Self {
        Self {
            line: value,
            highlight: value,
        }
    }
}

/// Colours used for drag-ruler segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentStyle {
    pub line_color: Color,
    pub highlight_color: Color,
}

impl Default for SegmentStyle {
    fn default() -> Self {
        Self {
            line_color: Color::from_rgba8(255, 255, 255, 255),
            highlight_color: Color::from_rgba8(0, 153, 255, 128),
        }
    }
}

/// Host per-segment rendering object.
pub trait RulerSegment {
    /// Position of this segment in the ruler, 0 for the first.
    fn segment_index(&self) -> usize;

    fn ray(&self) -> &Ray;

    fn set_ray(&mut self, ray: Ray);

    fn opacity(&self) -> OpacityMultipliers;

    fn set_opacity(&mut self, opacity: OpacityMultipliers);

    /// Compute derived properties (distance, label) for the segment.
    fn add_properties(&mut self);

    /// Draw the segment's connecting line.
    fn draw_line(&mut self);

    /// Highlight the grid at `position`.
    fn highlight_position(&mut self, position: Point);

    /// Drawing primitive: stroke a line.
    fn stroke_line(&mut self, line: Line, color: Color);

    /// Drawing primitive: fill a grid cell.
    fn fill_cell(&mut self, cell: GridCell, color: Color);
}

/// What a drag-aware segment needs to know about its ruler.
#[derive(Debug, Clone, Copy)]
pub struct SegmentContext<'a> {
    /// Waypoints of the active session, indexed by segment.
    pub waypoints: &'a [Waypoint],
    /// Snapping for the dragged token, or `None` if it no longer resolves.
    pub snapper: Option<Snapper<'a>>,
    pub style: &'a SegmentStyle,
}

/// Decorates a host segment with drag-ruler centering, opacity and
/// token-shaped highlighting. Without a context it only delegates.
#[derive(Debug)]
pub struct DragSegment<'a, S> {
    inner: S,
    context: Option<SegmentContext<'a>>,
}

impl<'a, S: RulerSegment> DragSegment<'a, S> {
    pub fn new(inner: S, context: Option<SegmentContext<'a>>) -> Self {
        Self { inner, context }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: RulerSegment> RulerSegment for DragSegment<'_, S> {
    fn segment_index(&self) -> usize {
        self.inner.segment_index()
    }

    fn ray(&self) -> &Ray {
        self.inner.ray()
    }

    fn set_ray(&mut self, ray: Ray) {
        self.inner.set_ray(ray);
    }

    fn opacity(&self) -> OpacityMultipliers {
        self.inner.opacity()
    }

    fn set_opacity(&mut self, opacity: OpacityMultipliers) {
        self.inner.set_opacity(opacity);
    }

    fn add_properties(&mut self) {
        let Some(context) = self.context else {
            self.inner.add_properties();
            return;
        };

        let mut ray = match &context.snapper {
            Some(snapper) => self.inner.ray().centered(snapper),
            None => self.inner.ray().clone(),
        };
        if let Some(origin) = context.waypoints.get(self.inner.segment_index()) {
            ray.is_previous = origin.is_previous;
            ray.visited_spaces = origin.visited_spaces.clone();
            ray.final_state = origin.final_state.clone();
        }
        let opacity = OpacityMultipliers::uniform(ray.opacity());
        self.inner.set_ray(ray);
        self.inner.set_opacity(opacity);
        // Derived properties are measured on the centred ray.
        self.inner.add_properties();
    }

    fn draw_line(&mut self) {
        let Some(context) = self.context else {
            self.inner.draw_line();
            return;
        };
        let color = with_opacity(context.style.line_color, self.inner.opacity().line);
        let line = self.inner.ray().line();
        self.inner.stroke_line(line, color);
    }

    fn highlight_position(&mut self, position: Point) {
        let Some(SegmentContext { snapper: Some(snapper), style, .. }) = self.context else {
            self.inner.highlight_position(position);
            return;
        };
        let color = with_opacity(style.highlight_color, self.inner.opacity().highlight);
        for cell in snapper.highlight_area(position) {
            self.inner.fill_cell(cell, color);
        }
    }

    fn stroke_line(&mut self, line: Line, color: Color) {
        self.inner.stroke_line(line, color);
    }

    fn fill_cell(&mut self, cell: GridCell, color: Color) {
        self.inner.fill_cell(cell, color);
    }
}

/// A recorded drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Line { line: Line, color: Color },
    Cell { cell: GridCell, color: Color },
}

/// Reference host segment that records what it draws.
#[derive(Debug, Clone)]
pub struct RecordingSegment {
    index: usize,
    ray: Ray,
    opacity: OpacityMultipliers,
    cell_size: f64,
    /// Length of the ray, filled by `add_properties`.
    pub distance: f64,
    pub line_color: Color,
    pub highlight_color: Color,
    pub commands: Vec<DrawCommand>,
}

impl RecordingSegment {
    pub fn new(index: usize, ray: Ray, cell_size: f64) -> Self {
        Self {
            index,
            ray,
            opacity: OpacityMultipliers::default(),
            cell_size,
            distance: 0.0,
            line_color: Color::from_rgba8(0, 0, 0, 255),
            highlight_color: Color::from_rgba8(255, 255, 0, 96),
            commands: Vec::new(),
        }
    }

    /// Cells filled so far, in draw order.
    pub fn filled_cells(&self) -> Vec<GridCell> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Cell { cell, .. } => Some(*cell),
                DrawCommand::Line { .. } => None,
            })
            .collect()
    }
}

impl RulerSegment for RecordingSegment {
    fn segment_index(&self) -> usize {
        self.index
    }

    fn ray(&self) -> &Ray {
        &self.ray
    }

    fn set_ray(&mut self, ray: Ray) {
        self.ray = ray;
    }

    fn opacity(&self) -> OpacityMultipliers {
        self.opacity
    }

    fn set_opacity(&mut self, opacity: OpacityMultipliers) {
        self.opacity = opacity;
    }

    fn add_properties(&mut self) {
        self.distance = self.ray.length();
    }

    fn draw_line(&mut self) {
        let color = with_opacity(self.line_color, self.opacity.line);
        let line = self.ray.line();
        self.stroke_line(line, color);
    }

    fn highlight_position(&mut self, position: Point) {
        let cell = GridCell::new(
            (position.y / self.cell_size).floor() as i32,
            (position.x / self.cell_size).floor() as i32,
        );
        let color = with_opacity(self.highlight_color, self.opacity.highlight);
        self.fill_cell(cell, color);
    }

    fn stroke_line(&mut self, line: Line, color: Color) {
        self.commands.push(DrawCommand::Line { line, color });
    }

    fn fill_cell(&mut self, cell: GridCell, color: Color) {
        self.commands.push(DrawCommand::Cell { cell, color });
    }
}
