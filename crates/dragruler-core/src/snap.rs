//! Token-aware snapping and highlighted-area computation.
//!
//! A token's centre sits on a cell centre along axes where it spans an odd
//! number of cells, and on a grid line along axes where it spans an even
//! number. Snapping shifts the raw point by half a cell on even axes, centres
//! it in the grid, then shifts it back.

use crate::grid::{GridCell, GridGeometry};
use crate::token::{TokenFootprint, TokenShape};
use kurbo::{Point, Vec2};
use std::collections::BTreeSet;

/// Offset between a token's centre and the centre of a representative cell.
///
/// Half a cell along each axis the footprint spans an even number of cells,
/// zero otherwise. Without a footprint the token is treated as 1x1.
pub fn size_offset(footprint: Option<TokenFootprint>, grid: &dyn GridGeometry) -> Vec2 {
    let Some(footprint) = footprint else {
        return Vec2::ZERO;
    };
    let half = grid.size() / 2.0;
    let x = if footprint.cells_wide() % 2 == 0 { half } else { 0.0 };
    let y = if footprint.cells_high() % 2 == 0 { half } else { 0.0 };
    Vec2::new(x, y)
}

/// Snap a raw destination so the token's footprint lines up with the grid.
///
/// Uses the cell-centre rule: cell `(row, col)` centres at `((col + 0.5) * s, (row + 0.5) * s)`,
/// so `(17, 17)` with a 1x1 token on a size-10 grid snaps to `(15, 15)`.
///
/// Idempotent. With no footprint this is plain single-cell centering, and on
/// gridless scenes it returns the point unchanged.
pub fn snap_destination(point: Point, footprint: Option<TokenFootprint>, grid: &dyn GridGeometry) -> Point {
    if grid.is_gridless() {
        return point;
    }
    let offset = size_offset(footprint, grid);
    grid.center_of(point - offset) + offset
}

/// The top-left cell of a token whose centre is at `center`.
pub fn anchor_cell(center: Point, footprint: Option<TokenFootprint>, grid: &dyn GridGeometry) -> GridCell {
    let footprint = footprint.unwrap_or_default();
    let size = grid.size();
    let shift = Vec2::new(
        (footprint.cells_wide() as f64 - 1.0) * size / 2.0,
        (footprint.cells_high() as f64 - 1.0) * size / 2.0,
    );
    grid.cell_at(center - shift)
}

/// Cells covered by `shape` anchored at `anchor`.
pub fn area_for_shape_at(anchor: GridCell, shape: &TokenShape) -> BTreeSet<GridCell> {
    shape.cells().iter().map(|&delta| anchor.offset(delta)).collect()
}

/// Cells a token centred at `center` would cover. Empty on gridless scenes.
pub fn highlight_area(center: Point, footprint: Option<TokenFootprint>, grid: &dyn GridGeometry) -> BTreeSet<GridCell> {
    if grid.is_gridless() {
        return BTreeSet::new();
    }
    let shape = TokenShape::for_footprint(footprint.unwrap_or_default());
    area_for_shape_at(anchor_cell(center, footprint, grid), &shape)
}

/// Snapping bound to one grid and (optionally) one dragged token's footprint.
#[derive(Clone, Copy)]
pub struct Snapper<'a> {
    grid: &'a dyn GridGeometry,
    footprint: Option<TokenFootprint>,
}

impl std::fmt::Debug for Snapper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapper")
            .field("grid_kind", &self.grid.kind())
            .field("grid_size", &self.grid.size())
            .field("footprint", &self.footprint)
            .finish()
    }
}

impl<'a> Snapper<'a> {
    pub fn new(grid: &'a dyn GridGeometry, footprint: Option<TokenFootprint>) -> Self {
        Self { grid, footprint }
    }

    pub fn grid(&self) -> &'a dyn GridGeometry {
        self.grid
    }

    pub fn footprint(&self) -> Option<TokenFootprint> {
        self.footprint
    }

    pub fn snap(&self, point: Point) -> Point {
        snap_destination(point, self.footprint, self.grid)
    }

    pub fn highlight_area(&self, center: Point) -> BTreeSet<GridCell> {
        highlight_area(center, self.footprint, self.grid)
    }
}
