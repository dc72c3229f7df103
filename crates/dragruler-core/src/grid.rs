//! Grid geometry used to snap destinations and highlight covered cells.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default grid size in world pixels.
pub const DEFAULT_GRID_SIZE: f64 = 100.0;

/// A single grid cell, addressed by row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub row: i32,
    pub col: i32,
}

impl GridCell {
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Offset this cell by another cell used as a relative (row, col) delta.
    pub fn offset(self, delta: GridCell) -> Self {
        Self::new(self.row + delta.row, self.col + delta.col)
    }
}

/// Kind of grid laid over the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridKind {
    /// No grid: nothing snaps and nothing is highlighted.
    Gridless,
    /// Square cells of `size` pixels.
    #[default]
    Square,
}

/// Grid geometry provider.
///
/// The ruler never reaches for a global canvas; everything that needs to
/// know about cells goes through this trait.
pub trait GridGeometry {
    /// The kind of grid.
    fn kind(&self) -> GridKind;

    /// Edge length of a cell in world pixels.
    fn size(&self) -> f64;

    /// The cell containing `point`.
    fn cell_at(&self, point: Point) -> GridCell;

    /// World-space centre of `cell`.
    fn cell_center(&self, cell: GridCell) -> Point;

    /// Whether the grid has cells at all.
    fn is_gridless(&self) -> bool {
        self.kind() == GridKind::Gridless
    }

    /// Centre of the cell containing `point`. Identity on gridless grids.
    fn center_of(&self, point: Point) -> Point {
        if self.is_gridless() {
            return point;
        }
        self.cell_center(self.cell_at(point))
    }
}

/// Grid configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GridError {
    #[error("Grid size must be finite and positive, got {0}")]
    InvalidSize(f64),
}

/// Grid configuration, loadable from JSON. The cell size is validated on load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridConfig")]
pub struct Grid {
    pub kind: GridKind,
    pub size: f64,
}

/// Unvalidated grid as it appears in JSON.
#[derive(Deserialize)]
#[serde(default)]
struct GridConfig {
    kind: GridKind,
    size: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        let grid = Grid::default();
        Self {
            kind: grid.kind,
            size: grid.size,
        }
    }
}

impl TryFrom<GridConfig> for Grid {
    type Error = GridError;

    fn try_from(config: GridConfig) -> Result<Self, Self::Error> {
        let grid = Grid {
            kind: config.kind,
            size: config.size,
        };
        grid.validate()?;
        Ok(grid)
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            kind: GridKind::Square,
            size: DEFAULT_GRID_SIZE,
        }
    }
}

impl Grid {
    /// A square grid with the given cell size.
    pub fn square(size: f64) -> Self {
        Self {
            kind: GridKind::Square,
            size,
        }
    }

    /// Check that the cell size is usable.
    pub fn validate(&self) -> Result<(), GridError> {
        if self.size.is_finite() && self.size > 0.0 {
            Ok(())
        } else {
            Err(GridError::InvalidSize(self.size))
        }
    }

    /// A gridless scene.
    pub fn gridless() -> Self {
        Self {
            kind: GridKind::Gridless,
            size: DEFAULT_GRID_SIZE,
        }
    }
}

impl GridGeometry for Grid {
    fn kind(&self) -> GridKind {
        self.kind
    }

    fn size(&self) -> f64 {
        self.size
    }

    fn cell_at(&self, point: Point) -> GridCell {
        GridCell::new(
            (point.y / self.size).floor() as i32,
            (point.x / self.size).floor() as i32,
        )
    }

    fn cell_center(&self, cell: GridCell) -> Point {
        Point::new(
            (cell.col as f64 + 0.5) * self.size,
            (cell.row as f64 + 0.5) * self.size,
        )
    }
}
