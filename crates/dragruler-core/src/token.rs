//! Tokens, their grid footprints, and the registry used to look them up.

use crate::grid::GridCell;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Unique identifier for a token.
pub type TokenId = Uuid;

/// Width and height of a token in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenFootprint {
    pub width: f64,
    pub height: f64,
}

impl Default for TokenFootprint {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl TokenFootprint {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Number of whole cells spanned horizontally. Tokens smaller than a cell occupy one.
    pub fn cells_wide(&self) -> u32 {
        whole_cells(self.width)
    }

    /// Number of whole cells spanned vertically.
    pub fn cells_high(&self) -> u32 {
        whole_cells(self.height)
    }
}

fn whole_cells(units: f64) -> u32 {
    if units.is_finite() && units >= 1.0 {
        units.round() as u32
    } else {
        1
    }
}

/// A token on the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    /// Visual centre of the token in world coordinates.
    pub center: Point,
    #[serde(flatten)]
    pub footprint: TokenFootprint,
}

impl Token {
    pub fn new(center: Point, footprint: TokenFootprint) -> Self {
        Self {
            id: Uuid::new_v4(),
            center,
            footprint,
        }
    }

    /// The cells this token covers, relative to its top-left cell.
    pub fn shape(&self) -> TokenShape {
        TokenShape::for_footprint(self.footprint)
    }
}

/// Set of grid cells a token occupies, as offsets from its top-left cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenShape {
    cells: Vec<GridCell>,
}

impl TokenShape {
    /// A shape covering no cells.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The rectangular block of cells covered by `footprint`.
    pub fn for_footprint(footprint: TokenFootprint) -> Self {
        let wide = footprint.cells_wide() as i32;
        let high = footprint.cells_high() as i32;
        let cells = (0..high)
            .flat_map(|row| (0..wide).map(move |col| GridCell::new(row, col)))
            .collect();
        Self { cells }
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }
}

/// Read-only lookup of live tokens by id.
pub trait TokenRegistry {
    /// The token with `id`, or `None` if it no longer exists.
    fn get(&self, id: TokenId) -> Option<Token>;
}

/// In-memory token registry for tests and the replay tool.
#[derive(Debug, Default)]
pub struct MemoryTokenRegistry {
    tokens: RwLock<HashMap<TokenId, Token>>,
}

impl MemoryTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a token.
    pub fn insert(&self, token: Token) {
        match self.tokens.write() {
            Ok(mut tokens) => {
                tokens.insert(token.id, token);
            }
            Err(e) => log::error!("Token registry lock poisoned: {}", e),
        }
    }

    /// Remove a token, returning it if it was present.
    pub fn remove(&self, id: TokenId) -> Option<Token> {
        self.tokens.write().ok()?.remove(&id)
    }

    /// Move a token's centre. Returns false if the token is unknown.
    pub fn move_to(&self, id: TokenId, center: Point) -> bool {
        let Ok(mut tokens) = self.tokens.write() else {
            return false;
        };
        match tokens.get_mut(&id) {
            Some(token) => {
                token.center = center;
                true
            }
            None => false,
        }
    }
}

impl TokenRegistry for MemoryTokenRegistry {
    fn get(&self, id: TokenId) -> Option<Token> {
        self.tokens.read().ok()?.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_for_footprint() {
        let shape = TokenShape::for_footprint(TokenFootprint::new(2.0, 3.0));
        assert_eq!(shape.len(), 6);
        assert!(shape.cells().contains(&GridCell::new(2, 1)));
        assert!(!shape.cells().contains(&GridCell::new(1, 2)));
    }

    #[test]
    fn test_small_tokens_cover_one_cell() {
        let footprint = TokenFootprint::new(0.5, 0.25);
        assert_eq!(footprint.cells_wide(), 1);
        assert_eq!(footprint.cells_high(), 1);
        assert_eq!(TokenShape::for_footprint(footprint).len(), 1);
    }

    #[test]
    fn test_registry_move_and_remove() {
        let registry = MemoryTokenRegistry::new();
        let token = Token::new(Point::new(5.0, 5.0), TokenFootprint::default());
        let id = token.id;
        registry.insert(token);

        assert!(registry.move_to(id, Point::new(15.0, 5.0)));
        assert_eq!(registry.get(id).unwrap().center, Point::new(15.0, 5.0));

        assert!(registry.remove(id).is_some());
        assert!(registry.get(id).is_none());
        assert!(!registry.move_to(id, Point::ZERO));
    }
}
