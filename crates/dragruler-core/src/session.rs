//! Drag session state carried by a ruler.

use crate::token::{Token, TokenId, TokenRegistry};
use kurbo::Vec2;
use serde::{Deserialize, Serialize};

/// Per-ruler drag state: which token is dragged, the pointer-to-token offset
/// captured at drag start, and whether destinations snap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DragSession {
    dragged_token: Option<TokenId>,
    pointer_offset: Vec2,
    snap: bool,
}

impl DragSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate the session. Snapping starts enabled.
    pub fn begin(&mut self, token: TokenId, pointer_offset: Vec2) {
        self.dragged_token = Some(token);
        self.pointer_offset = pointer_offset;
        self.snap = true;
    }

    /// True while a token id is set.
    pub fn is_active(&self) -> bool {
        self.dragged_token.is_some()
    }

    /// Clear the token, offset and snap flag.
    pub fn end(&mut self) {
        *self = Self::default();
    }

    pub fn dragged_token_id(&self) -> Option<TokenId> {
        self.dragged_token
    }

    pub fn pointer_offset(&self) -> Vec2 {
        self.pointer_offset
    }

    pub fn snap_enabled(&self) -> bool {
        self.is_active() && self.snap
    }

    pub fn set_snap(&mut self, snap: bool) {
        self.snap = snap;
    }

    /// Look up the dragged token. `None` if the session is inactive or the
    /// token no longer exists; callers treat that as inactive for geometry.
    pub fn resolve_dragged_token(&self, registry: &dyn TokenRegistry) -> Option<Token> {
        let id = self.dragged_token?;
        let token = registry.get(id);
        if token.is_none() {
            log::warn!("Dragged token {} no longer resolves", id);
        }
        token
    }
}
