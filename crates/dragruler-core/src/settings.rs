//! User-facing drag ruler settings.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Drag ruler options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DragRulerSettings {
    /// Whether a GM's drag ruler is shown to players.
    #[serde(rename = "showGMRulerToPlayers")]
    pub show_gm_ruler_to_players: bool,
    /// Swap the spacebar (add waypoint) and right-click (delete waypoint) actions.
    pub swap_spacebar_right_click: bool,
}

impl Default for DragRulerSettings {
    fn default() -> Self {
        Self {
            show_gm_ruler_to_players: true,
            swap_spacebar_right_click: false,
        }
    }
}

impl DragRulerSettings {
    /// Parse settings from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Source of the current settings.
pub trait SettingsProvider {
    fn settings(&self) -> DragRulerSettings;
}

impl SettingsProvider for DragRulerSettings {
    fn settings(&self) -> DragRulerSettings {
        *self
    }
}

/// Settings that can be changed while rulers hold a reference to them.
#[derive(Debug, Default)]
pub struct SharedSettings {
    inner: RwLock<DragRulerSettings>,
}

impl SharedSettings {
    pub fn new(settings: DragRulerSettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn set(&self, settings: DragRulerSettings) {
        match self.inner.write() {
            Ok(mut inner) => *inner = settings,
            Err(e) => log::error!("Settings lock poisoned: {}", e),
        }
    }
}

impl SettingsProvider for SharedSettings {
    fn settings(&self) -> DragRulerSettings {
        self.inner.read().map(|s| *s).unwrap_or_default()
    }
}
