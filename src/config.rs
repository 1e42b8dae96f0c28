//! Layout strategy configuration.
//!
//! Strategies can be described in JSON (or any serde format) and turned into
//! a [`LayoutStrategy`] at runtime:
//!
//! ```rust
//! use geolayer::LayoutConfig;
//!
//! let local: LayoutConfig = serde_json::from_str(r#"{"strategy": "local", "tile_cols": 512, "tile_rows": 256}"#)?;
//! let global: LayoutConfig = serde_json::from_str(r#"{"strategy": "global", "zoom": 12}"#)?;
//! let _strategy = global.build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LayerError, Result};
use crate::strategy::{GlobalLayout, LayoutStrategy, LocalLayout, ZoomPolicy, DEFAULT_TILE_SIZE, MAX_ZOOM};

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

/// Serialisable description of a layout strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LayoutConfig {
    /// Native-resolution grid. `tile_cols`/`tile_rows` override `tile_size`
    /// only when both are given.
    Local {
        #[serde(default = "default_tile_size")]
        tile_size: u32,
        #[serde(default)]
        tile_cols: Option<u32>,
        #[serde(default)]
        tile_rows: Option<u32>,
    },
    /// Global power-of-two pyramid; zoom inferred when absent.
    Global {
        #[serde(default)]
        zoom: Option<u32>,
        #[serde(default = "default_tile_size")]
        tile_size: u32,
        #[serde(default)]
        zoom_policy: ZoomPolicy,
    },
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig::Local {
            tile_size: DEFAULT_TILE_SIZE,
            tile_cols: None,
            tile_rows: None,
        }
    }
}

impl LayoutConfig {
    /// Parse a JSON description.
    ///
    /// # Errors
    /// Returns [`LayerError::Json`] for malformed JSON or an unknown strategy.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the described strategy.
    ///
    /// # Errors
    /// Returns [`LayerError::Configuration`] for zero tile dimensions or a zoom
    /// beyond the deepest supported level.
    pub fn build(&self) -> Result<Box<dyn LayoutStrategy>> {
        match *self {
            LayoutConfig::Local { tile_size, tile_cols, tile_rows } => {
                let layout = match (tile_cols, tile_rows) {
                    (Some(cols), Some(rows)) => LocalLayout::new().with_tile_dims(cols, rows),
                    (None, None) => LocalLayout::new().with_tile_size(tile_size),
                    (cols, rows) => {
                        warn!(?cols, ?rows, tile_size, "Only one of tile_cols/tile_rows set, using tile_size");
                        LocalLayout::new().with_tile_size(tile_size)
                    }
                };
                if layout.tile_cols() == 0 || layout.tile_rows() == 0 {
                    return Err(LayerError::Configuration(
                        "local layout tile dimensions must be positive".to_string(),
                    ));
                }
                Ok(Box::new(layout))
            }
            LayoutConfig::Global { zoom, tile_size, zoom_policy } => {
                if tile_size == 0 {
                    return Err(LayerError::Configuration(
                        "global layout tile size must be positive".to_string(),
                    ));
                }
                let mut layout = GlobalLayout::new()
                    .with_tile_size(tile_size)
                    .with_zoom_policy(zoom_policy);
                if let Some(zoom) = zoom {
                    if zoom > MAX_ZOOM {
                        return Err(LayerError::Configuration(format!(
                            "zoom {zoom} exceeds maximum {MAX_ZOOM}"
                        )));
                    }
                    layout = layout.with_zoom(zoom);
                }
                Ok(Box::new(layout))
            }
        }
    }
}
