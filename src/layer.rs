//! A layer: metadata plus the tiles it describes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geo::{BoundingRect, Intersects};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bounds::{Bounds, KeyBounds, LayerBounds};
use crate::error::{LayerError, Result};
use crate::geometry::Extent;
use crate::key::{truncate_instant, KeyType, LayerKey, SpatialKey};
use crate::metadata::Metadata;
use crate::raster::Tile;

/// Whether a layer is addressed by space alone or by space and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LayerType {
    Spatial,
    Spacetime,
}

impl From<KeyType> for LayerType {
    fn from(kt: KeyType) -> Self {
        match kt {
            KeyType::Spatial => LayerType::Spatial,
            KeyType::SpaceTime => LayerType::Spacetime,
        }
    }
}

/// Filter for [`TiledLayer::query`].
///
/// An unset extent or geometry matches every tile. A geometry keeps only the
/// tiles whose extent it touches, so concave or multi-part regions skip the
/// tiles inside their bounding box but outside their shape. Both filters
/// apply when both are set.
///
/// An empty interval list matches every instant; otherwise a space-time key
/// must fall inside one of the closed intervals, compared at millisecond
/// precision. Intervals are ignored for spatial layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerQuery {
    pub extent: Option<Extent>,
    pub geometry: Option<Geometry<f64>>,
    pub time_intervals: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl LayerQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Keep tiles touched by `geometry`, in the layer's CRS.
    #[must_use]
    pub fn with_geometry(mut self, geometry: impl Into<Geometry<f64>>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    /// Add a closed interval; reversed endpoints are swapped.
    #[must_use]
    pub fn with_time_interval(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.time_intervals.push((start.min(end), start.max(end)));
        self
    }

    fn matches_instant(&self, instant: Option<DateTime<Utc>>) -> bool {
        match instant {
            None => true,
            Some(t) => {
                self.time_intervals.is_empty()
                    || self
                        .time_intervals
                        .iter()
                        .any(|(start, end)| truncate_instant(*start) <= t && t <= truncate_instant(*end))
            }
        }
    }
}

/// Tiles keyed by their layout position, with the metadata that places them.
#[derive(Debug, Clone, PartialEq)]
pub struct TiledLayer {
    metadata: Metadata,
    tiles: BTreeMap<LayerKey, Tile>,
}

impl TiledLayer {
    /// # Errors
    /// Returns [`LayerError::InvalidBounds`] if a key is of the wrong variant,
    /// lies outside the metadata bounds or addresses no tile of the layout.
    pub fn new(metadata: Metadata, tiles: BTreeMap<LayerKey, Tile>) -> Result<Self> {
        if let Some(key) = tiles.keys().find(|k| !metadata.bounds().contains(k)) {
            return Err(LayerError::InvalidBounds(format!(
                "tile key {key} lies outside the layer bounds"
            )));
        }
        let grid = metadata.layout_definition().tile_layout();
        if let Some(key) = tiles.keys().find(|k| !grid.contains_key(&k.spatial_key())) {
            return Err(LayerError::InvalidBounds(format!(
                "tile key {key} lies outside the {}x{} layout",
                grid.layout_cols(),
                grid.layout_rows()
            )));
        }
        Ok(Self { metadata, tiles })
    }

    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[inline]
    #[must_use]
    pub fn tiles(&self) -> &BTreeMap<LayerKey, Tile> {
        &self.tiles
    }

    #[must_use]
    pub fn get(&self, key: &LayerKey) -> Option<&Tile> {
        self.tiles.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &LayerKey> {
        self.tiles.keys()
    }

    #[must_use]
    pub fn layer_type(&self) -> LayerType {
        self.metadata.key_type().into()
    }

    /// The tile at `(col, row)`, and `instant` for space-time layers.
    ///
    /// `None` when the key lies outside the layer bounds, no tile was
    /// produced there, or the instant is missing for a space-time layer.
    #[must_use]
    pub fn read_value(&self, col: u32, row: u32, instant: Option<DateTime<Utc>>) -> Option<&Tile> {
        let spatial = SpatialKey::new(col, row);
        let key = match (self.metadata.key_type(), instant) {
            (KeyType::Spatial, _) => LayerKey::Spatial(spatial),
            (KeyType::SpaceTime, Some(t)) => LayerKey::SpaceTime(spatial.at(t)),
            (KeyType::SpaceTime, None) => return None,
        };
        if !self.metadata.bounds().contains(&key) {
            return None;
        }
        self.tiles.get(&key)
    }

    /// Sub-layer of the tiles matching `query`, with bounds narrowed to them.
    #[must_use]
    pub fn query(&self, query: &LayerQuery) -> TiledLayer {
        let layout = self.metadata.layout_definition();
        let geometry_extent = match &query.geometry {
            Some(geometry) => match geometry.bounding_rect().and_then(|r| Extent::from_rect(&r).ok()) {
                Some(extent) => Some(extent),
                None => return self.restricted(BTreeMap::new()),
            },
            None => None,
        };

        // Key range every spatial filter agrees on
        let mut window: Option<KeyBounds<SpatialKey>> = None;
        for extent in query.extent.iter().chain(geometry_extent.iter()) {
            let Some(kb) = layout.key_bounds_for(extent) else {
                return self.restricted(BTreeMap::new());
            };
            window = match window {
                None => Some(kb),
                Some(w) => match w.intersection(&kb) {
                    Some(both) => Some(both),
                    None => return self.restricted(BTreeMap::new()),
                },
            };
        }

        let tiles: BTreeMap<LayerKey, Tile> = self
            .tiles
            .iter()
            .filter(|(key, _)| window.map_or(true, |w| w.contains(&key.spatial_key())))
            .filter(|(key, _)| {
                query.geometry.as_ref().map_or(true, |geometry| {
                    geometry.intersects(&layout.key_extent(&key.spatial_key()).to_polygon())
                })
            })
            .filter(|(key, _)| query.matches_instant(key.instant()))
            .map(|(key, tile)| (*key, tile.clone()))
            .collect();
        debug!(matched = tiles.len(), total = self.tiles.len(), "Queried layer");
        self.restricted(tiles)
    }

    fn restricted(&self, tiles: BTreeMap<LayerKey, Tile>) -> TiledLayer {
        let bounds = tight_bounds(self.metadata.key_type(), tiles.keys());
        TiledLayer {
            metadata: Metadata::new(
                bounds,
                self.metadata.crs().clone(),
                self.metadata.cell_type(),
                *self.metadata.extent(),
                *self.metadata.layout_definition(),
                self.metadata.zoom(),
            ),
            tiles,
        }
    }
}

/// Smallest bounds of `key_type` holding every key; keys of the other variant are skipped.
pub(crate) fn tight_bounds<'a, I>(key_type: KeyType, keys: I) -> LayerBounds
where
    I: IntoIterator<Item = &'a LayerKey>,
{
    match key_type {
        KeyType::Spatial => LayerBounds::Spatial(Bounds::from_keys(keys.into_iter().filter_map(|k| match k {
            LayerKey::Spatial(k) => Some(*k),
            LayerKey::SpaceTime(_) => None,
        }))),
        KeyType::SpaceTime => LayerBounds::SpaceTime(Bounds::from_keys(keys.into_iter().filter_map(|k| match k {
            LayerKey::SpaceTime(k) => Some(*k),
            LayerKey::Spatial(_) => None,
        }))),
    }
}
