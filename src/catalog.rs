//! In-memory store of tiled layers.
//!
//! Layers are addressed by name and zoom. Each stored layer keeps its
//! metadata as a JSON document, the form a persistent backend would hold.
//! Bounds checks for single-tile reads go through a small LRU cache so
//! repeated reads do not re-parse that document.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bounds::LayerBounds;
use crate::error::{LayerError, Result};
use crate::key::{KeyType, LayerKey, SpatialKey};
use crate::layer::{LayerQuery, TiledLayer};
use crate::metadata::Metadata;
use crate::raster::Tile;

/// Number of layers whose bounds are memoised.
pub const DEFAULT_BOUNDS_CACHE_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(127);

/// Name and zoom of a stored layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId {
    pub name: String,
    pub zoom: u32,
}

impl LayerId {
    #[must_use]
    pub fn new(name: impl Into<String>, zoom: u32) -> Self {
        Self { name: name.into(), zoom }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.zoom)
    }
}

struct StoredLayer {
    metadata_json: String,
    layer: Arc<TiledLayer>,
}

/// Thread-safe layer store.
///
/// # Example
///
/// ```rust,ignore
/// let catalog = Catalog::new();
/// let id = catalog.write("elevation", layer)?;
/// let md = catalog.read_layer_metadata(&id)?;
/// let tile = catalog.read_value(&id, 3, 5, None)?;
/// ```
pub struct Catalog {
    layers: RwLock<AHashMap<LayerId, StoredLayer>>,
    bounds_cache: Mutex<LruCache<LayerId, LayerBounds>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_cache_size(DEFAULT_BOUNDS_CACHE_SIZE)
    }
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cache_size(size: NonZeroUsize) -> Self {
        Self {
            layers: RwLock::new(AHashMap::new()),
            bounds_cache: Mutex::new(LruCache::new(size)),
        }
    }

    /// Store `layer` under `name` at its metadata zoom (0 for local layouts),
    /// replacing any layer already there.
    ///
    /// # Errors
    /// Returns [`LayerError::Json`] if the metadata cannot be serialised.
    pub fn write(&self, name: &str, layer: TiledLayer) -> Result<LayerId> {
        let id = LayerId::new(name, layer.metadata().zoom().unwrap_or(0));
        let metadata_json = layer.metadata().to_json()?;
        let tiles = layer.len();
        {
            let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
            layers.insert(id.clone(), StoredLayer { metadata_json, layer: Arc::new(layer) });
        }
        self.bounds_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(&id);
        debug!(layer = %id, tiles, "Wrote layer");
        Ok(id)
    }

    /// Every stored layer, sorted by name then zoom.
    #[must_use]
    pub fn layer_ids(&self) -> Vec<LayerId> {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<LayerId> = layers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove a layer.
    ///
    /// # Errors
    /// Returns [`LayerError::LayerNotFound`] for an unknown layer.
    pub fn delete(&self, id: &LayerId) -> Result<()> {
        let removed = self
            .layers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        self.bounds_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(id);
        removed
            .map(|_| ())
            .ok_or_else(|| LayerError::LayerNotFound(id.to_string()))
    }

    /// Metadata parsed back from the stored JSON document.
    ///
    /// # Errors
    /// [`LayerError::LayerNotFound`] for an unknown layer, [`LayerError::Json`]
    /// if the stored document does not parse.
    pub fn read_layer_metadata(&self, id: &LayerId) -> Result<Metadata> {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        let stored = layers
            .get(id)
            .ok_or_else(|| LayerError::LayerNotFound(id.to_string()))?;
        Metadata::from_json(&stored.metadata_json)
    }

    /// The whole layer.
    ///
    /// # Errors
    /// Returns [`LayerError::LayerNotFound`] for an unknown layer.
    pub fn read(&self, id: &LayerId) -> Result<Arc<TiledLayer>> {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        layers
            .get(id)
            .map(|stored| Arc::clone(&stored.layer))
            .ok_or_else(|| LayerError::LayerNotFound(id.to_string()))
    }

    fn bounds(&self, id: &LayerId) -> Result<LayerBounds> {
        if let Some(bounds) = self
            .bounds_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            trace!(layer = %id, "Bounds cache hit");
            return Ok(*bounds);
        }
        let bounds = *self.read_layer_metadata(id)?.bounds();
        self.bounds_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(id.clone(), bounds);
        trace!(layer = %id, "Bounds cache miss");
        Ok(bounds)
    }

    /// A single tile, checked against the layer bounds first.
    ///
    /// `Ok(None)` when `(col, row)` and `instant` fall outside the bounds or
    /// no tile was stored there. Space-time layers need an instant.
    ///
    /// # Errors
    /// Returns [`LayerError::LayerNotFound`] for an unknown layer.
    pub fn read_value(
        &self,
        id: &LayerId,
        col: u32,
        row: u32,
        instant: Option<DateTime<Utc>>,
    ) -> Result<Option<Tile>> {
        let bounds = self.bounds(id)?;
        let spatial = SpatialKey::new(col, row);
        let key = match (bounds.key_type(), instant) {
            (KeyType::Spatial, _) => LayerKey::Spatial(spatial),
            (KeyType::SpaceTime, Some(t)) => LayerKey::SpaceTime(spatial.at(t)),
            (KeyType::SpaceTime, None) => return Ok(None),
        };
        if !bounds.contains(&key) {
            return Ok(None);
        }
        Ok(self.read(id)?.get(&key).cloned())
    }

    /// Tiles of a layer matching `query`.
    ///
    /// # Errors
    /// Returns [`LayerError::LayerNotFound`] for an unknown layer.
    pub fn query(&self, id: &LayerId, query: &LayerQuery) -> Result<TiledLayer> {
        Ok(self.read(id)?.query(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_type::{CellType, DataType};
    use crate::geometry::{Crs, Extent, ProjectedExtent};
    use crate::raster::Raster;
    use crate::strategy::{GlobalLayout, LocalLayout};
    use crate::tiler::{tile_to_layout, TilerOptions};
    use ndarray::Array3;
    use std::thread;

    fn local_layer() -> TiledLayer {
        let tile = Tile::new(Array3::from_elem((1, 8, 8), 4.0), CellType::raw(DataType::UInt8)).unwrap();
        let raster = Raster::new(
            tile,
            ProjectedExtent::new(Extent::new(0.0, 0.0, 80.0, 80.0).unwrap(), Crs::Epsg(32633)),
        )
        .unwrap();
        tile_to_layout(&[raster], &LocalLayout::new().with_tile_size(4), &TilerOptions::default()).unwrap()
    }

    #[test]
    fn test_write_and_list() {
        let catalog = Catalog::new();
        let id = catalog.write("dem", local_layer()).unwrap();
        assert_eq!(id, LayerId::new("dem", 0));
        catalog.write("aspect", local_layer()).unwrap();
        assert_eq!(catalog.layer_ids(), vec![LayerId::new("aspect", 0), LayerId::new("dem", 0)]);
    }

    #[test]
    fn test_global_layer_stored_at_its_zoom() {
        let tile = Tile::new(Array3::from_elem((1, 4, 4), 1.0), CellType::raw(DataType::UInt8)).unwrap();
        let raster = Raster::new(
            tile,
            ProjectedExtent::new(Extent::new(0.0, 0.0, 1000.0, 1000.0).unwrap(), Crs::web_mercator()),
        )
        .unwrap();
        let layer = tile_to_layout(&[raster], &GlobalLayout::new().with_zoom(5), &TilerOptions::default()).unwrap();
        let catalog = Catalog::new();
        assert_eq!(catalog.write("osm", layer).unwrap(), LayerId::new("osm", 5));
    }

    #[test]
    fn test_metadata_roundtrips_through_json() {
        let catalog = Catalog::new();
        let layer = local_layer();
        let expected = layer.metadata().clone();
        let id = catalog.write("dem", layer).unwrap();
        assert_eq!(catalog.read_layer_metadata(&id).unwrap(), expected);
    }

    #[test]
    fn test_sub_millisecond_instant_survives_storage() {
        use crate::geometry::TemporalProjectedExtent;
        use chrono::TimeZone;

        let instant = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let tile = Tile::new(Array3::from_elem((1, 4, 4), 2.0), CellType::raw(DataType::UInt8)).unwrap();
        let raster = Raster::new(
            tile,
            TemporalProjectedExtent::new(Extent::new(0.0, 0.0, 40.0, 40.0).unwrap(), Crs::Epsg(32633), instant),
        )
        .unwrap();
        let layer = tile_to_layout(&[raster], &LocalLayout::new().with_tile_size(4), &TilerOptions::default()).unwrap();
        assert!(layer.read_value(0, 0, Some(instant)).is_some());

        let catalog = Catalog::new();
        let id = catalog.write("ndvi", layer.clone()).unwrap();
        assert_eq!(catalog.read_layer_metadata(&id).unwrap(), *layer.metadata());
        let stored = catalog.read_value(&id, 0, 0, Some(instant)).unwrap();
        assert_eq!(stored.and_then(|t| t.get(0, 0, 0)), Some(2.0));
    }

    #[test]
    fn test_read_value_checks_bounds() {
        let catalog = Catalog::new();
        let id = catalog.write("dem", local_layer()).unwrap();
        let tile = catalog.read_value(&id, 1, 1, None).unwrap().unwrap();
        assert_eq!(tile.get(0, 0, 0), Some(4.0));
        assert!(catalog.read_value(&id, 2, 0, None).unwrap().is_none());
        // Second read is served from the bounds cache
        assert!(catalog.read_value(&id, 0, 0, None).unwrap().is_some());
    }

    #[test]
    fn test_unknown_layer() {
        let catalog = Catalog::new();
        let id = LayerId::new("missing", 3);
        assert!(matches!(catalog.read(&id), Err(LayerError::LayerNotFound(_))));
        assert!(matches!(catalog.read_layer_metadata(&id), Err(LayerError::LayerNotFound(_))));
        assert!(matches!(catalog.read_value(&id, 0, 0, None), Err(LayerError::LayerNotFound(_))));
        assert!(matches!(catalog.delete(&id), Err(LayerError::LayerNotFound(_))));
    }

    #[test]
    fn test_overwrite_invalidates_cached_bounds() {
        let catalog = Catalog::new();
        let id = catalog.write("dem", local_layer()).unwrap();
        assert!(catalog.read_value(&id, 1, 1, None).unwrap().is_some());

        let narrowed = local_layer().query(
            &LayerQuery::new().with_extent(Extent::new(1.0, 41.0, 39.0, 79.0).unwrap()),
        );
        catalog.write("dem", narrowed).unwrap();
        assert!(catalog.read_value(&id, 1, 1, None).unwrap().is_none());
        assert!(catalog.read_value(&id, 0, 0, None).unwrap().is_some());
    }

    #[test]
    fn test_query_and_delete() {
        let catalog = Catalog::new();
        let id = catalog.write("dem", local_layer()).unwrap();
        let sub = catalog
            .query(&id, &LayerQuery::new().with_extent(Extent::new(41.0, 1.0, 79.0, 39.0).unwrap()))
            .unwrap();
        assert_eq!(sub.len(), 1);
        catalog.delete(&id).unwrap();
        assert!(catalog.layer_ids().is_empty());
    }

    #[test]
    fn test_concurrent_readers() {
        let catalog = Arc::new(Catalog::new());
        let id = catalog.write("dem", local_layer()).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let catalog = Arc::clone(&catalog);
                let id = id.clone();
                thread::spawn(move || catalog.read_value(&id, i % 2, 1, None).unwrap().is_some())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
