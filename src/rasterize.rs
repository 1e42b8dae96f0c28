//! Burning vector features into cell grids.
//!
//! Each feature carries a [`CellValue`]. Where several features cover one
//! cell the feature with the highest `zindex` wins, and among equal `zindex`
//! values the feature later in the input wins, as if features were painted
//! in order.
//!
//! Polygonal geometries cover a cell when they contain or touch its centre.
//! Points and lines cover every cell whose rectangle they touch, so thin
//! features never vanish between cell centres.
//!
//! # Example
//!
//! ```rust
//! use geolayer::{CellType, DataType, Extent};
//! use geolayer::layout::RasterExtent;
//! use geolayer::rasterize::{rasterize, CellValue, Feature};
//! use geo_types::{Geometry, Rect, coord};
//!
//! let grid = RasterExtent::new(Extent::new(0.0, 0.0, 10.0, 10.0)?, 10, 10)?;
//! let square = Geometry::Rect(Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 5.0, y: 5.0 }));
//! let features = vec![Feature::new(square, CellValue::new(7.0, 1))];
//! let tile = rasterize(&features, &grid, CellType::with_default_no_data(DataType::Int16))?;
//! assert_eq!(tile.get_data(0, 0, 9), Some(7.0));
//! assert_eq!(tile.get_data(0, 9, 0), None);
//! # Ok::<(), geolayer::LayerError>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};

use geo::{BoundingRect, Intersects};
use geo_types::{Geometry, Point, Rect};
use rayon::prelude::*;
use tracing::debug;

use crate::casting::usize_to_u32;
use crate::cell_type::CellType;
use crate::error::{LayerError, Result};
use crate::geometry::{Crs, Extent};
use crate::key::{KeyType, LayerKey, SpatialKey};
use crate::layer::{tight_bounds, TiledLayer};
use crate::layout::{LayoutDefinition, RasterExtent};
use crate::metadata::Metadata;
use crate::raster::Tile;

/// A geometry with attached properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<P> {
    pub geometry: Geometry<f64>,
    pub properties: P,
}

impl<P> Feature<P> {
    #[must_use]
    pub fn new(geometry: Geometry<f64>, properties: P) -> Self {
        Self { geometry, properties }
    }
}

/// Value to burn and its priority.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellValue {
    pub value: f64,
    pub zindex: i32,
}

impl CellValue {
    #[must_use]
    pub fn new(value: f64, zindex: i32) -> Self {
        Self { value, zindex }
    }
}

/// Whether `geometry` covers the cell with centre `center` and rectangle `cell`.
fn covers(geometry: &Geometry<f64>, center: &Point<f64>, cell: &Rect<f64>) -> bool {
    match geometry {
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
            geometry.intersects(center)
        }
        Geometry::Point(_)
        | Geometry::MultiPoint(_)
        | Geometry::Line(_)
        | Geometry::LineString(_)
        | Geometry::MultiLineString(_) => geometry.intersects(cell),
        Geometry::GeometryCollection(collection) => collection.iter().any(|g| covers(g, center, cell)),
    }
}

fn feature_extent<P>(feature: &Feature<P>) -> Option<Extent> {
    feature
        .geometry
        .bounding_rect()
        .and_then(|rect| Extent::from_rect(&rect).ok())
}

/// Burn `features` into band `band` of `tile`, which covers `grid`.
///
/// Returns the number of cells written. Uncovered cells keep their value.
///
/// # Errors
/// Returns [`LayerError::Configuration`] if the tile shape differs from the
/// grid or the band does not exist.
pub fn burn(
    tile: &mut Tile,
    band: usize,
    grid: &RasterExtent,
    features: &[Feature<CellValue>],
) -> Result<usize> {
    let cols = usize_to_u32(tile.cols()).map_err(LayerError::Configuration)?;
    let rows = usize_to_u32(tile.rows()).map_err(LayerError::Configuration)?;
    if cols != grid.cols || rows != grid.rows {
        return Err(LayerError::Configuration(format!(
            "tile is {cols}x{rows} cells but the grid is {}x{}",
            grid.cols, grid.rows
        )));
    }
    if band >= tile.bands() {
        return Err(LayerError::Configuration(format!(
            "band {band} out of range for a {}-band tile",
            tile.bands()
        )));
    }

    // (zindex, input index) of the winning feature per cell
    let width = tile.cols();
    let mut winners: Vec<Option<(i32, usize)>> = vec![None; width * tile.rows()];

    for (index, feature) in features.iter().enumerate() {
        let Some(bbox) = feature_extent(feature) else {
            continue;
        };
        let Some((c0, r0, c1, r1)) = grid.cell_range_for(&bbox) else {
            continue;
        };
        // Features ending on a cell edge still touch the neighbouring cell
        let c0 = c0.saturating_sub(1);
        let r0 = r0.saturating_sub(1);
        let c1 = (c1 + 1).min(grid.cols - 1);
        let r1 = (r1 + 1).min(grid.rows - 1);
        let rank = (feature.properties.zindex, index);

        for row in r0..=r1 {
            for col in c0..=c1 {
                let slot = &mut winners[row as usize * width + col as usize];
                if slot.is_some_and(|current| current > rank) {
                    continue;
                }
                let (x, y) = grid.cell_center(col, row);
                let cell = grid.cell_extent(col, row).to_rect();
                if covers(&feature.geometry, &Point::new(x, y), &cell) {
                    *slot = Some(rank);
                }
            }
        }
    }

    let mut written = 0;
    for (offset, winner) in winners.iter().enumerate() {
        if let Some((_, index)) = winner {
            tile.set(band, offset % width, offset / width, features[*index].properties.value);
            written += 1;
        }
    }
    Ok(written)
}

/// Rasterize `features` into a fresh single-band tile over `grid`.
///
/// Uncovered cells hold the cell type's no-data value, or 0 for raw types.
///
/// # Errors
/// Returns [`LayerError::Configuration`] if the grid is too large to allocate.
pub fn rasterize(features: &[Feature<CellValue>], grid: &RasterExtent, cell_type: CellType) -> Result<Tile> {
    let mut tile = Tile::empty(1, grid.cols as usize, grid.rows as usize, cell_type)?;
    burn(&mut tile, 0, grid, features)?;
    Ok(tile)
}

/// Rasterize `features` into every tile of `layout` they touch.
///
/// Tiles are rasterized in parallel. Only tiles with at least one covered
/// cell are kept; the layer bounds cover exactly those tiles.
///
/// # Errors
/// Returns [`LayerError::Configuration`] if a tile cannot be allocated.
pub fn rasterize_layer(
    features: &[Feature<CellValue>],
    crs: Crs,
    layout: &LayoutDefinition,
    zoom: Option<u32>,
    cell_type: CellType,
) -> Result<TiledLayer> {
    let extents: Vec<Option<Extent>> = features.iter().map(feature_extent).collect();

    let keys: BTreeSet<SpatialKey> = extents
        .iter()
        .flatten()
        .filter_map(|e| layout.key_bounds_for(e))
        .flat_map(|kb| kb.spatial_keys())
        .collect();

    let tiles = keys
        .par_iter()
        .map(|key| -> Result<Option<(LayerKey, Tile)>> {
            let grid = layout.key_raster_extent(key);
            // Keep input order so ties resolve the same way in every tile
            let local: Vec<Feature<CellValue>> = features
                .iter()
                .zip(&extents)
                .filter(|(_, e)| e.is_some_and(|e| e.intersects(&grid.extent)))
                .map(|(f, _)| f.clone())
                .collect();
            let mut tile = Tile::empty(1, grid.cols as usize, grid.rows as usize, cell_type)?;
            let written = burn(&mut tile, 0, &grid, &local)?;
            Ok((written > 0).then_some((LayerKey::Spatial(*key), tile)))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect::<BTreeMap<_, _>>();

    let bounds = tight_bounds(KeyType::Spatial, tiles.keys());
    let extent = Extent::union_all(extents.iter().flatten()).unwrap_or(*layout.extent());
    debug!(features = features.len(), candidates = keys.len(), tiles = tiles.len(), "Rasterized features");
    TiledLayer::new(Metadata::new(bounds, crs, cell_type, extent, *layout, zoom), tiles)
}
