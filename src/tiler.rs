//! Cutting rasters into the tiles of a layout.
//!
//! Every output cell is filled by sampling the source raster at the cell's
//! centre. Rasters are tiled in parallel and their fragments merged in input
//! order, so where sources overlap the earlier raster's values win.
//!
//! # Example
//!
//! ```rust
//! use geolayer::{CellType, Crs, DataType, Extent, LocalLayout, ProjectedExtent, Raster, Tile};
//! use geolayer::tiler::{tile_to_layout, TilerOptions};
//! use ndarray::Array3;
//!
//! let tile = Tile::new(Array3::from_elem((1, 8, 8), 1.0), CellType::raw(DataType::UInt8))?;
//! let raster = Raster::new(
//!     tile,
//!     ProjectedExtent::new(Extent::new(0.0, 0.0, 80.0, 80.0)?, Crs::Epsg(32633)),
//! )?;
//! let layer = tile_to_layout(&[raster], &LocalLayout::new().with_tile_size(4), &TilerOptions::default())?;
//! assert_eq!(layer.len(), 4);
//! # Ok::<(), geolayer::LayerError>(())
//! ```

use std::collections::BTreeMap;

use ahash::AHashMap;
use ndarray::{Array3, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cell_type::CellType;
use crate::error::{LayerError, Result};
use crate::key::LayerKey;
use crate::layer::TiledLayer;
use crate::layout::LayoutDefinition;
use crate::metadata::{collect_metadata, Metadata};
use crate::raster::{Raster, Tile};
use crate::strategy::LayoutStrategy;

/// How source cells are read for each output cell centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingMethod {
    /// Value of the source cell containing the centre
    #[default]
    NearestNeighbor,
    /// Distance-weighted mean of the four surrounding source cell centres
    Bilinear,
}

/// Options for [`tile_to_layout`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TilerOptions {
    pub resample_method: ResamplingMethod,
    /// Store tiles as this cell type instead of the sources' common type
    pub cell_type: Option<CellType>,
}

impl TilerOptions {
    #[must_use]
    pub fn with_resample_method(mut self, method: ResamplingMethod) -> Self {
        self.resample_method = method;
        self
    }

    #[must_use]
    pub fn with_cell_type(mut self, cell_type: CellType) -> Self {
        self.cell_type = Some(cell_type);
        self
    }
}

/// Part of one output tile produced from one raster.
struct Fragment {
    key: LayerKey,
    tile: Tile,
    written: Array3<bool>,
}

fn sample(raster: &Raster, method: ResamplingMethod, band: usize, x: f64, y: f64) -> Option<f64> {
    match method {
        ResamplingMethod::NearestNeighbor => raster.sample_nearest(band, x, y),
        ResamplingMethod::Bilinear => raster.sample_bilinear(band, x, y),
    }
}

/// Fragments of every layout tile `raster` touches.
fn tile_raster(
    raster: &Raster,
    layout: &LayoutDefinition,
    cell_type: CellType,
    bands: usize,
    method: ResamplingMethod,
) -> Result<Vec<Fragment>> {
    let source = raster.source();
    let Some(key_bounds) = layout.key_bounds_for(source.extent()) else {
        return Ok(Vec::new());
    };
    let tile_cols = layout.tile_layout().tile_cols();
    let tile_rows = layout.tile_layout().tile_rows();

    let mut fragments = Vec::new();
    for spatial in key_bounds.spatial_keys() {
        let grid = layout.key_raster_extent(&spatial);
        let Some((c0, r0, c1, r1)) = grid.cell_range_for(source.extent()) else {
            continue;
        };
        let mut tile = Tile::empty(bands, tile_cols as usize, tile_rows as usize, cell_type)?;
        let mut written = Array3::from_elem((bands, tile_rows as usize, tile_cols as usize), false);
        let mut any = false;

        for row in r0..=r1 {
            for col in c0..=c1 {
                let (x, y) = grid.cell_center(col, row);
                if !source.extent().contains_point(x, y) {
                    continue;
                }
                for band in 0..bands {
                    if let Some(v) = sample(raster, method, band, x, y) {
                        tile.set(band, col as usize, row as usize, v);
                        written[[band, row as usize, col as usize]] = true;
                        any = true;
                    }
                }
            }
        }

        if any {
            let key = match source.instant() {
                Some(instant) => LayerKey::SpaceTime(spatial.at(instant)),
                None => LayerKey::Spatial(spatial),
            };
            fragments.push(Fragment { key, tile, written });
        }
    }
    Ok(fragments)
}

/// Copy cells `incoming` wrote that `existing` has not.
fn merge_into(existing: &mut Fragment, incoming: &Fragment) {
    Zip::from(existing.tile.cells_mut())
        .and(&mut existing.written)
        .and(incoming.tile.cells())
        .and(&incoming.written)
        .for_each(|cell, done, value, wrote| {
            if *wrote && !*done {
                *cell = *value;
                *done = true;
            }
        });
}

/// Tile `rasters` into the layout `strategy` picks for them.
///
/// # Errors
/// Anything [`collect_metadata`] raises, and [`LayerError::Configuration`]
/// when the rasters have different band counts.
pub fn tile_to_layout<S>(rasters: &[Raster], strategy: &S, options: &TilerOptions) -> Result<TiledLayer>
where
    S: LayoutStrategy + ?Sized,
{
    let mut metadata = collect_metadata(rasters, strategy)?;
    if let Some(cell_type) = options.cell_type {
        metadata = metadata.with_cell_type(cell_type);
    }
    let bands = common_band_count(rasters)?;
    tile_with_metadata(rasters, metadata, bands, options.resample_method)
}

fn common_band_count(rasters: &[Raster]) -> Result<usize> {
    let first = rasters.first().map_or(0, |r| r.tile().bands());
    match rasters.iter().position(|r| r.tile().bands() != first) {
        Some(index) => Err(LayerError::Configuration(format!(
            "input {index} has {} bands, input 0 has {first}",
            rasters[index].tile().bands()
        ))),
        None => Ok(first),
    }
}

fn tile_with_metadata(
    rasters: &[Raster],
    metadata: Metadata,
    bands: usize,
    method: ResamplingMethod,
) -> Result<TiledLayer> {
    let layout = *metadata.layout_definition();
    let cell_type = metadata.cell_type();

    let per_raster: Vec<Vec<Fragment>> = rasters
        .par_iter()
        .map(|raster| tile_raster(raster, &layout, cell_type, bands, method))
        .collect::<Result<_>>()?;

    let mut merged: AHashMap<LayerKey, Fragment> = AHashMap::new();
    let mut fragment_count = 0;
    for fragment in per_raster.into_iter().flatten() {
        fragment_count += 1;
        match merged.get_mut(&fragment.key) {
            Some(existing) => merge_into(existing, &fragment),
            None => {
                merged.insert(fragment.key, fragment);
            }
        }
    }

    let tiles: BTreeMap<LayerKey, Tile> = merged.into_iter().map(|(key, f)| (key, f.tile)).collect();
    debug!(rasters = rasters.len(), fragments = fragment_count, tiles = tiles.len(), "Tiled rasters");
    TiledLayer::new(metadata, tiles)
}
