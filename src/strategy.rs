//! Choosing a layout for a set of rasters.
//!
//! [`LocalLayout`] fits a grid to the data at its native resolution.
//! [`GlobalLayout`] snaps the data onto a power-of-two pyramid covering the
//! whole world of its CRS, the same scheme slippy-map XYZ tiles use.
//!
//! # Example
//!
//! ```rust
//! use geolayer::{CellSize, Crs, Extent, GlobalLayout, LayoutStrategy, RasterFootprint};
//!
//! let footprint = RasterFootprint {
//!     extent: Extent::new(0.0, 0.0, 10_000.0, 10_000.0)?,
//!     crs: Crs::web_mercator(),
//!     cell_size: CellSize::new(10.0, 10.0)?,
//! };
//! let resolved = GlobalLayout::new().with_zoom(12).resolve(&[footprint])?;
//! assert_eq!(resolved.zoom, Some(12));
//! assert_eq!(resolved.layout.tile_layout().layout_cols(), 4096);
//! # Ok::<(), geolayer::LayerError>(())
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::casting::{f64_to_u32, snapped_ceil};
use crate::error::{LayerError, Result};
use crate::geometry::{Crs, Extent};
use crate::layout::{CellSize, LayoutDefinition, TileLayout};
use crate::raster::RasterFootprint;

/// Half the width of the Web Mercator world in metres.
pub const WEB_MERCATOR_HALF_WIDTH: f64 = 20_037_508.342_789_244;

/// Deepest pyramid level a global layout may use.
pub const MAX_ZOOM: u32 = 30;

/// Tile edge used when none is configured.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// A grid chosen for a set of rasters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLayout {
    pub layout: LayoutDefinition,
    /// Pyramid level, for global layouts only
    pub zoom: Option<u32>,
}

/// Picks a [`LayoutDefinition`] for rasters described by their footprints.
pub trait LayoutStrategy: Send + Sync {
    /// # Errors
    /// Returns [`LayerError::Configuration`] for empty input or an unusable
    /// configuration and [`LayerError::CrsMismatch`] when the footprints do
    /// not share a CRS.
    fn resolve(&self, footprints: &[RasterFootprint]) -> Result<ResolvedLayout>;
}

/// The CRS all footprints share, taking the first as the reference.
///
/// # Errors
/// [`LayerError::Configuration`] for no footprints, [`LayerError::CrsMismatch`]
/// naming the first footprint whose CRS is not equivalent to the first one.
pub fn common_crs<'a, I>(crs_list: I) -> Result<&'a Crs>
where
    I: IntoIterator<Item = &'a Crs>,
{
    let mut iter = crs_list.into_iter();
    let reference = iter
        .next()
        .ok_or_else(|| LayerError::Configuration("no rasters given".to_string()))?;
    for (offset, crs) in iter.enumerate() {
        if !crs.is_equivalent(reference) {
            return Err(LayerError::CrsMismatch {
                index: offset + 1,
                expected: reference.to_string(),
                found: crs.to_string(),
            });
        }
    }
    Ok(reference)
}

fn finest_cell_size(footprints: &[RasterFootprint]) -> Option<CellSize> {
    footprints
        .iter()
        .map(|fp| fp.cell_size)
        .min_by(|a, b| a.resolution().total_cmp(&b.resolution()))
}

/// Grid fitted to the data at native resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalLayout {
    tile_cols: u32,
    tile_rows: u32,
}

impl Default for LocalLayout {
    fn default() -> Self {
        Self {
            tile_cols: DEFAULT_TILE_SIZE,
            tile_rows: DEFAULT_TILE_SIZE,
        }
    }
}

impl LocalLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Square tiles of `size` cells.
    #[must_use]
    pub fn with_tile_size(mut self, size: u32) -> Self {
        self.tile_cols = size;
        self.tile_rows = size;
        self
    }

    /// Rectangular tiles.
    #[must_use]
    pub fn with_tile_dims(mut self, tile_cols: u32, tile_rows: u32) -> Self {
        self.tile_cols = tile_cols;
        self.tile_rows = tile_rows;
        self
    }

    #[inline]
    #[must_use]
    pub fn tile_cols(&self) -> u32 {
        self.tile_cols
    }

    #[inline]
    #[must_use]
    pub fn tile_rows(&self) -> u32 {
        self.tile_rows
    }
}

impl LayoutStrategy for LocalLayout {
    fn resolve(&self, footprints: &[RasterFootprint]) -> Result<ResolvedLayout> {
        if self.tile_cols == 0 || self.tile_rows == 0 {
            return Err(LayerError::Configuration(format!(
                "local layout tile dimensions must be positive, got {}x{}",
                self.tile_cols, self.tile_rows
            )));
        }
        common_crs(footprints.iter().map(|fp| &fp.crs))?;
        let cell = finest_cell_size(footprints)
            .ok_or_else(|| LayerError::Configuration("no rasters given".to_string()))?;
        let union = Extent::union_all(footprints.iter().map(|fp| &fp.extent))
            .ok_or_else(|| LayerError::Configuration("no rasters given".to_string()))?;

        // A partial cell on the east or south edge still needs a whole one
        let cols = snapped_ceil(union.width() / cell.width).max(1.0);
        let rows = snapped_ceil(union.height() / cell.height).max(1.0);
        let layout_cols = f64_to_u32((cols / f64::from(self.tile_cols)).ceil())
            .map_err(LayerError::Configuration)?;
        let layout_rows = f64_to_u32((rows / f64::from(self.tile_rows)).ceil())
            .map_err(LayerError::Configuration)?;
        let tile_layout = TileLayout::new(layout_cols, layout_rows, self.tile_cols, self.tile_rows)?;

        let width = f64::from(layout_cols) * f64::from(self.tile_cols) * cell.width;
        let height = f64::from(layout_rows) * f64::from(self.tile_rows) * cell.height;
        let extent = Extent::new(union.xmin(), union.ymax() - height, union.xmin() + width, union.ymax())?;

        debug!(
            layout_cols,
            layout_rows,
            tile_cols = self.tile_cols,
            tile_rows = self.tile_rows,
            cell_width = cell.width,
            cell_height = cell.height,
            "Resolved local layout"
        );
        Ok(ResolvedLayout {
            layout: LayoutDefinition::new(extent, tile_layout),
            zoom: None,
        })
    }
}

/// How a global layout picks a zoom when none is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomPolicy {
    /// The coarsest level that does not lose resolution
    #[default]
    NotCoarser,
    /// The level whose resolution is closest on a log scale; ties go to the finer level
    Nearest,
}

/// World grid of a CRS family at zoom 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalScheme {
    /// Web Mercator square world, one tile at zoom 0
    WebMercator,
    /// Longitude/latitude world, two tiles side by side at zoom 0
    Geographic,
}

impl GlobalScheme {
    /// Scheme for a CRS.
    ///
    /// # Errors
    /// Returns [`LayerError::Configuration`] when the CRS has no global scheme.
    pub fn for_crs(crs: &Crs) -> Result<Self> {
        if crs.is_web_mercator() {
            Ok(GlobalScheme::WebMercator)
        } else if crs.is_geographic() {
            Ok(GlobalScheme::Geographic)
        } else {
            Err(LayerError::Configuration(format!(
                "no global layout scheme for CRS {crs}"
            )))
        }
    }

    #[must_use]
    pub fn world_extent(self) -> Extent {
        match self {
            GlobalScheme::WebMercator => Extent::from_ordered(
                -WEB_MERCATOR_HALF_WIDTH,
                -WEB_MERCATOR_HALF_WIDTH,
                WEB_MERCATOR_HALF_WIDTH,
                WEB_MERCATOR_HALF_WIDTH,
            ),
            GlobalScheme::Geographic => Extent::from_ordered(-180.0, -90.0, 180.0, 90.0),
        }
    }

    /// Tiles across and down at zoom 0.
    #[must_use]
    pub fn base_dims(self) -> (u32, u32) {
        match self {
            GlobalScheme::WebMercator => (1, 1),
            GlobalScheme::Geographic => (2, 1),
        }
    }

    /// Cell resolution at `zoom` for square tiles of `tile_size` cells.
    #[must_use]
    pub fn resolution(self, zoom: u32, tile_size: u32) -> f64 {
        let (base_cols, _) = self.base_dims();
        let cells = f64::from(base_cols) * 2_f64.powi(i32::try_from(zoom).unwrap_or(i32::MAX)) * f64::from(tile_size);
        self.world_extent().width() / cells
    }

    /// Layout of the whole world at `zoom`.
    ///
    /// # Errors
    /// Returns [`LayerError::Configuration`] for a zoom above [`MAX_ZOOM`] or a
    /// zero tile size.
    pub fn layout_for_zoom(self, zoom: u32, tile_size: u32) -> Result<LayoutDefinition> {
        if zoom > MAX_ZOOM {
            return Err(LayerError::Configuration(format!(
                "zoom {zoom} exceeds maximum {MAX_ZOOM}"
            )));
        }
        let (base_cols, base_rows) = self.base_dims();
        let n = 1_u32 << zoom;
        let tile_layout = TileLayout::new(base_cols * n, base_rows * n, tile_size, tile_size)?;
        Ok(LayoutDefinition::new(self.world_extent(), tile_layout))
    }

    /// Zoom level for data at `native` resolution under `policy`.
    #[must_use]
    pub fn zoom_for_resolution(self, native: f64, tile_size: u32, policy: ZoomPolicy) -> u32 {
        match policy {
            ZoomPolicy::NotCoarser => {
                let tolerance = native * 1e-9;
                (0..=MAX_ZOOM)
                    .find(|&z| self.resolution(z, tile_size) <= native + tolerance)
                    .unwrap_or_else(|| {
                        warn!(native, max_zoom = MAX_ZOOM, "Native resolution finer than deepest zoom, clamping");
                        MAX_ZOOM
                    })
            }
            ZoomPolicy::Nearest => {
                let mut best = 0;
                let mut best_distance = f64::INFINITY;
                for z in 0..=MAX_ZOOM {
                    let distance = (self.resolution(z, tile_size) / native).log2().abs();
                    if distance <= best_distance + 1e-12 {
                        best = z;
                        best_distance = distance.min(best_distance);
                    }
                }
                best
            }
        }
    }
}

/// Power-of-two world pyramid for the data's CRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalLayout {
    zoom: Option<u32>,
    tile_size: u32,
    zoom_policy: ZoomPolicy,
}

impl Default for GlobalLayout {
    fn default() -> Self {
        Self {
            zoom: None,
            tile_size: DEFAULT_TILE_SIZE,
            zoom_policy: ZoomPolicy::default(),
        }
    }
}

impl GlobalLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this zoom regardless of the data's resolution.
    #[must_use]
    pub fn with_zoom(mut self, zoom: u32) -> Self {
        self.zoom = Some(zoom);
        self
    }

    #[must_use]
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    #[must_use]
    pub fn with_zoom_policy(mut self, policy: ZoomPolicy) -> Self {
        self.zoom_policy = policy;
        self
    }

    #[inline]
    #[must_use]
    pub fn zoom(&self) -> Option<u32> {
        self.zoom
    }

    #[inline]
    #[must_use]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    #[inline]
    #[must_use]
    pub fn zoom_policy(&self) -> ZoomPolicy {
        self.zoom_policy
    }
}

impl LayoutStrategy for GlobalLayout {
    fn resolve(&self, footprints: &[RasterFootprint]) -> Result<ResolvedLayout> {
        if self.tile_size == 0 {
            return Err(LayerError::Configuration(
                "global layout tile size must be positive".to_string(),
            ));
        }
        if let Some(zoom) = self.zoom.filter(|z| *z > MAX_ZOOM) {
            return Err(LayerError::Configuration(format!(
                "zoom {zoom} exceeds maximum {MAX_ZOOM}"
            )));
        }
        let crs = common_crs(footprints.iter().map(|fp| &fp.crs))?;
        let scheme = GlobalScheme::for_crs(crs)?;

        let zoom = match self.zoom {
            Some(zoom) => zoom,
            None => {
                let cell = finest_cell_size(footprints)
                    .ok_or_else(|| LayerError::Configuration("no rasters given".to_string()))?;
                let zoom = scheme.zoom_for_resolution(cell.resolution(), self.tile_size, self.zoom_policy);
                debug!(zoom, native = cell.resolution(), policy = ?self.zoom_policy, "Inferred zoom");
                zoom
            }
        };

        let layout = scheme.layout_for_zoom(zoom, self.tile_size)?;
        debug!(
            zoom,
            ?scheme,
            layout_cols = layout.tile_layout().layout_cols(),
            layout_rows = layout.tile_layout().layout_rows(),
            "Resolved global layout"
        );
        Ok(ResolvedLayout { layout, zoom: Some(zoom) })
    }
}
