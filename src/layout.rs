//! Grid shapes and their placement on the map.
//!
//! A [`TileLayout`] says how many tiles there are and how many cells each
//! holds; a [`LayoutDefinition`] pins that grid to an [`Extent`], which fixes
//! the cell size. Rows count from the north edge, columns from the west edge.
//! [`RasterExtent`] is the same idea for a single untiled raster.

use serde::{Deserialize, Serialize};

use crate::bounds::KeyBounds;
use crate::casting::{clamp_grid_index, snapped_ceil, snapped_floor};
use crate::error::{LayerError, Result};
use crate::geometry::Extent;
use crate::key::SpatialKey;

/// Size of one cell in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellSize {
    pub width: f64,
    pub height: f64,
}

impl CellSize {
    /// # Errors
    /// Returns [`LayerError::Configuration`] unless both sides are finite and positive.
    pub fn new(width: f64, height: f64) -> Result<Self> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(LayerError::Configuration(format!(
                "cell size must be positive, got {width} x {height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Geometric mean of the two sides, used to compare resolutions.
    #[must_use]
    pub fn resolution(&self) -> f64 {
        (self.width * self.height).sqrt()
    }
}

/// Grid shape: tiles across and down, cells across and down each tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TileLayoutRepr", rename_all = "camelCase")]
pub struct TileLayout {
    layout_cols: u32,
    layout_rows: u32,
    tile_cols: u32,
    tile_rows: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TileLayoutRepr {
    layout_cols: u32,
    layout_rows: u32,
    tile_cols: u32,
    tile_rows: u32,
}

impl TryFrom<TileLayoutRepr> for TileLayout {
    type Error = LayerError;

    fn try_from(raw: TileLayoutRepr) -> Result<Self> {
        TileLayout::new(raw.layout_cols, raw.layout_rows, raw.tile_cols, raw.tile_rows)
    }
}

impl TileLayout {
    /// # Errors
    /// Returns [`LayerError::Configuration`] if any dimension is zero.
    pub fn new(layout_cols: u32, layout_rows: u32, tile_cols: u32, tile_rows: u32) -> Result<Self> {
        if layout_cols == 0 || layout_rows == 0 || tile_cols == 0 || tile_rows == 0 {
            return Err(LayerError::Configuration(format!(
                "tile layout dimensions must be positive, got {layout_cols}x{layout_rows} tiles of {tile_cols}x{tile_rows}"
            )));
        }
        Ok(Self { layout_cols, layout_rows, tile_cols, tile_rows })
    }

    #[inline]
    #[must_use]
    pub fn layout_cols(&self) -> u32 {
        self.layout_cols
    }

    #[inline]
    #[must_use]
    pub fn layout_rows(&self) -> u32 {
        self.layout_rows
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

    /// Cells across the whole grid.
    #[must_use]
    pub fn total_cols(&self) -> u64 {
        u64::from(self.layout_cols) * u64::from(self.tile_cols)
    }

    /// Cells down the whole grid.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        u64::from(self.layout_rows) * u64::from(self.tile_rows)
    }

    /// Whether the key addresses a tile of this grid.
    #[must_use]
    pub fn contains_key(&self, key: &SpatialKey) -> bool {
        key.col < self.layout_cols && key.row < self.layout_rows
    }
}

/// A tile layout placed over an extent.
///
/// # Example
///
/// ```rust
/// use geolayer::{Extent, LayoutDefinition, SpatialKey, TileLayout};
///
/// let layout = LayoutDefinition::new(
///     Extent::new(0.0, 0.0, 100.0, 100.0)?,
///     TileLayout::new(10, 10, 256, 256)?,
/// );
/// assert_eq!(layout.key_extent(&SpatialKey::new(0, 0)), Extent::new(0.0, 90.0, 10.0, 100.0)?);
/// # Ok::<(), geolayer::LayerError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDefinition {
    extent: Extent,
    tile_layout: TileLayout,
}

impl LayoutDefinition {
    #[must_use]
    pub fn new(extent: Extent, tile_layout: TileLayout) -> Self {
        Self { extent, tile_layout }
    }

    #[inline]
    #[must_use]
    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    #[inline]
    #[must_use]
    pub fn tile_layout(&self) -> &TileLayout {
        &self.tile_layout
    }

    /// Map units covered by one tile horizontally.
    #[must_use]
    pub fn tile_width(&self) -> f64 {
        self.extent.width() / f64::from(self.tile_layout.layout_cols)
    }

    /// Map units covered by one tile vertically.
    #[must_use]
    pub fn tile_height(&self) -> f64 {
        self.extent.height() / f64::from(self.tile_layout.layout_rows)
    }

    /// Cell size: extent span over cells along each axis.
    #[must_use]
    pub fn cell_size(&self) -> CellSize {
        CellSize {
            width: self.tile_width() / f64::from(self.tile_layout.tile_cols),
            height: self.tile_height() / f64::from(self.tile_layout.tile_rows),
        }
    }

    /// Extent of the tile at `key`. The key need not lie inside the grid.
    #[must_use]
    pub fn key_extent(&self, key: &SpatialKey) -> Extent {
        let tw = self.tile_width();
        let th = self.tile_height();
        let xmin = self.extent.xmin() + f64::from(key.col) * tw;
        let ymax = self.extent.ymax() - f64::from(key.row) * th;
        Extent::new(xmin, ymax - th, xmin + tw, ymax).unwrap_or(self.extent)
    }

    /// Raster grid of the tile at `key`.
    #[must_use]
    pub fn key_raster_extent(&self, key: &SpatialKey) -> RasterExtent {
        RasterExtent {
            extent: self.key_extent(key),
            cols: self.tile_layout.tile_cols,
            rows: self.tile_layout.tile_rows,
        }
    }

    /// Key of the tile holding map point `(x, y)`, or `None` outside the grid.
    ///
    /// Points on the shared edge of two tiles belong to the east/south one,
    /// except on the grid's own east and south edges.
    #[must_use]
    pub fn map_to_key(&self, x: f64, y: f64) -> Option<SpatialKey> {
        if !self.extent.contains_point(x, y) {
            return None;
        }
        let max_col = self.tile_layout.layout_cols - 1;
        let max_row = self.tile_layout.layout_rows - 1;
        let col = snapped_floor((x - self.extent.xmin()) / self.tile_width());
        let row = snapped_floor((self.extent.ymax() - y) / self.tile_height());
        Some(SpatialKey::new(clamp_grid_index(col, max_col), clamp_grid_index(row, max_row)))
    }

    /// Range of tiles an extent overlaps, or `None` if it misses the grid.
    ///
    /// An extent ending exactly on a tile edge does not reach into the next
    /// tile. Degenerate extents (points, lines) map to the tiles holding them.
    #[must_use]
    pub fn key_bounds_for(&self, extent: &Extent) -> Option<KeyBounds<SpatialKey>> {
        let clipped = self.extent.intersection(extent)?;
        let tw = self.tile_width();
        let th = self.tile_height();
        let max_col = self.tile_layout.layout_cols - 1;
        let max_row = self.tile_layout.layout_rows - 1;

        let col_min_f = snapped_floor((clipped.xmin() - self.extent.xmin()) / tw);
        let row_min_f = snapped_floor((self.extent.ymax() - clipped.ymax()) / th);
        let col_max_f = (snapped_ceil((clipped.xmax() - self.extent.xmin()) / tw) - 1.0).max(col_min_f);
        let row_max_f = (snapped_ceil((self.extent.ymax() - clipped.ymin()) / th) - 1.0).max(row_min_f);

        let min = SpatialKey::new(clamp_grid_index(col_min_f, max_col), clamp_grid_index(row_min_f, max_row));
        let max = SpatialKey::new(clamp_grid_index(col_max_f, max_col), clamp_grid_index(row_max_f, max_row));
        KeyBounds::new(min, max).ok()
    }
}

/// An extent divided into `cols` x `rows` cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterExtent {
    pub extent: Extent,
    pub cols: u32,
    pub rows: u32,
}

impl RasterExtent {
    /// # Errors
    /// Returns [`LayerError::Configuration`] if either dimension is zero.
    pub fn new(extent: Extent, cols: u32, rows: u32) -> Result<Self> {
        if cols == 0 || rows == 0 {
            return Err(LayerError::Configuration(format!(
                "raster grid must have cells, got {cols}x{rows}"
            )));
        }
        Ok(Self { extent, cols, rows })
    }

    #[must_use]
    pub fn cell_size(&self) -> CellSize {
        CellSize {
            width: self.extent.width() / f64::from(self.cols),
            height: self.extent.height() / f64::from(self.rows),
        }
    }

    /// Map coordinates of the centre of cell `(col, row)`.
    #[must_use]
    pub fn cell_center(&self, col: u32, row: u32) -> (f64, f64) {
        let cs = self.cell_size();
        (
            self.extent.xmin() + (f64::from(col) + 0.5) * cs.width,
            self.extent.ymax() - (f64::from(row) + 0.5) * cs.height,
        )
    }

    /// Extent of cell `(col, row)`.
    #[must_use]
    pub fn cell_extent(&self, col: u32, row: u32) -> Extent {
        let cs = self.cell_size();
        let xmin = self.extent.xmin() + f64::from(col) * cs.width;
        let ymax = self.extent.ymax() - f64::from(row) * cs.height;
        Extent::new(xmin, ymax - cs.height, xmin + cs.width, ymax).unwrap_or(self.extent)
    }

    /// Fractional grid position of a map point (col, row), unclamped.
    #[must_use]
    pub fn map_to_grid_f64(&self, x: f64, y: f64) -> (f64, f64) {
        let cs = self.cell_size();
        ((x - self.extent.xmin()) / cs.width, (self.extent.ymax() - y) / cs.height)
    }

    /// Inclusive cell range `(col_min, row_min, col_max, row_max)` whose
    /// centres may fall inside `extent`; `None` if it misses the grid.
    #[must_use]
    pub fn cell_range_for(&self, extent: &Extent) -> Option<(u32, u32, u32, u32)> {
        let clipped = self.extent.intersection(extent)?;
        let (c0, r0) = self.map_to_grid_f64(clipped.xmin(), clipped.ymax());
        let (c1, r1) = self.map_to_grid_f64(clipped.xmax(), clipped.ymin());
        let max_col = self.cols - 1;
        let max_row = self.rows - 1;
        Some((
            clamp_grid_index(snapped_floor(c0), max_col),
            clamp_grid_index(snapped_floor(r0), max_row),
            clamp_grid_index(snapped_floor(c1), max_col),
            clamp_grid_index(snapped_floor(r1), max_row),
        ))
    }
}
