//! Cell arrays and the rasters that carry them.
//!
//! A [`Tile`] is a `(band, row, col)` array of `f64` cells tagged with the
//! [`CellType`] the values are meant to be stored as. A [`Raster`] pairs a
//! tile with where it sits on the map, spatially or spatio-temporally.

use chrono::{DateTime, Utc};
use ndarray::Array3;

use crate::casting::{f64_to_clamped_pixel, f64_to_pixel_index, usize_to_u32};
use crate::cell_type::CellType;
use crate::error::{LayerError, Result};
use crate::geometry::{Crs, Extent, ProjectedExtent, TemporalProjectedExtent};
use crate::key::KeyType;
use crate::layout::{CellSize, RasterExtent};

/// Multi-band cell array with a cell type.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    cells: Array3<f64>,
    cell_type: CellType,
}

impl Tile {
    /// Wrap an existing `(band, row, col)` array.
    ///
    /// # Errors
    /// Returns [`LayerError::Configuration`] if any dimension is zero or the
    /// grid is wider or taller than `u32::MAX`.
    pub fn new(cells: Array3<f64>, cell_type: CellType) -> Result<Self> {
        let (bands, rows, cols) = cells.dim();
        if bands == 0 || rows == 0 || cols == 0 {
            return Err(LayerError::Configuration(format!(
                "tile must have cells, got {bands} bands of {cols}x{rows}"
            )));
        }
        usize_to_u32(rows).map_err(LayerError::Configuration)?;
        usize_to_u32(cols).map_err(LayerError::Configuration)?;
        Ok(Self { cells, cell_type })
    }

    /// A tile with every cell set to the cell type's no-data value (0 when raw).
    ///
    /// # Errors
    /// Same conditions as [`Tile::new`].
    pub fn empty(bands: usize, cols: usize, rows: usize, cell_type: CellType) -> Result<Self> {
        let fill = cell_type.no_data_value().unwrap_or(0.0);
        Self::new(Array3::from_elem((bands, rows, cols), fill), cell_type)
    }

    #[inline]
    #[must_use]
    pub fn cells(&self) -> &Array3<f64> {
        &self.cells
    }

    #[inline]
    #[must_use]
    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    #[inline]
    #[must_use]
    pub fn bands(&self) -> usize {
        self.cells.dim().0
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.cells.dim().1
    }

    #[inline]
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cells.dim().2
    }

    /// Cell value, or `None` outside the array.
    #[must_use]
    pub fn get(&self, band: usize, col: usize, row: usize) -> Option<f64> {
        self.cells.get([band, row, col]).copied()
    }

    /// Cell value, or `None` outside the array or when it is no-data.
    #[must_use]
    pub fn get_data(&self, band: usize, col: usize, row: usize) -> Option<f64> {
        self.get(band, col, row).filter(|v| !self.cell_type.is_no_data(*v))
    }

    /// Store a value coerced to the tile's cell type. Out-of-range writes are ignored.
    pub fn set(&mut self, band: usize, col: usize, row: usize, value: f64) {
        let coerced = self.cell_type.coerce(value);
        if let Some(cell) = self.cells.get_mut([band, row, col]) {
            *cell = coerced;
        }
    }

    /// Copy of this tile re-expressed in another cell type.
    ///
    /// No-data cells become the target's no-data; data values are coerced.
    #[must_use]
    pub fn convert(&self, cell_type: CellType) -> Tile {
        let source = self.cell_type;
        let fill = cell_type.no_data_value().unwrap_or(0.0);
        let cells = self.cells.mapv(|v| {
            if source.is_no_data(v) {
                fill
            } else {
                cell_type.coerce(v)
            }
        });
        Tile { cells, cell_type }
    }

    /// Mutable access for bulk writers in this crate.
    pub(crate) fn cells_mut(&mut self) -> &mut Array3<f64> {
        &mut self.cells
    }
}

/// Where a raster sits: an extent in a CRS, optionally at an instant.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceExtent {
    Spatial(ProjectedExtent),
    Temporal(TemporalProjectedExtent),
}

impl SourceExtent {
    #[must_use]
    pub fn extent(&self) -> &Extent {
        match self {
            SourceExtent::Spatial(pe) => &pe.extent,
            SourceExtent::Temporal(tpe) => &tpe.extent,
        }
    }

    #[must_use]
    pub fn crs(&self) -> &Crs {
        match self {
            SourceExtent::Spatial(pe) => &pe.crs,
            SourceExtent::Temporal(tpe) => &tpe.crs,
        }
    }

    #[must_use]
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            SourceExtent::Spatial(_) => None,
            SourceExtent::Temporal(tpe) => Some(tpe.instant),
        }
    }

    /// Key variant a layer built from this source is addressed by.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self {
            SourceExtent::Spatial(_) => KeyType::Spatial,
            SourceExtent::Temporal(_) => KeyType::SpaceTime,
        }
    }
}

impl From<ProjectedExtent> for SourceExtent {
    fn from(pe: ProjectedExtent) -> Self {
        SourceExtent::Spatial(pe)
    }
}

impl From<TemporalProjectedExtent> for SourceExtent {
    fn from(tpe: TemporalProjectedExtent) -> Self {
        SourceExtent::Temporal(tpe)
    }
}

/// Extent, CRS and native cell size of a raster, all a layout strategy needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterFootprint {
    pub extent: Extent,
    pub crs: Crs,
    pub cell_size: CellSize,
}

/// A tile placed on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    tile: Tile,
    source: SourceExtent,
    grid: RasterExtent,
}

impl Raster {
    /// # Errors
    /// Returns [`LayerError::InvalidExtent`] if the extent has zero width or height.
    pub fn new(tile: Tile, source: impl Into<SourceExtent>) -> Result<Self> {
        let source = source.into();
        let extent = *source.extent();
        if extent.is_degenerate() {
            return Err(LayerError::InvalidExtent(format!(
                "raster extent must have area, got {extent:?}"
            )));
        }
        let cols = usize_to_u32(tile.cols()).map_err(LayerError::Configuration)?;
        let rows = usize_to_u32(tile.rows()).map_err(LayerError::Configuration)?;
        let grid = RasterExtent::new(extent, cols, rows)?;
        Ok(Self { tile, source, grid })
    }

    #[inline]
    #[must_use]
    pub fn tile(&self) -> &Tile {
        &self.tile
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &SourceExtent {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn raster_extent(&self) -> &RasterExtent {
        &self.grid
    }

    #[inline]
    #[must_use]
    pub fn cell_type(&self) -> CellType {
        self.tile.cell_type
    }

    #[must_use]
    pub fn footprint(&self) -> RasterFootprint {
        RasterFootprint {
            extent: *self.source.extent(),
            crs: self.source.crs().clone(),
            cell_size: self.grid.cell_size(),
        }
    }

    /// Value of the cell containing map point `(x, y)`.
    #[must_use]
    pub fn sample_nearest(&self, band: usize, x: f64, y: f64) -> Option<f64> {
        if !self.grid.extent.contains_point(x, y) {
            return None;
        }
        let (fc, fr) = self.grid.map_to_grid_f64(x, y);
        // Points on the east or south edge belong to the last cell
        let col = f64_to_clamped_pixel(fc, self.tile.cols());
        let row = f64_to_clamped_pixel(fr, self.tile.rows());
        self.tile.get_data(band, col, row)
    }

    /// Bilinear interpolation between the four nearest cell centres.
    ///
    /// Missing or no-data neighbours are dropped and the remaining weights
    /// renormalised; `None` when the point is off the raster or every
    /// neighbour is no-data.
    #[must_use]
    pub fn sample_bilinear(&self, band: usize, x: f64, y: f64) -> Option<f64> {
        if !self.grid.extent.contains_point(x, y) {
            return None;
        }
        let (fc, fr) = self.grid.map_to_grid_f64(x, y);
        let cx = fc - 0.5;
        let cy = fr - 0.5;
        let c0 = cx.floor();
        let r0 = cy.floor();
        let tx = cx - c0;
        let ty = cy - r0;

        let mut sum = 0.0;
        let mut weight = 0.0;
        for (dc, dr, w) in [
            (0.0, 0.0, (1.0 - tx) * (1.0 - ty)),
            (1.0, 0.0, tx * (1.0 - ty)),
            (0.0, 1.0, (1.0 - tx) * ty),
            (1.0, 1.0, tx * ty),
        ] {
            if w <= 0.0 {
                continue;
            }
            let (Some(col), Some(row)) = (
                f64_to_pixel_index(c0 + dc, self.tile.cols()),
                f64_to_pixel_index(r0 + dr, self.tile.rows()),
            ) else {
                continue;
            };
            if let Some(v) = self.tile.get_data(band, col, row) {
                sum += v * w;
                weight += w;
            }
        }
        (weight > 0.0).then(|| sum / weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_type::DataType;
    use chrono::TimeZone;

    fn ext(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Extent {
        Extent::new(xmin, ymin, xmax, ymax).unwrap()
    }

    fn ramp_tile() -> Tile {
        // 4 x 2 cells, value = row * 10 + col
        let cells = Array3::from_shape_fn((1, 2, 4), |(_, r, c)| (r * 10 + c) as f64);
        Tile::new(cells, CellType::with_default_no_data(DataType::Float64)).unwrap()
    }

    #[test]
    fn test_tile_rejects_empty_dims() {
        let cells = Array3::<f64>::zeros((1, 0, 4));
        assert!(matches!(
            Tile::new(cells, CellType::raw(DataType::UInt8)),
            Err(LayerError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_tile_uses_no_data() {
        let tile = Tile::empty(2, 3, 3, CellType::with_default_no_data(DataType::Int16)).unwrap();
        assert_eq!(tile.get(1, 2, 2), Some(f64::from(i16::MIN)));
        assert_eq!(tile.get_data(1, 2, 2), None);
        assert_eq!(tile.get(2, 0, 0), None);
    }

    #[test]
    fn test_set_coerces() {
        let mut tile = Tile::empty(1, 2, 2, CellType::raw(DataType::UInt8)).unwrap();
        tile.set(0, 1, 1, 300.7);
        assert_eq!(tile.get(0, 1, 1), Some(255.0));
        tile.set(0, 5, 5, 1.0);
    }

    #[test]
    fn test_convert_maps_no_data() {
        let source = Tile::empty(1, 2, 1, CellType::with_default_no_data(DataType::Float32)).unwrap();
        let mut source = source;
        source.set(0, 0, 0, 7.4);
        let target = source.convert(CellType::with_default_no_data(DataType::Int16));
        assert_eq!(target.get(0, 0, 0), Some(7.0));
        assert_eq!(target.get(0, 1, 0), Some(f64::from(i16::MIN)));
    }

    #[test]
    fn test_footprint_cell_size() {
        let raster = Raster::new(
            ramp_tile(),
            ProjectedExtent::new(ext(0.0, 0.0, 8.0, 2.0), Crs::web_mercator()),
        )
        .unwrap();
        let fp = raster.footprint();
        assert_eq!(fp.cell_size.width, 2.0);
        assert_eq!(fp.cell_size.height, 1.0);
        assert_eq!(fp.crs, Crs::web_mercator());
    }

    #[test]
    fn test_degenerate_extent_rejected() {
        let result = Raster::new(
            ramp_tile(),
            ProjectedExtent::new(ext(0.0, 0.0, 0.0, 2.0), Crs::web_mercator()),
        );
        assert!(matches!(result, Err(LayerError::InvalidExtent(_))));
    }

    #[test]
    fn test_sample_nearest() {
        let raster = Raster::new(
            ramp_tile(),
            ProjectedExtent::new(ext(0.0, 0.0, 4.0, 2.0), Crs::lat_lng()),
        )
        .unwrap();
        assert_eq!(raster.sample_nearest(0, 0.5, 1.5), Some(0.0));
        assert_eq!(raster.sample_nearest(0, 3.5, 0.5), Some(13.0));
        assert_eq!(raster.sample_nearest(0, 4.0, 0.0), Some(13.0));
        assert_eq!(raster.sample_nearest(0, 4.5, 0.5), None);
        assert_eq!(raster.sample_nearest(0, 0.0, 0.0), Some(10.0));
        assert_eq!(raster.sample_nearest(0, -0.1, 1.0), None);
    }

    #[test]
    fn test_sample_bilinear() {
        let raster = Raster::new(
            ramp_tile(),
            ProjectedExtent::new(ext(0.0, 0.0, 4.0, 2.0), Crs::lat_lng()),
        )
        .unwrap();
        // Midway between the centres of (0,0) and (1,0)
        assert_eq!(raster.sample_bilinear(0, 1.0, 1.5), Some(0.5));
        // Centre of the grid: average of 1, 2, 11, 12
        assert_eq!(raster.sample_bilinear(0, 2.0, 1.0), Some(6.5));
        assert_eq!(raster.sample_bilinear(0, 9.0, 1.0), None);
        // Corner cell centre quadrant: only in-grid neighbours count
        assert_eq!(raster.sample_bilinear(0, 0.25, 1.75), Some(0.0));
    }

    #[test]
    fn test_source_extent_variants() {
        let instant = Utc.timestamp_opt(3600, 0).unwrap();
        let temporal: SourceExtent =
            TemporalProjectedExtent::new(ext(0.0, 0.0, 1.0, 1.0), Crs::lat_lng(), instant).into();
        assert_eq!(temporal.key_type(), KeyType::SpaceTime);
        assert_eq!(temporal.instant(), Some(instant));
        let spatial: SourceExtent = ProjectedExtent::new(ext(0.0, 0.0, 1.0, 1.0), Crs::lat_lng()).into();
        assert_eq!(spatial.key_type(), KeyType::Spatial);
        assert_eq!(spatial.instant(), None);
    }
}
