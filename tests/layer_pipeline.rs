//! End-to-end checks: rasters to metadata, tiles, catalog and back.

use geo_types::{coord, Geometry, Rect};
use geolayer::{
    collect_metadata, rasterize, tile_to_layout, Catalog, CellType, CellValue, Crs, DataType, Extent,
    Feature, GlobalLayout, KeyBounds, LayerError, LayerQuery, LayoutStrategy, LocalLayout,
    ProjectedExtent, Raster, RasterExtent, SpatialKey, Tile, TilerOptions,
};
use ndarray::Array3;

const WORLD_WIDTH: f64 = 40_075_016.685_578_49;

fn utm() -> Crs {
    Crs::Epsg(32633)
}

/// `cols`x`rows` raster of `cell`-sized cells anchored at `(x, y)`, valued `row * cols + col`.
fn raster(x: f64, y: f64, cols: usize, rows: usize, cell: f64, crs: Crs) -> Raster {
    let cells = Array3::from_shape_fn((1, rows, cols), |(_, r, c)| (r * cols + c) as f64);
    let tile = Tile::new(cells, CellType::with_default_no_data(DataType::Int32)).unwrap();
    let extent = Extent::new(x, y, x + cols as f64 * cell, y + rows as f64 * cell).unwrap();
    Raster::new(tile, ProjectedExtent::new(extent, crs)).unwrap()
}

#[test]
fn test_inverted_key_bounds_rejected() {
    let result = KeyBounds::new(SpatialKey::new(5, 5), SpatialKey::new(1, 1));
    assert!(matches!(result, Err(LayerError::InvalidBounds(_))));
}

#[test]
fn test_local_layout_keeps_native_resolution() {
    let rasters = [raster(0.0, 0.0, 512, 300, 10.0, utm())];
    let metadata = collect_metadata(&rasters, &LocalLayout::new()).unwrap();

    let cell = metadata.layout_definition().cell_size();
    assert!((cell.width - 10.0).abs() < 1e-9);
    assert!((cell.height - 10.0).abs() < 1e-9);
    assert_eq!(metadata.zoom(), None);

    let tl = metadata.layout_definition().tile_layout();
    assert_eq!((tl.layout_cols(), tl.layout_rows()), (2, 2));
}

#[test]
fn test_local_layout_covers_rasters_with_uneven_cells() {
    // 10 cells of 10.4 m beside 10 cells of 10 m
    let rasters = [raster(0.0, 0.0, 10, 10, 10.4, utm()), raster(0.0, 0.0, 10, 10, 10.0, utm())];
    let metadata = collect_metadata(&rasters, &LocalLayout::new().with_tile_size(5)).unwrap();
    let layout = metadata.layout_definition();
    assert!(layout.extent().contains(metadata.extent()));

    // 11 columns of 10 m cells need a third 5-cell tile
    assert_eq!(layout.tile_layout().layout_cols(), 3);
    let (_, max) = metadata.bounds().min_max().unwrap();
    assert_eq!(max.spatial_key().col, 2);
}

#[test]
fn test_fixed_zoom_resolution_ignores_inputs() {
    let expected = WORLD_WIDTH / (4096.0 * 256.0);
    for cell in [2.0, 10.0, 300.0] {
        let rasters = [raster(0.0, 0.0, 16, 16, cell, Crs::web_mercator())];
        let metadata = collect_metadata(&rasters, &GlobalLayout::new().with_zoom(12)).unwrap();
        let size = metadata.layout_definition().cell_size();
        assert!((size.width - expected).abs() < 1e-9, "cell {cell}");
        assert_eq!(metadata.zoom(), Some(12));
    }
}

#[test]
fn test_inferred_zoom_uses_finest_input() {
    let rasters = [
        raster(0.0, 0.0, 64, 64, 20.0, Crs::web_mercator()),
        raster(5000.0, 5000.0, 64, 64, 10.0, Crs::web_mercator()),
    ];
    let metadata = collect_metadata(&rasters, &GlobalLayout::new()).unwrap();
    // zoom 14 cells are ~9.55 m, zoom 13 cells ~19.1 m
    assert_eq!(metadata.zoom(), Some(14));
    assert!(metadata.layout_definition().cell_size().width <= 10.0);
}

#[test]
fn test_crs_change_is_rejected() {
    let rasters = [
        raster(0.0, 0.0, 8, 8, 1.0, Crs::web_mercator()),
        raster(0.0, 0.0, 8, 8, 1.0, Crs::lat_lng()),
    ];
    for result in [
        collect_metadata(&rasters, &LocalLayout::new()),
        collect_metadata(&rasters, &GlobalLayout::new()),
    ] {
        assert!(matches!(result, Err(LayerError::CrsMismatch { index: 1, .. })));
    }
}

#[test]
fn test_metadata_is_deterministic_and_covers_inputs() {
    let rasters: Vec<Raster> = (0..12)
        .map(|i| raster(f64::from(i) * 700.0, f64::from(i % 3) * 450.0, 100, 60, 10.0, utm()))
        .collect();
    let strategy = LocalLayout::new().with_tile_size(32);

    let first = collect_metadata(&rasters, &strategy).unwrap();
    let second = collect_metadata(&rasters, &strategy).unwrap();
    assert_eq!(first, second);

    let (min, max) = first.bounds().min_max().unwrap();
    assert!(min.spatial_key().col <= max.spatial_key().col);
    assert!(min.spatial_key().row <= max.spatial_key().row);

    let layout = first.layout_definition();
    for r in &rasters {
        let kb = layout.key_bounds_for(r.source().extent()).unwrap();
        assert!(first.bounds().contains_spatial(&kb.min_key()));
        assert!(first.bounds().contains_spatial(&kb.max_key()));
        assert!(first.extent().contains(r.source().extent()));
    }
}

#[test]
fn test_strategy_agrees_with_metadata_layout() {
    let rasters = [raster(0.0, 0.0, 40, 40, 5.0, Crs::web_mercator())];
    let footprints: Vec<_> = rasters.iter().map(Raster::footprint).collect();
    let strategy = GlobalLayout::new();
    let resolved = strategy.resolve(&footprints).unwrap();
    let metadata = collect_metadata(&rasters, &strategy).unwrap();
    assert_eq!(&resolved.layout, metadata.layout_definition());
    assert_eq!(resolved.zoom, metadata.zoom());
}

#[test]
fn test_rasterize_boxes_by_zindex() {
    let grid = RasterExtent::new(Extent::new(0.0, 0.0, 1000.0, 500.0).unwrap(), 100, 50).unwrap();
    let rect = |xmin: f64, ymin: f64, xmax: f64, ymax: f64| {
        Geometry::Rect(Rect::new(coord! { x: xmin, y: ymin }, coord! { x: xmax, y: ymax }))
    };
    let features = [
        Feature::new(rect(0.0, 0.0, 15.0, 15.0), CellValue::new(1.0, 1)),
        Feature::new(rect(100.0, 26.0, 109.0, 208.0), CellValue::new(2.0, 2)),
        Feature::new(rect(610.0, 215.0, 1000.0, 500.0), CellValue::new(3.0, 3)),
        // Under geom3 everywhere it overlaps
        Feature::new(rect(600.0, 200.0, 1000.0, 500.0), CellValue::new(4.0, 0)),
    ];
    let tile = rasterize(&features, &grid, CellType::with_default_no_data(DataType::Int16)).unwrap();

    assert_eq!(tile.get_data(0, 0, 49), Some(1.0));
    assert_eq!(tile.get_data(0, 10, 40), Some(2.0));
    assert_eq!(tile.get_data(0, 80, 10), Some(3.0));
    assert_eq!(tile.get_data(0, 60, 0), Some(4.0));
    assert_eq!(tile.get_data(0, 50, 25), None);
}

#[test]
fn test_tile_store_and_query() {
    // 20x10 cells of 10 m, cut into 8x8 tiles: 3 x 2 keys
    let rasters = [raster(0.0, 0.0, 20, 10, 10.0, utm())];
    let layer = tile_to_layout(&rasters, &LocalLayout::new().with_tile_size(8), &TilerOptions::default()).unwrap();
    assert_eq!(layer.len(), 6);

    let catalog = Catalog::new();
    let id = catalog.write("elevation", layer.clone()).unwrap();
    assert_eq!(id.zoom, 0);
    assert_eq!(catalog.read_layer_metadata(&id).unwrap(), *layer.metadata());

    let tile = catalog.read_value(&id, 1, 0, None).unwrap().unwrap();
    assert_eq!(tile.get_data(0, 0, 0), Some(8.0));
    let corner = catalog.read_value(&id, 2, 1, None).unwrap().unwrap();
    assert_eq!(corner.get_data(0, 3, 1), Some(199.0));
    // Past the raster's east edge
    assert_eq!(corner.get_data(0, 4, 1), None);
    assert!(catalog.read_value(&id, 5, 5, None).unwrap().is_none());

    let window = LayerQuery::new().with_extent(Extent::new(0.0, 20.0, 80.0, 100.0).unwrap());
    let subset = catalog.query(&id, &window).unwrap();
    assert_eq!(subset.len(), 1);
    assert!(subset.read_value(0, 0, None).is_some());
    assert!(subset.read_value(2, 1, None).is_none());

    catalog.delete(&id).unwrap();
    assert!(matches!(catalog.read(&id), Err(LayerError::LayerNotFound(_))));
}
