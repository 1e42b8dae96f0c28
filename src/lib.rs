#![doc = include_str!("../README.md")]
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geometry`]: Extents and CRS descriptors ([`Extent`], [`Crs`])
//! - [`cell_type`]: Pixel data types and no-data conventions
//! - [`raster`]: Cell arrays ([`Tile`]) and georeferenced rasters ([`Raster`])
//! - [`layout`]: Tile grids ([`TileLayout`], [`LayoutDefinition`])
//! - [`strategy`]: Layout resolution via [`LayoutStrategy`]
//! - [`key`] / [`bounds`]: Tile addresses and the ranges they span
//! - [`metadata`]: Layer [`Metadata`] and [`collect_metadata`]
//! - [`tiler`]: Cutting rasters into a layout
//! - [`layer`]: [`TiledLayer`] lookup and query
//! - [`catalog`]: In-memory layer store
//! - [`rasterize`]: Burning vector features with `zindex` priority
//! - [`config`]: Serialisable strategy configuration

// ============================================================================
// Public modules
// ============================================================================

pub mod bounds;
pub mod casting;
pub mod catalog;
pub mod cell_type;
pub mod config;
pub mod error;
pub mod geometry;
pub mod key;
pub mod layer;
pub mod layout;
pub mod metadata;
pub mod raster;
pub mod rasterize;
pub mod strategy;
pub mod tiler;

// ============================================================================
// Errors
// ============================================================================

pub use error::{LayerError, Result};

// ============================================================================
// Geometry & CRS
// ============================================================================

pub use geometry::{Extent, ProjectedExtent, TemporalProjectedExtent};
pub use geometry::crs::{
    Crs,
    get_proj_string,
    is_geographic_crs,
};

// ============================================================================
// Cells & Rasters
// ============================================================================

pub use cell_type::{CellType, DataType, NoData};
pub use raster::{
    Raster,
    RasterFootprint,
    SourceExtent,
    Tile,
};

// ============================================================================
// Layouts
// ============================================================================
// Primary API: strategy.resolve(&footprints) or collect_metadata(&rasters, &strategy)

pub use layout::{CellSize, LayoutDefinition, RasterExtent, TileLayout};
pub use strategy::{
    GlobalLayout,
    GlobalScheme,
    LayoutStrategy,
    LocalLayout,
    ResolvedLayout,
    ZoomPolicy,
};
pub use config::LayoutConfig;

// ============================================================================
// Keys, Bounds & Metadata
// ============================================================================

pub use key::{BoundsKey, KeyType, LayerKey, SpaceTimeKey, SpatialKey};
pub use bounds::{Bounds, KeyBounds, LayerBounds};
pub use metadata::{collect_metadata, Metadata};

// ============================================================================
// Layers
// ============================================================================

pub use tiler::{tile_to_layout, ResamplingMethod, TilerOptions};
pub use layer::{LayerQuery, LayerType, TiledLayer};
pub use catalog::{Catalog, LayerId};

// ============================================================================
// Rasterization
// ============================================================================

pub use rasterize::{burn, rasterize, rasterize_layer, CellValue, Feature};
