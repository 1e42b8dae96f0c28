//! Layer metadata and its aggregation from a set of rasters.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bounds::{Bounds, KeyBounds, LayerBounds};
use crate::cell_type::CellType;
use crate::error::{LayerError, Result};
use crate::geometry::{Crs, Extent};
use crate::key::{KeyType, LayerKey, SpaceTimeKey, SpatialKey};
use crate::layout::LayoutDefinition;
use crate::raster::{Raster, RasterFootprint};
use crate::strategy::{common_crs, LayoutStrategy};

/// Everything needed to interpret the tiles of a layer.
///
/// Values are immutable; the `with_*` methods return modified copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetadataRepr", into = "MetadataRepr")]
pub struct Metadata {
    bounds: LayerBounds,
    crs: Crs,
    cell_type: CellType,
    extent: Extent,
    layout_definition: LayoutDefinition,
    zoom: Option<u32>,
}

impl Metadata {
    #[must_use]
    pub fn new(
        bounds: LayerBounds,
        crs: Crs,
        cell_type: CellType,
        extent: Extent,
        layout_definition: LayoutDefinition,
        zoom: Option<u32>,
    ) -> Self {
        Self { bounds, crs, cell_type, extent, layout_definition, zoom }
    }

    #[inline]
    #[must_use]
    pub fn bounds(&self) -> &LayerBounds {
        &self.bounds
    }

    #[inline]
    #[must_use]
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    #[inline]
    #[must_use]
    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Union of the source extents.
    #[inline]
    #[must_use]
    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    #[inline]
    #[must_use]
    pub fn layout_definition(&self) -> &LayoutDefinition {
        &self.layout_definition
    }

    /// Pyramid level when a global layout was used.
    #[inline]
    #[must_use]
    pub fn zoom(&self) -> Option<u32> {
        self.zoom
    }

    #[inline]
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        self.bounds.key_type()
    }

    #[must_use]
    pub fn with_cell_type(&self, cell_type: CellType) -> Metadata {
        Metadata { cell_type, ..self.clone() }
    }

    /// # Errors
    /// Returns [`LayerError::InvalidBounds`] if `bounds` uses the other key variant.
    pub fn with_bounds(&self, bounds: LayerBounds) -> Result<Metadata> {
        if bounds.key_type() != self.key_type() {
            return Err(LayerError::InvalidBounds(format!(
                "cannot replace {} bounds with {} bounds",
                self.key_type(),
                bounds.key_type()
            )));
        }
        Ok(Metadata { bounds, ..self.clone() })
    }

    /// Serialise to the JSON document stored alongside a layer.
    ///
    /// # Errors
    /// Returns [`LayerError::Json`] if serialisation fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored JSON document.
    ///
    /// # Errors
    /// Returns [`LayerError::Json`] for malformed documents, including ones
    /// whose bounds disagree with their `keyType`.
    pub fn from_json(json: &str) -> Result<Metadata> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundsRepr {
    min_key: LayerKey,
    max_key: LayerKey,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataRepr {
    key_type: KeyType,
    bounds: Option<BoundsRepr>,
    crs: Crs,
    cell_type: CellType,
    extent: Extent,
    layout_definition: LayoutDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zoom: Option<u32>,
}

impl TryFrom<MetadataRepr> for Metadata {
    type Error = LayerError;

    fn try_from(raw: MetadataRepr) -> Result<Self> {
        let bounds = match raw.bounds {
            None => LayerBounds::empty(raw.key_type),
            Some(b) => LayerBounds::new(b.min_key, b.max_key)?,
        };
        if bounds.key_type() != raw.key_type {
            return Err(LayerError::InvalidBounds(format!(
                "keyType {} does not match {} bounds",
                raw.key_type,
                bounds.key_type()
            )));
        }
        Ok(Metadata {
            bounds,
            crs: raw.crs,
            cell_type: raw.cell_type,
            extent: raw.extent,
            layout_definition: raw.layout_definition,
            zoom: raw.zoom,
        })
    }
}

impl From<Metadata> for MetadataRepr {
    fn from(md: Metadata) -> Self {
        MetadataRepr {
            key_type: md.bounds.key_type(),
            bounds: md.bounds.min_max().map(|(min_key, max_key)| BoundsRepr { min_key, max_key }),
            crs: md.crs,
            cell_type: md.cell_type,
            extent: md.extent,
            layout_definition: md.layout_definition,
            zoom: md.zoom,
        }
    }
}

/// Key range each raster covers in `layout`, in input order.
///
/// Rasters missing the layout entirely map to `None`.
fn raster_key_bounds(rasters: &[Raster], layout: &LayoutDefinition) -> Vec<Option<KeyBounds<SpatialKey>>> {
    rasters
        .par_iter()
        .enumerate()
        .map(|(index, raster)| {
            let kb = layout.key_bounds_for(raster.source().extent());
            if kb.is_none() {
                warn!(index, extent = ?raster.source().extent(), "Raster falls outside the layout");
            }
            kb
        })
        .collect()
}

/// Common cell type of all rasters, widening losslessly.
fn common_cell_type(rasters: &[Raster]) -> Result<CellType> {
    let mut iter = rasters.iter().map(Raster::cell_type).enumerate();
    let Some((_, first)) = iter.next() else {
        return Err(LayerError::Configuration("no rasters given".to_string()));
    };
    iter.try_fold(first, |acc, (index, ct)| {
        acc.union(&ct).ok_or_else(|| LayerError::CellTypeMismatch {
            index,
            expected: acc.to_string(),
            found: ct.to_string(),
        })
    })
}

fn common_key_type(rasters: &[Raster]) -> Result<KeyType> {
    let mut iter = rasters.iter().map(|r| r.source().key_type()).enumerate();
    let Some((_, first)) = iter.next() else {
        return Err(LayerError::Configuration("no rasters given".to_string()));
    };
    match iter.find(|(_, kt)| *kt != first) {
        Some((index, kt)) => Err(LayerError::InvalidBounds(format!(
            "input {index} is keyed by {kt} but input 0 by {first}"
        ))),
        None => Ok(first),
    }
}

/// Aggregate the metadata of a layer built from `rasters` under `strategy`.
///
/// The result depends only on the inputs and their order, never on thread
/// scheduling.
///
/// # Errors
/// - [`LayerError::Configuration`] for no rasters or a strategy that cannot
///   produce a layout
/// - [`LayerError::CrsMismatch`] when the rasters do not share a CRS
/// - [`LayerError::InvalidBounds`] when spatial and temporal rasters are mixed
/// - [`LayerError::CellTypeMismatch`] when cell types cannot be widened into one
pub fn collect_metadata<S>(rasters: &[Raster], strategy: &S) -> Result<Metadata>
where
    S: LayoutStrategy + ?Sized,
{
    if rasters.is_empty() {
        return Err(LayerError::Configuration("no rasters given".to_string()));
    }
    let crs = common_crs(rasters.iter().map(|r| r.source().crs()))?.clone();
    let key_type = common_key_type(rasters)?;

    let footprints: Vec<RasterFootprint> = rasters.iter().map(Raster::footprint).collect();
    let resolved = strategy.resolve(&footprints)?;
    let layout = resolved.layout;

    let per_raster = raster_key_bounds(rasters, &layout);
    let bounds = match key_type {
        KeyType::Spatial => LayerBounds::Spatial(
            per_raster
                .iter()
                .fold(Bounds::Empty, |acc, kb| match kb {
                    Some(kb) => acc.combine(&Bounds::from(*kb)),
                    None => acc,
                }),
        ),
        KeyType::SpaceTime => LayerBounds::SpaceTime(per_raster.iter().zip(rasters).fold(
            Bounds::<SpaceTimeKey>::Empty,
            |acc, (kb, raster)| match (kb, raster.source().instant()) {
                (Some(kb), Some(instant)) => {
                    let min = kb.min_key().at(instant);
                    let max = kb.max_key().at(instant);
                    acc.include(&min).include(&max)
                }
                _ => acc,
            },
        )),
    };

    let cell_type = common_cell_type(rasters)?;
    let extent = Extent::union_all(rasters.iter().map(|r| r.source().extent()))
        .ok_or_else(|| LayerError::Configuration("no rasters given".to_string()))?;

    debug!(
        rasters = rasters.len(),
        %crs,
        %cell_type,
        zoom = ?resolved.zoom,
        tiles = bounds.spatial().key_bounds().map_or(0, KeyBounds::spatial_count),
        "Collected layer metadata"
    );
    Ok(Metadata {
        bounds,
        crs,
        cell_type,
        extent,
        layout_definition: layout,
        zoom: resolved.zoom,
    })
}
