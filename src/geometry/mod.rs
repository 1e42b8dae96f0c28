//! Extents and the CRS-tagged extents that locate source rasters.

pub mod crs;

use chrono::{DateTime, Utc};
use geo_types::{coord, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, Result};
use crate::key::truncate_instant;
pub use crs::Crs;

/// Axis-aligned bounding box in map coordinates.
///
/// Construction checks that every coordinate is finite and that
/// `xmin <= xmax` and `ymin <= ymax`.
///
/// # Example
///
/// ```rust
/// use geolayer::Extent;
///
/// let a = Extent::new(0.0, 0.0, 10.0, 10.0)?;
/// let b = Extent::new(5.0, 5.0, 20.0, 15.0)?;
/// assert_eq!(a.intersection(&b), Some(Extent::new(5.0, 5.0, 10.0, 10.0)?));
/// assert_eq!(a.combine(&b), Extent::new(0.0, 0.0, 20.0, 15.0)?);
/// # Ok::<(), geolayer::LayerError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExtentRepr")]
pub struct Extent {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

#[derive(Deserialize)]
struct ExtentRepr {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

impl TryFrom<ExtentRepr> for Extent {
    type Error = LayerError;

    fn try_from(raw: ExtentRepr) -> Result<Self> {
        Extent::new(raw.xmin, raw.ymin, raw.xmax, raw.ymax)
    }
}

impl Extent {
    /// Create an extent, validating its corners.
    ///
    /// # Errors
    /// Returns [`LayerError::InvalidExtent`] for non-finite coordinates or inverted axes.
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self> {
        if ![xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite()) {
            return Err(LayerError::InvalidExtent(format!(
                "non-finite coordinate in ({xmin}, {ymin}, {xmax}, {ymax})"
            )));
        }
        if xmin > xmax || ymin > ymax {
            return Err(LayerError::InvalidExtent(format!(
                "min corner ({xmin}, {ymin}) exceeds max corner ({xmax}, {ymax})"
            )));
        }
        Ok(Self { xmin, ymin, xmax, ymax })
    }

    /// Extent from corners already known to be finite and ordered.
    pub(crate) const fn from_ordered(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    #[inline]
    #[must_use]
    pub fn xmin(&self) -> f64 {
        self.xmin
    }

    #[inline]
    #[must_use]
    pub fn ymin(&self) -> f64 {
        self.ymin
    }

    #[inline]
    #[must_use]
    pub fn xmax(&self) -> f64 {
        self.xmax
    }

    #[inline]
    #[must_use]
    pub fn ymax(&self) -> f64 {
        self.ymax
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// True when the extent has no area.
    #[inline]
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    /// Check whether two extents share any point, edges included.
    #[must_use]
    pub fn intersects(&self, other: &Extent) -> bool {
        self.xmin <= other.xmax
            && self.xmax >= other.xmin
            && self.ymin <= other.ymax
            && self.ymax >= other.ymin
    }

    /// Overlap of two extents, or `None` when they are disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        if !self.intersects(other) {
            return None;
        }
        Some(Extent {
            xmin: self.xmin.max(other.xmin),
            ymin: self.ymin.max(other.ymin),
            xmax: self.xmax.min(other.xmax),
            ymax: self.ymax.min(other.ymax),
        })
    }

    /// Smallest extent covering both.
    #[must_use]
    pub fn combine(&self, other: &Extent) -> Extent {
        Extent {
            xmin: self.xmin.min(other.xmin),
            ymin: self.ymin.min(other.ymin),
            xmax: self.xmax.max(other.xmax),
            ymax: self.ymax.max(other.ymax),
        }
    }

    #[must_use]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    #[must_use]
    pub fn contains(&self, other: &Extent) -> bool {
        self.xmin <= other.xmin
            && self.xmax >= other.xmax
            && self.ymin <= other.ymin
            && self.ymax >= other.ymax
    }

    /// The extent as a `geo-types` rectangle.
    #[must_use]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.xmin, y: self.ymin },
            coord! { x: self.xmax, y: self.ymax },
        )
    }

    /// The extent as a closed polygon, for use as a query or feature geometry.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }

    /// Build an extent from a `geo-types` rectangle.
    ///
    /// # Errors
    /// Returns [`LayerError::InvalidExtent`] if the rectangle has non-finite corners.
    pub fn from_rect(rect: &Rect<f64>) -> Result<Self> {
        Extent::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Union of many extents; `None` for an empty iterator.
    pub fn union_all<'a, I>(extents: I) -> Option<Extent>
    where
        I: IntoIterator<Item = &'a Extent>,
    {
        extents
            .into_iter()
            .fold(None, |acc: Option<Extent>, e| Some(acc.map_or(*e, |a| a.combine(e))))
    }
}

/// An extent together with the CRS its coordinates are expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedExtent {
    pub extent: Extent,
    pub crs: Crs,
}

impl ProjectedExtent {
    #[must_use]
    pub fn new(extent: Extent, crs: Crs) -> Self {
        Self { extent, crs }
    }
}

/// A projected extent observed at a single instant, held at millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalProjectedExtent {
    pub extent: Extent,
    pub crs: Crs,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub instant: DateTime<Utc>,
}

impl TemporalProjectedExtent {
    #[must_use]
    pub fn new(extent: Extent, crs: Crs, instant: DateTime<Utc>) -> Self {
        Self { extent, crs, instant: truncate_instant(instant) }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Extent {
        Extent::new(xmin, ymin, xmax, ymax).unwrap()
    }

    #[test]
    fn test_extent_rejects_inverted_axes() {
        assert!(matches!(
            Extent::new(10.0, 0.0, 0.0, 10.0),
            Err(LayerError::InvalidExtent(_))
        ));
        assert!(matches!(
            Extent::new(0.0, 10.0, 10.0, 0.0),
            Err(LayerError::InvalidExtent(_))
        ));
    }

    #[test]
    fn test_extent_rejects_non_finite() {
        assert!(Extent::new(f64::NAN, 0.0, 1.0, 1.0).is_err());
        assert!(Extent::new(0.0, 0.0, f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_extent_degenerate_is_allowed() {
        let point = ext(3.0, 4.0, 3.0, 4.0);
        assert!(point.is_degenerate());
        assert_eq!(point.width(), 0.0);
    }

    #[test]
    fn test_intersection_and_disjoint() {
        let a = ext(0.0, 0.0, 10.0, 10.0);
        let b = ext(5.0, 5.0, 15.0, 15.0);
        let c = ext(20.0, 20.0, 30.0, 30.0);

        assert_eq!(a.intersection(&b), Some(ext(5.0, 5.0, 10.0, 10.0)));
        assert_eq!(a.intersection(&c), None);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_touching_extents() {
        let a = ext(0.0, 0.0, 10.0, 10.0);
        let b = ext(10.0, 0.0, 20.0, 10.0);
        assert!(a.intersects(&b));
        assert_eq!(a.intersection(&b), Some(ext(10.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_combine_and_union_all() {
        let extents = [ext(0.0, 0.0, 1.0, 1.0), ext(1.0, 2.0, 3.0, 4.0), ext(5.0, 6.0, 7.0, 8.0)];
        assert_eq!(Extent::union_all(&extents), Some(ext(0.0, 0.0, 7.0, 8.0)));
        assert_eq!(Extent::union_all(&Vec::<Extent>::new()), None);
    }

    #[test]
    fn test_contains() {
        let outer = ext(0.0, 0.0, 10.0, 10.0);
        assert!(outer.contains(&ext(2.0, 2.0, 3.0, 3.0)));
        assert!(!outer.contains(&ext(2.0, 2.0, 11.0, 3.0)));
        assert!(outer.contains_point(10.0, 0.0));
        assert!(!outer.contains_point(10.1, 0.0));
    }

    #[test]
    fn test_rect_conversion() {
        let e = ext(-1.0, -2.0, 3.0, 4.0);
        assert_eq!(Extent::from_rect(&e.to_rect()).unwrap(), e);
    }

    #[test]
    fn test_extent_json_validates() {
        let json = r#"{"xmin":0.0,"ymin":0.0,"xmax":1.0,"ymax":1.0}"#;
        let e: Extent = serde_json::from_str(json).unwrap();
        assert_eq!(e, ext(0.0, 0.0, 1.0, 1.0));

        let bad = r#"{"xmin":2.0,"ymin":0.0,"xmax":1.0,"ymax":1.0}"#;
        assert!(serde_json::from_str::<Extent>(bad).is_err());
    }

    #[test]
    fn test_temporal_extent_keeps_millisecond_instant() {
        use chrono::TimeZone;
        let instant = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let tpe = TemporalProjectedExtent::new(ext(0.0, 0.0, 1.0, 1.0), Crs::web_mercator(), instant);
        assert_eq!(tpe.instant, Utc.timestamp_millis_opt(1_700_000_000_123).unwrap());

        let json = serde_json::to_string(&tpe).unwrap();
        let back: TemporalProjectedExtent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tpe);
    }
}
