//! Numeric conversions between map coordinates, grid indices and layout sizes.
//!
//! # Assumptions
//!
//! ## Grid dimensions (`u32` ↔ `f64`)
//! Layout and tile dimensions are `u32`. Every `u32` is exactly representable
//! in `f64`, so those widenings are unchecked.
//!
//! ## Map coordinates → grid indices (`f64` → `u32`/`usize`)
//! A coordinate divided by a cell or tile span lands on a float that may be
//! negative, NaN, or past the grid. These conversions are checked.
//!
//! ## Boundary snapping
//! Extents derived from a layout land exactly on tile edges in theory but are
//! a few ULPs off in practice. [`snap`] pulls values within [`GRID_EPSILON`]
//! of an integer onto it before flooring or ceiling, so an extent that ends
//! on a tile edge does not spill into the neighbouring tile.

use std::convert::TryFrom;

/// Relative distance to an integer below which a grid coordinate is treated as exact.
pub const GRID_EPSILON: f64 = 1e-9;

/// Snap a fractional grid coordinate onto the nearest integer when it is within tolerance.
#[inline]
#[must_use]
pub fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() <= GRID_EPSILON * rounded.abs().max(1.0) {
        rounded
    } else {
        value
    }
}

/// Floor of a snapped grid coordinate.
#[inline]
#[must_use]
pub fn snapped_floor(value: f64) -> f64 {
    snap(value).floor()
}

/// Ceiling of a snapped grid coordinate.
#[inline]
#[must_use]
pub fn snapped_ceil(value: f64) -> f64 {
    snap(value).ceil()
}

/// Convert a non-negative integral float to `u32`.
///
/// # Errors
/// Returns an error string if the value is NaN, negative, fractional or above `u32::MAX`.
#[inline]
pub fn f64_to_u32(value: f64) -> Result<u32, String> {
    if value.is_nan() || value < 0.0 || value > f64::from(u32::MAX) || value.fract() != 0.0 {
        return Err(format!("Value {value} is not a valid grid dimension"));
    }
    // Safety: range and integrality checked above
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(value as u32)
}

/// Convert a `usize` raster dimension to `u32`, failing on overflow.
///
/// # Errors
/// Returns an error string if the value exceeds `u32::MAX`.
#[inline]
pub fn usize_to_u32(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("Raster dimension {value} exceeds u32 maximum"))
}

/// Clamp a floored grid coordinate into `0..=max_index`.
///
/// NaN maps to 0.
#[inline]
#[must_use]
pub fn clamp_grid_index(value: f64, max_index: u32) -> u32 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    if value >= f64::from(max_index) {
        return max_index;
    }
    // Safety: 0 < value < max_index
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = value as u32;
    index
}

/// Convert a float pixel coordinate to an array index, returning `None` if out of bounds.
///
/// # Arguments
/// * `value` - The floating point pixel coordinate
/// * `max_value` - Number of pixels along the axis (exclusive bound)
#[inline]
#[must_use]
pub fn f64_to_pixel_index(value: f64, max_value: usize) -> Option<usize> {
    if value.is_nan() || value < 0.0 {
        return None;
    }
    // Safety: value >= 0 and not NaN
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = value as usize;
    if index >= max_value {
        None
    } else {
        Some(index)
    }
}

/// Convert a float pixel coordinate to an index clamped into `0..max_value`.
#[inline]
#[must_use]
pub fn f64_to_clamped_pixel(value: f64, max_value: usize) -> usize {
    if value.is_nan() || value < 0.0 {
        return 0;
    }
    // Safety: value >= 0 and not NaN
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = value as usize;
    if index >= max_value {
        max_value.saturating_sub(1)
    } else {
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_pulls_near_integers() {
        assert_eq!(snap(2.999_999_999_999), 3.0);
        assert_eq!(snap(3.000_000_000_001), 3.0);
        assert_eq!(snap(2.5), 2.5);
        assert_eq!(snapped_ceil(4.000_000_000_000_2), 4.0);
        assert_eq!(snapped_floor(3.999_999_999_999_8), 4.0);
    }

    #[test]
    fn test_f64_to_u32() {
        assert_eq!(f64_to_u32(0.0), Ok(0));
        assert_eq!(f64_to_u32(4096.0), Ok(4096));
        assert!(f64_to_u32(-1.0).is_err());
        assert!(f64_to_u32(1.5).is_err());
        assert!(f64_to_u32(f64::NAN).is_err());
        assert!(f64_to_u32(1e12).is_err());
    }

    #[test]
    fn test_clamp_grid_index() {
        assert_eq!(clamp_grid_index(-3.0, 9), 0);
        assert_eq!(clamp_grid_index(4.0, 9), 4);
        assert_eq!(clamp_grid_index(12.0, 9), 9);
        assert_eq!(clamp_grid_index(f64::NAN, 9), 0);
    }

    #[test]
    fn test_f64_to_pixel_index() {
        assert_eq!(f64_to_pixel_index(0.0, 100), Some(0));
        assert_eq!(f64_to_pixel_index(99.9, 100), Some(99));
        assert_eq!(f64_to_pixel_index(100.0, 100), None);
        assert_eq!(f64_to_pixel_index(-0.5, 100), None);
        assert_eq!(f64_to_pixel_index(f64::NAN, 100), None);
    }

    #[test]
    fn test_f64_to_clamped_pixel() {
        assert_eq!(f64_to_clamped_pixel(-10.0, 100), 0);
        assert_eq!(f64_to_clamped_pixel(50.5, 100), 50);
        assert_eq!(f64_to_clamped_pixel(150.0, 100), 99);
    }
}
