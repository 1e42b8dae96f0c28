//! Tile addresses within a layout.
//!
//! [`SpatialKey`] and [`SpaceTimeKey`] are distinct types; code that works on
//! either is generic over [`BoundsKey`]. Where the variant is only known at
//! runtime (stored layers, JSON metadata) the tagged [`LayerKey`] is used.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Column/row address of a tile in a 2D grid.
///
/// Columns run west to east, rows run north to south. Keys order by row, then
/// column (row-major scan order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialKey {
    pub col: u32,
    pub row: u32,
}

impl SpatialKey {
    #[inline]
    #[must_use]
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }

    /// Attach an instant.
    #[must_use]
    pub fn at(self, instant: DateTime<Utc>) -> SpaceTimeKey {
        SpaceTimeKey::new(self.col, self.row, instant)
    }
}

impl Ord for SpatialKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.row, self.col).cmp(&(other.row, other.col))
    }
}

impl PartialOrd for SpatialKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SpatialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// `instant` cut to the millisecond precision keys are serialised with.
#[inline]
#[must_use]
pub fn truncate_instant(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(3)
}

/// Column/row address of a tile at a point in time.
///
/// Keys order by instant, then row, then column. Instants are held at
/// millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceTimeKey {
    pub col: u32,
    pub row: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub instant: DateTime<Utc>,
}

impl SpaceTimeKey {
    #[inline]
    #[must_use]
    pub fn new(col: u32, row: u32, instant: DateTime<Utc>) -> Self {
        Self { col, row, instant: truncate_instant(instant) }
    }

    #[inline]
    #[must_use]
    pub fn spatial_key(&self) -> SpatialKey {
        SpatialKey::new(self.col, self.row)
    }
}

impl Ord for SpaceTimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.instant, self.row, self.col).cmp(&(other.instant, other.row, other.col))
    }
}

impl PartialOrd for SpaceTimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SpaceTimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.col, self.row, self.instant.to_rfc3339())
    }
}

/// Component-wise operations needed to build bounds over a key type.
pub trait BoundsKey: Copy + Ord + fmt::Debug + fmt::Display + Send + Sync {
    /// `self <= other` in every component.
    fn le_all(&self, other: &Self) -> bool;

    /// Component-wise minimum.
    fn min_components(&self, other: &Self) -> Self;

    /// Component-wise maximum.
    fn max_components(&self, other: &Self) -> Self;

    /// The grid position, without time.
    fn spatial(&self) -> SpatialKey;

    /// Replace the grid position, keeping any other component.
    fn with_spatial(&self, spatial: SpatialKey) -> Self;
}

impl BoundsKey for SpatialKey {
    fn le_all(&self, other: &Self) -> bool {
        self.col <= other.col && self.row <= other.row
    }

    fn min_components(&self, other: &Self) -> Self {
        SpatialKey::new(self.col.min(other.col), self.row.min(other.row))
    }

    fn max_components(&self, other: &Self) -> Self {
        SpatialKey::new(self.col.max(other.col), self.row.max(other.row))
    }

    fn spatial(&self) -> SpatialKey {
        *self
    }

    fn with_spatial(&self, spatial: SpatialKey) -> Self {
        spatial
    }
}

impl BoundsKey for SpaceTimeKey {
    fn le_all(&self, other: &Self) -> bool {
        self.col <= other.col && self.row <= other.row && self.instant <= other.instant
    }

    fn min_components(&self, other: &Self) -> Self {
        SpaceTimeKey::new(
            self.col.min(other.col),
            self.row.min(other.row),
            self.instant.min(other.instant),
        )
    }

    fn max_components(&self, other: &Self) -> Self {
        SpaceTimeKey::new(
            self.col.max(other.col),
            self.row.max(other.row),
            self.instant.max(other.instant),
        )
    }

    fn spatial(&self) -> SpatialKey {
        self.spatial_key()
    }

    fn with_spatial(&self, spatial: SpatialKey) -> Self {
        spatial.at(self.instant)
    }
}

/// Key whose variant is decided at runtime.
///
/// Deserialises a JSON object with an `instant` field as `SpaceTime`, anything
/// else with `col`/`row` as `Spatial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerKey {
    SpaceTime(SpaceTimeKey),
    Spatial(SpatialKey),
}

impl LayerKey {
    #[must_use]
    pub fn spatial_key(&self) -> SpatialKey {
        match self {
            LayerKey::Spatial(k) => *k,
            LayerKey::SpaceTime(k) => k.spatial_key(),
        }
    }

    #[must_use]
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            LayerKey::Spatial(_) => None,
            LayerKey::SpaceTime(k) => Some(k.instant),
        }
    }

    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self {
            LayerKey::Spatial(_) => KeyType::Spatial,
            LayerKey::SpaceTime(_) => KeyType::SpaceTime,
        }
    }
}

impl From<SpatialKey> for LayerKey {
    fn from(key: SpatialKey) -> Self {
        LayerKey::Spatial(key)
    }
}

impl From<SpaceTimeKey> for LayerKey {
    fn from(key: SpaceTimeKey) -> Self {
        LayerKey::SpaceTime(key)
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKey::Spatial(k) => k.fmt(f),
            LayerKey::SpaceTime(k) => k.fmt(f),
        }
    }
}

/// Which key variant a layer is addressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "SpatialKey")]
    Spatial,
    #[serde(rename = "SpaceTimeKey")]
    SpaceTime,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Spatial => f.write_str("SpatialKey"),
            KeyType::SpaceTime => f.write_str("SpaceTimeKey"),
        }
    }
}
