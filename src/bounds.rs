//! Occupied key ranges of a layer.
//!
//! [`KeyBounds`] is a validated `(min, max)` pair; [`Bounds`] adds the empty
//! sentinel so that intersection is total. Both are generic over the key type,
//! so a bounds value can never mix spatial and space-time keys. [`LayerBounds`]
//! is the runtime-tagged form used by metadata, and the place where mixing
//! variants is rejected.

use chrono::{DateTime, Utc};

use crate::error::{LayerError, Result};
use crate::key::{BoundsKey, KeyType, LayerKey, SpaceTimeKey, SpatialKey};

/// A non-empty key range with `min <= max` in every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyBounds<K> {
    min: K,
    max: K,
}

impl<K: BoundsKey> KeyBounds<K> {
    /// # Errors
    /// Returns [`LayerError::InvalidBounds`] if `min` exceeds `max` in any component.
    pub fn new(min: K, max: K) -> Result<Self> {
        if !min.le_all(&max) {
            return Err(LayerError::InvalidBounds(format!(
                "min key {min} exceeds max key {max}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Bounds covering exactly one key.
    #[must_use]
    pub fn single(key: K) -> Self {
        Self { min: key, max: key }
    }

    #[inline]
    #[must_use]
    pub fn min_key(&self) -> K {
        self.min
    }

    #[inline]
    #[must_use]
    pub fn max_key(&self) -> K {
        self.max
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.min.le_all(key) && key.le_all(&self.max)
    }

    #[must_use]
    pub fn intersection(&self, other: &KeyBounds<K>) -> Option<KeyBounds<K>> {
        let min = self.min.max_components(&other.min);
        let max = self.max.min_components(&other.max);
        min.le_all(&max).then_some(KeyBounds { min, max })
    }

    #[must_use]
    pub fn combine(&self, other: &KeyBounds<K>) -> KeyBounds<K> {
        KeyBounds {
            min: self.min.min_components(&other.min),
            max: self.max.max_components(&other.max),
        }
    }

    /// Grow to include `key`.
    #[must_use]
    pub fn include(&self, key: &K) -> KeyBounds<K> {
        self.combine(&KeyBounds::single(*key))
    }

    /// Spatial rectangle of these bounds.
    #[must_use]
    pub fn to_spatial(&self) -> KeyBounds<SpatialKey> {
        KeyBounds {
            min: self.min.spatial(),
            max: self.max.spatial(),
        }
    }

    /// Keep the non-spatial components and replace the grid rectangle.
    #[must_use]
    pub fn with_spatial(&self, spatial: &KeyBounds<SpatialKey>) -> KeyBounds<K> {
        KeyBounds {
            min: self.min.with_spatial(spatial.min),
            max: self.max.with_spatial(spatial.max),
        }
    }

    /// Number of distinct grid cells (ignores time), saturating at `u64::MAX`.
    #[must_use]
    pub fn spatial_count(&self) -> u64 {
        let s = self.to_spatial();
        let cols = u64::from(s.max.col - s.min.col) + 1;
        let rows = u64::from(s.max.row - s.min.row) + 1;
        cols.saturating_mul(rows)
    }

    /// Every grid position in the rectangle, row-major.
    pub fn spatial_keys(&self) -> impl Iterator<Item = SpatialKey> {
        let s = self.to_spatial();
        (s.min.row..=s.max.row)
            .flat_map(move |row| (s.min.col..=s.max.col).map(move |col| SpatialKey::new(col, row)))
    }
}

impl KeyBounds<SpaceTimeKey> {
    /// Inclusive temporal range.
    #[must_use]
    pub fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.min.instant, self.max.instant)
    }
}

/// Key range of a layer, possibly empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bounds<K> {
    Empty,
    Bounded(KeyBounds<K>),
}

impl<K: BoundsKey> Bounds<K> {
    /// # Errors
    /// Returns [`LayerError::InvalidBounds`] if `min` exceeds `max` in any component.
    pub fn new(min: K, max: K) -> Result<Self> {
        KeyBounds::new(min, max).map(Bounds::Bounded)
    }

    /// Smallest bounds covering every key; `Empty` for no keys.
    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        keys.into_iter().fold(Bounds::Empty, |acc, key| acc.include(&key))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Bounds::Empty)
    }

    #[must_use]
    pub fn key_bounds(&self) -> Option<&KeyBounds<K>> {
        match self {
            Bounds::Empty => None,
            Bounds::Bounded(kb) => Some(kb),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.key_bounds().is_some_and(|kb| kb.contains(key))
    }

    /// Overlap, or `Empty` when disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Bounds<K>) -> Bounds<K> {
        match (self, other) {
            (Bounds::Bounded(a), Bounds::Bounded(b)) => {
                a.intersection(b).map_or(Bounds::Empty, Bounds::Bounded)
            }
            _ => Bounds::Empty,
        }
    }

    /// Smallest bounds covering both.
    #[must_use]
    pub fn combine(&self, other: &Bounds<K>) -> Bounds<K> {
        match (self, other) {
            (Bounds::Bounded(a), Bounds::Bounded(b)) => Bounds::Bounded(a.combine(b)),
            (Bounds::Bounded(_), Bounds::Empty) => *self,
            (Bounds::Empty, _) => *other,
        }
    }

    #[must_use]
    pub fn include(&self, key: &K) -> Bounds<K> {
        match self {
            Bounds::Empty => Bounds::Bounded(KeyBounds::single(*key)),
            Bounds::Bounded(kb) => Bounds::Bounded(kb.include(key)),
        }
    }
}

impl<K> From<KeyBounds<K>> for Bounds<K> {
    fn from(kb: KeyBounds<K>) -> Self {
        Bounds::Bounded(kb)
    }
}

/// Bounds whose key variant is decided at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerBounds {
    Spatial(Bounds<SpatialKey>),
    SpaceTime(Bounds<SpaceTimeKey>),
}

impl LayerBounds {
    /// Bounds from two runtime keys.
    ///
    /// # Errors
    /// Returns [`LayerError::InvalidBounds`] if the keys are different variants
    /// or `min` exceeds `max`.
    pub fn new(min: LayerKey, max: LayerKey) -> Result<Self> {
        match (min, max) {
            (LayerKey::Spatial(a), LayerKey::Spatial(b)) => Bounds::new(a, b).map(LayerBounds::Spatial),
            (LayerKey::SpaceTime(a), LayerKey::SpaceTime(b)) => {
                Bounds::new(a, b).map(LayerBounds::SpaceTime)
            }
            (a, b) => Err(LayerError::InvalidBounds(format!(
                "cannot mix {} and {} in one bounds",
                a.key_type(),
                b.key_type()
            ))),
        }
    }

    /// Empty bounds of the given variant.
    #[must_use]
    pub fn empty(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Spatial => LayerBounds::Spatial(Bounds::Empty),
            KeyType::SpaceTime => LayerBounds::SpaceTime(Bounds::Empty),
        }
    }

    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self {
            LayerBounds::Spatial(_) => KeyType::Spatial,
            LayerBounds::SpaceTime(_) => KeyType::SpaceTime,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            LayerBounds::Spatial(b) => b.is_empty(),
            LayerBounds::SpaceTime(b) => b.is_empty(),
        }
    }

    /// The `(min, max)` pair, or `None` when empty.
    #[must_use]
    pub fn min_max(&self) -> Option<(LayerKey, LayerKey)> {
        match self {
            LayerBounds::Spatial(b) => b.key_bounds().map(|kb| (kb.min_key().into(), kb.max_key().into())),
            LayerBounds::SpaceTime(b) => {
                b.key_bounds().map(|kb| (kb.min_key().into(), kb.max_key().into()))
            }
        }
    }

    /// Spatial rectangle regardless of variant.
    #[must_use]
    pub fn spatial(&self) -> Bounds<SpatialKey> {
        match self {
            LayerBounds::Spatial(b) => *b,
            LayerBounds::SpaceTime(b) => b.key_bounds().map_or(Bounds::Empty, |kb| kb.to_spatial().into()),
        }
    }

    /// `false` for a key of the other variant.
    #[must_use]
    pub fn contains(&self, key: &LayerKey) -> bool {
        match (self, key) {
            (LayerBounds::Spatial(b), LayerKey::Spatial(k)) => b.contains(k),
            (LayerBounds::SpaceTime(b), LayerKey::SpaceTime(k)) => b.contains(k),
            _ => false,
        }
    }

    /// Whether the grid rectangle holds `(col, row)`, ignoring time.
    #[must_use]
    pub fn contains_spatial(&self, key: &SpatialKey) -> bool {
        self.spatial().contains(key)
    }

    /// # Errors
    /// Returns [`LayerError::InvalidBounds`] for bounds of different variants.
    pub fn intersection(&self, other: &LayerBounds) -> Result<LayerBounds> {
        match (self, other) {
            (LayerBounds::Spatial(a), LayerBounds::Spatial(b)) => Ok(LayerBounds::Spatial(a.intersection(b))),
            (LayerBounds::SpaceTime(a), LayerBounds::SpaceTime(b)) => {
                Ok(LayerBounds::SpaceTime(a.intersection(b)))
            }
            _ => Err(self.mismatch(other)),
        }
    }

    /// # Errors
    /// Returns [`LayerError::InvalidBounds`] for bounds of different variants.
    pub fn combine(&self, other: &LayerBounds) -> Result<LayerBounds> {
        match (self, other) {
            (LayerBounds::Spatial(a), LayerBounds::Spatial(b)) => Ok(LayerBounds::Spatial(a.combine(b))),
            (LayerBounds::SpaceTime(a), LayerBounds::SpaceTime(b)) => {
                Ok(LayerBounds::SpaceTime(a.combine(b)))
            }
            _ => Err(self.mismatch(other)),
        }
    }

    /// # Errors
    /// Returns [`LayerError::InvalidBounds`] for a key of the other variant.
    pub fn include(&self, key: &LayerKey) -> Result<LayerBounds> {
        match (self, key) {
            (LayerBounds::Spatial(b), LayerKey::Spatial(k)) => Ok(LayerBounds::Spatial(b.include(k))),
            (LayerBounds::SpaceTime(b), LayerKey::SpaceTime(k)) => Ok(LayerBounds::SpaceTime(b.include(k))),
            _ => Err(LayerError::InvalidBounds(format!(
                "cannot add a {} to {} bounds",
                key.key_type(),
                self.key_type()
            ))),
        }
    }

    fn mismatch(&self, other: &LayerBounds) -> LayerError {
        LayerError::InvalidBounds(format!(
            "cannot reconcile {} bounds with {} bounds",
            self.key_type(),
            other.key_type()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sk(col: u32, row: u32) -> SpatialKey {
        SpatialKey::new(col, row)
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_min_greater_than_max_is_rejected() {
        assert!(matches!(Bounds::new(sk(3, 0), sk(2, 5)), Err(LayerError::InvalidBounds(_))));
        assert!(matches!(Bounds::new(sk(0, 6), sk(2, 5)), Err(LayerError::InvalidBounds(_))));
        let late = SpaceTimeKey::new(0, 0, t(100));
        let early = SpaceTimeKey::new(5, 5, t(0));
        assert!(matches!(Bounds::new(late, early), Err(LayerError::InvalidBounds(_))));
    }

    #[test]
    fn test_valid_bounds_are_component_wise_ordered() {
        let b = KeyBounds::new(sk(1, 2), sk(4, 2)).unwrap();
        assert!(b.min_key().le_all(&b.max_key()));
        assert_eq!(b.spatial_count(), 4);
    }

    #[test]
    fn test_spatial_count_spans_whole_key_range() {
        let column = KeyBounds::new(sk(0, 0), sk(u32::MAX, 0)).unwrap();
        assert_eq!(column.spatial_count(), u64::from(u32::MAX) + 1);
        let everything = KeyBounds::new(sk(0, 0), sk(u32::MAX, u32::MAX)).unwrap();
        assert_eq!(everything.spatial_count(), u64::MAX);
    }

    #[test]
    fn test_contains() {
        let b = Bounds::new(sk(1, 1), sk(3, 4)).unwrap();
        assert!(b.contains(&sk(1, 1)));
        assert!(b.contains(&sk(3, 4)));
        assert!(b.contains(&sk(2, 3)));
        assert!(!b.contains(&sk(0, 2)));
        assert!(!b.contains(&sk(2, 5)));
        assert!(!Bounds::<SpatialKey>::Empty.contains(&sk(0, 0)));
    }

    #[test]
    fn test_intersection_and_disjoint_sentinel() {
        let a = Bounds::new(sk(0, 0), sk(5, 5)).unwrap();
        let b = Bounds::new(sk(3, 4), sk(9, 9)).unwrap();
        let c = Bounds::new(sk(7, 0), sk(8, 2)).unwrap();

        assert_eq!(a.intersection(&b), Bounds::new(sk(3, 4), sk(5, 5)).unwrap());
        assert_eq!(a.intersection(&c), Bounds::Empty);
        assert_eq!(a.intersection(&Bounds::Empty), Bounds::Empty);
    }

    #[test]
    fn test_combine() {
        let a = Bounds::new(sk(0, 3), sk(2, 5)).unwrap();
        let b = Bounds::new(sk(4, 0), sk(6, 1)).unwrap();
        assert_eq!(a.combine(&b), Bounds::new(sk(0, 0), sk(6, 5)).unwrap());
        assert_eq!(a.combine(&Bounds::Empty), a);
        assert_eq!(Bounds::Empty.combine(&b), b);
    }

    #[test]
    fn test_space_time_reconciles_space_and_time_independently() {
        let a = Bounds::new(SpaceTimeKey::new(0, 0, t(0)), SpaceTimeKey::new(4, 4, t(100))).unwrap();
        let b = Bounds::new(SpaceTimeKey::new(2, 2, t(50)), SpaceTimeKey::new(8, 8, t(200))).unwrap();
        assert_eq!(
            a.intersection(&b),
            Bounds::new(SpaceTimeKey::new(2, 2, t(50)), SpaceTimeKey::new(4, 4, t(100))).unwrap()
        );
        assert_eq!(
            a.combine(&b),
            Bounds::new(SpaceTimeKey::new(0, 0, t(0)), SpaceTimeKey::new(8, 8, t(200))).unwrap()
        );

        // Spatially overlapping but temporally disjoint
        let later = Bounds::new(SpaceTimeKey::new(0, 0, t(500)), SpaceTimeKey::new(4, 4, t(600))).unwrap();
        assert_eq!(a.intersection(&later), Bounds::Empty);
    }

    #[test]
    fn test_from_keys() {
        let keys = [sk(3, 1), sk(0, 4), sk(2, 2)];
        assert_eq!(Bounds::from_keys(keys), Bounds::new(sk(0, 1), sk(3, 4)).unwrap());
        assert_eq!(Bounds::<SpatialKey>::from_keys([]), Bounds::Empty);
    }

    #[test]
    fn test_spatial_keys_iteration() {
        let kb = KeyBounds::new(sk(1, 0), sk(2, 1)).unwrap();
        let keys: Vec<_> = kb.spatial_keys().collect();
        assert_eq!(keys, vec![sk(1, 0), sk(2, 0), sk(1, 1), sk(2, 1)]);
    }

    #[test]
    fn test_layer_bounds_rejects_mixed_variants() {
        let spatial = LayerKey::Spatial(sk(0, 0));
        let temporal = LayerKey::SpaceTime(SpaceTimeKey::new(1, 1, t(0)));
        assert!(matches!(LayerBounds::new(spatial, temporal), Err(LayerError::InvalidBounds(_))));

        let lb = LayerBounds::new(spatial, LayerKey::Spatial(sk(2, 2))).unwrap();
        assert!(!lb.contains(&temporal));
        assert!(lb.include(&temporal).is_err());
        assert!(lb.combine(&LayerBounds::empty(KeyType::SpaceTime)).is_err());
    }

    #[test]
    fn test_layer_bounds_spatial_projection() {
        let lb = LayerBounds::new(
            SpaceTimeKey::new(1, 2, t(0)).into(),
            SpaceTimeKey::new(3, 4, t(10)).into(),
        )
        .unwrap();
        assert_eq!(lb.spatial(), Bounds::new(sk(1, 2), sk(3, 4)).unwrap());
        assert!(lb.contains_spatial(&sk(2, 3)));
        assert_eq!(lb.key_type(), KeyType::SpaceTime);
    }
}
