//! Pixel data types and their no-data conventions.
//!
//! Names follow the GeoTrellis convention used by layer metadata:
//!
//! | name              | data type | no-data                    |
//! |-------------------|-----------|----------------------------|
//! | `int16`           | int16     | type default (`i16::MIN`)  |
//! | `int16raw`        | int16     | none                       |
//! | `int16ud-9999`    | int16     | user defined (`-9999`)     |
//! | `float32`         | float32   | type default (NaN)         |
//! | `float32ud-1.0`   | float32   | user defined (`-1.0`)      |
//! | `bool` / `boolraw`| bool      | none                       |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LayerError, Result};

/// Numeric representation of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl DataType {
    const ALL: [DataType; 9] = [
        DataType::Bool,
        DataType::Int8,
        DataType::UInt8,
        DataType::Int16,
        DataType::UInt16,
        DataType::Int32,
        DataType::UInt32,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Bits of storage per cell.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            DataType::Bool => 1,
            DataType::Int8 | DataType::UInt8 => 8,
            DataType::Int16 | DataType::UInt16 => 16,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 32,
            DataType::Float64 => 64,
        }
    }

    #[must_use]
    pub fn is_floating_point(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    #[must_use]
    pub fn is_signed_integer(self) -> bool {
        matches!(self, DataType::Int8 | DataType::Int16 | DataType::Int32)
    }

    #[must_use]
    pub fn is_unsigned_integer(self) -> bool {
        matches!(self, DataType::UInt8 | DataType::UInt16 | DataType::UInt32)
    }

    /// Inclusive value range of integral types; `None` for floats.
    #[must_use]
    pub fn integer_range(self) -> Option<(f64, f64)> {
        match self {
            DataType::Bool => Some((0.0, 1.0)),
            DataType::Int8 => Some((f64::from(i8::MIN), f64::from(i8::MAX))),
            DataType::UInt8 => Some((0.0, f64::from(u8::MAX))),
            DataType::Int16 => Some((f64::from(i16::MIN), f64::from(i16::MAX))),
            DataType::UInt16 => Some((0.0, f64::from(u16::MAX))),
            DataType::Int32 => Some((f64::from(i32::MIN), f64::from(i32::MAX))),
            DataType::UInt32 => Some((0.0, f64::from(u32::MAX))),
            DataType::Float32 | DataType::Float64 => None,
        }
    }

    /// Whether `value` is stored exactly by this type.
    #[must_use]
    pub fn can_represent(self, value: f64) -> bool {
        match self {
            DataType::Float64 => true,
            // f32 round trip is exact for the value, NaN is always storable
            #[allow(clippy::cast_possible_truncation)]
            DataType::Float32 => value.is_nan() || f64::from(value as f32) == value,
            _ => match self.integer_range() {
                Some((lo, hi)) => value.fract() == 0.0 && value >= lo && value <= hi,
                None => false,
            },
        }
    }

    /// Conventional no-data sentinel, `None` for `Bool`.
    #[must_use]
    pub fn default_no_data(self) -> Option<f64> {
        match self {
            DataType::Bool => None,
            DataType::Int8 => Some(f64::from(i8::MIN)),
            DataType::Int16 => Some(f64::from(i16::MIN)),
            DataType::Int32 => Some(f64::from(i32::MIN)),
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 => Some(0.0),
            DataType::Float32 | DataType::Float64 => Some(f64::NAN),
        }
    }

    /// Narrowest type that stores every value of both inputs without loss.
    ///
    /// `None` when no such type exists (never happens with the current set,
    /// because `Float64` stores every 32-bit integer exactly).
    #[must_use]
    pub fn union(self, other: DataType) -> Option<DataType> {
        use DataType::{Bool, Float32, Float64, Int16, Int32};

        if self == other {
            return Some(self);
        }
        let (a, b) = (self, other);
        let widened = match (a, b) {
            (Bool, t) | (t, Bool) => t,
            (Float64, _) | (_, Float64) => Float64,
            (Float32, t) | (t, Float32) => {
                if t.bits() <= 16 {
                    Float32
                } else {
                    Float64
                }
            }
            _ if a.is_signed_integer() == b.is_signed_integer() => {
                if a.bits() >= b.bits() {
                    a
                } else {
                    b
                }
            }
            _ => {
                let (signed, unsigned) = if a.is_signed_integer() { (a, b) } else { (b, a) };
                if signed.bits() > unsigned.bits() {
                    signed
                } else {
                    match unsigned.bits() {
                        8 => Int16,
                        16 => Int32,
                        _ => Float64,
                    }
                }
            }
        };
        Some(widened)
    }

    fn name(self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::UInt8 => "uint8",
            DataType::Int16 => "int16",
            DataType::UInt16 => "uint16",
            DataType::Int32 => "int32",
            DataType::UInt32 => "uint32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

/// How missing cells are marked.
#[derive(Debug, Clone, Copy)]
pub enum NoData {
    /// Every value is data.
    None,
    /// The data type's conventional sentinel.
    Default,
    /// A caller-chosen sentinel.
    UserDefined(f64),
}

impl PartialEq for NoData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NoData::None, NoData::None) | (NoData::Default, NoData::Default) => true,
            (NoData::UserDefined(a), NoData::UserDefined(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

/// Data type plus no-data convention of a tile or layer.
///
/// # Example
///
/// ```rust
/// use geolayer::{CellType, DataType};
///
/// let a: CellType = "uint8".parse()?;
/// let b: CellType = "int8".parse()?;
/// assert_eq!(a.union(&b).map(|c| c.data_type()), Some(DataType::Int16));
/// # Ok::<(), geolayer::LayerError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellType {
    data_type: DataType,
    no_data: NoData,
}

impl CellType {
    /// Build a cell type, checking the no-data value fits the data type.
    ///
    /// # Errors
    /// Returns [`LayerError::InvalidCellType`] when a user-defined value is not
    /// representable, or when `Bool` is given a sentinel.
    pub fn new(data_type: DataType, no_data: NoData) -> Result<Self> {
        match no_data {
            NoData::Default if data_type == DataType::Bool => Err(LayerError::InvalidCellType(
                "bool cells have no default no-data value".to_string(),
            )),
            NoData::UserDefined(_) if data_type == DataType::Bool => Err(
                LayerError::InvalidCellType("bool cells cannot carry a no-data value".to_string()),
            ),
            NoData::UserDefined(v) if v.is_nan() || !data_type.can_represent(v) => {
                Err(LayerError::InvalidCellType(format!(
                    "no-data value {v} is not representable as {}",
                    data_type.name()
                )))
            }
            _ => Ok(Self { data_type, no_data }),
        }
    }

    /// Cell type with no no-data value.
    #[must_use]
    pub fn raw(data_type: DataType) -> Self {
        Self { data_type, no_data: NoData::None }
    }

    /// Cell type using the data type's conventional sentinel (raw for `Bool`).
    #[must_use]
    pub fn with_default_no_data(data_type: DataType) -> Self {
        if data_type == DataType::Bool {
            Self::raw(data_type)
        } else {
            Self { data_type, no_data: NoData::Default }
        }
    }

    #[inline]
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    #[must_use]
    pub fn no_data(&self) -> NoData {
        self.no_data
    }

    /// Concrete sentinel value, if any.
    #[must_use]
    pub fn no_data_value(&self) -> Option<f64> {
        match self.no_data {
            NoData::None => None,
            NoData::Default => self.data_type.default_no_data(),
            NoData::UserDefined(v) => Some(v),
        }
    }

    /// Whether `value` marks a missing cell.
    #[must_use]
    pub fn is_no_data(&self, value: f64) -> bool {
        match self.no_data_value() {
            Some(nd) if nd.is_nan() => value.is_nan(),
            Some(nd) => value == nd,
            None => false,
        }
    }

    /// Convert a value into this type's domain: round and clamp integers,
    /// narrow to f32 precision, threshold booleans.
    #[must_use]
    pub fn coerce(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.no_data_value().unwrap_or(0.0);
        }
        match self.data_type {
            DataType::Float64 => value,
            #[allow(clippy::cast_possible_truncation)]
            DataType::Float32 => f64::from(value as f32),
            DataType::Bool => {
                if value != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            dt => match dt.integer_range() {
                Some((lo, hi)) => value.round().clamp(lo, hi),
                None => value,
            },
        }
    }

    /// Widest common cell type of two inputs.
    ///
    /// `bool` cells join any type as that type. Otherwise no-data conventions
    /// must match exactly, and a user-defined sentinel must stay
    /// representable in the widened type.
    #[must_use]
    pub fn union(&self, other: &CellType) -> Option<CellType> {
        match (self.data_type, other.data_type) {
            (DataType::Bool, _) => return Some(*other),
            (_, DataType::Bool) => return Some(*self),
            _ => {}
        }
        if self.no_data != other.no_data {
            return None;
        }
        let data_type = self.data_type.union(other.data_type)?;
        CellType::new(data_type, self.no_data).ok()
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.data_type.name();
        match self.no_data {
            NoData::None if self.data_type == DataType::Bool => f.write_str(name),
            NoData::None => write!(f, "{name}raw"),
            NoData::Default => f.write_str(name),
            NoData::UserDefined(v) if self.data_type.is_floating_point() => {
                write!(f, "{name}ud{v:?}")
            }
            NoData::UserDefined(v) => write!(f, "{name}ud{v}"),
        }
    }
}

impl FromStr for CellType {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        // Longest names first so "uint8" is not read as "int8"
        let mut candidates: Vec<DataType> = DataType::ALL.to_vec();
        candidates.sort_by_key(|dt| std::cmp::Reverse(dt.name().len()));

        let data_type = candidates
            .into_iter()
            .find(|dt| lower.starts_with(dt.name()))
            .ok_or_else(|| LayerError::InvalidCellType(format!("unknown cell type '{s}'")))?;
        let suffix = &lower[data_type.name().len()..];

        match (data_type, suffix) {
            (DataType::Bool, "" | "raw") => Ok(CellType::raw(DataType::Bool)),
            (_, "") => Ok(CellType::with_default_no_data(data_type)),
            (_, "raw") => Ok(CellType::raw(data_type)),
            (_, rest) => {
                let value = rest
                    .strip_prefix("ud")
                    .and_then(|v| v.parse::<f64>().ok())
                    .ok_or_else(|| LayerError::InvalidCellType(format!("unknown cell type '{s}'")))?;
                CellType::new(data_type, NoData::UserDefined(value))
            }
        }
    }
}

impl TryFrom<String> for CellType {
    type Error = LayerError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<CellType> for String {
    fn from(cell_type: CellType) -> Self {
        cell_type.to_string()
    }
}
