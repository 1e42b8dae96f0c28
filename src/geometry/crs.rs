//! Coordinate reference system descriptors.
//!
//! A CRS is identified either by an EPSG code or by a proj4 string, never
//! both. EPSG codes resolve to proj4 text through the `crs-definitions`
//! database and proj4 strings are checked with `proj4rs`, both pure Rust.
//! Only identification and comparison live here; coordinates are never
//! transformed.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LayerError, Result};

/// EPSG code of Web Mercator.
pub const WEB_MERCATOR_EPSG: i32 = 3857;

/// EPSG code of WGS84 longitude/latitude.
pub const LAT_LNG_EPSG: i32 = 4326;

/// Legacy codes that denote the same Web Mercator projection as 3857.
const WEB_MERCATOR_ALIASES: [i32; 3] = [3857, 3785, 900_913];

/// Proj4 parameters that carry no geodetic meaning for comparisons.
const IGNORED_PARAMS: [&str; 3] = ["+no_defs", "+type=crs", "+wktext"];

/// Coordinate reference system, as an EPSG code or a proj4 string.
///
/// # Example
///
/// ```rust
/// use geolayer::Crs;
///
/// let crs: Crs = "EPSG:3857".parse()?;
/// assert_eq!(crs, Crs::web_mercator());
/// assert!(crs.is_web_mercator());
/// assert!(!crs.is_geographic());
/// # Ok::<(), geolayer::LayerError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// An EPSG registry code such as 4326
    Epsg(i32),
    /// A proj4 definition such as `+proj=longlat +datum=WGS84 +no_defs`
    Proj4(String),
}

impl Crs {
    /// CRS from an EPSG code.
    ///
    /// # Errors
    /// Returns [`LayerError::InvalidCrs`] for non-positive codes.
    pub fn from_epsg(code: i32) -> Result<Self> {
        if code <= 0 {
            return Err(LayerError::InvalidCrs(format!("EPSG code must be positive, got {code}")));
        }
        Ok(Crs::Epsg(code))
    }

    /// CRS from a proj4 string, validated by `proj4rs`.
    ///
    /// # Errors
    /// Returns [`LayerError::InvalidCrs`] if `proj4rs` cannot parse the definition.
    pub fn from_proj4(definition: &str) -> Result<Self> {
        let definition = definition.trim();
        proj4rs::proj::Proj::from_proj_string(definition)
            .map_err(|e| LayerError::InvalidCrs(format!("invalid proj4 string '{definition}': {e:?}")))?;
        Ok(Crs::Proj4(definition.to_string()))
    }

    /// Web Mercator (EPSG:3857).
    #[must_use]
    pub fn web_mercator() -> Self {
        Crs::Epsg(WEB_MERCATOR_EPSG)
    }

    /// WGS84 longitude/latitude (EPSG:4326).
    #[must_use]
    pub fn lat_lng() -> Self {
        Crs::Epsg(LAT_LNG_EPSG)
    }

    /// The EPSG code, when this CRS is identified by one.
    #[must_use]
    pub fn epsg_code(&self) -> Option<i32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Proj4(_) => None,
        }
    }

    /// The proj4 definition, resolved from the database for EPSG codes.
    #[must_use]
    pub fn proj4_string(&self) -> Option<Cow<'_, str>> {
        match self {
            Crs::Epsg(code) => get_proj_string(*code).map(Cow::Borrowed),
            Crs::Proj4(definition) => Some(Cow::Borrowed(definition.as_str())),
        }
    }

    /// True for longitude/latitude systems.
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Epsg(code) => is_geographic_crs(*code),
            Crs::Proj4(definition) => is_longlat_definition(definition),
        }
    }

    /// True for Web Mercator under any of its codes or an equivalent proj4 string.
    #[must_use]
    pub fn is_web_mercator(&self) -> bool {
        match self {
            Crs::Epsg(code) => WEB_MERCATOR_ALIASES.contains(code),
            Crs::Proj4(_) => self.is_equivalent(&Crs::web_mercator()),
        }
    }

    /// Whether two descriptors denote the same coordinate system.
    ///
    /// Identical descriptors are equivalent. Otherwise both are resolved to
    /// proj4 text and compared as parameter sets, ignoring order,
    /// non-geodetic flags, and numeric formatting (`+k=1` equals `+k=1.0`).
    #[must_use]
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        if self == other {
            return true;
        }
        match (self.proj4_string(), other.proj4_string()) {
            (Some(a), Some(b)) => normalize_proj4(&a) == normalize_proj4(&b),
            _ => false,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Proj4(definition) => f.write_str(definition),
        }
    }
}

impl FromStr for Crs {
    type Err = LayerError;

    /// Parse `EPSG:<code>` (any case), a bare code, or a proj4 string starting with `+`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with('+') {
            return Crs::from_proj4(s);
        }
        let code = s
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("epsg:"))
            .map_or(s, |_| &s[5..]);
        code.trim()
            .parse::<i32>()
            .map_err(|_| LayerError::InvalidCrs(format!("unrecognised CRS '{s}'")))
            .and_then(Crs::from_epsg)
    }
}

impl TryFrom<String> for Crs {
    type Error = LayerError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

/// Get PROJ4 string for an EPSG code using the crs-definitions database
#[inline]
#[must_use]
pub fn get_proj_string(epsg: i32) -> Option<&'static str> {
    u16::try_from(epsg).ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Check if an EPSG code represents a geographic (lon/lat) CRS
#[inline]
#[must_use]
pub fn is_geographic_crs(epsg: i32) -> bool {
    if let Some(proj_str) = get_proj_string(epsg) {
        is_longlat_definition(proj_str)
    } else {
        // Codes missing from the database: the 4000 block is geographic
        epsg == LAT_LNG_EPSG || (4000..5000).contains(&epsg)
    }
}

fn is_longlat_definition(definition: &str) -> bool {
    definition
        .split_whitespace()
        .any(|p| p == "+proj=longlat" || p == "+proj=latlong")
}

/// Sorted, de-duplicated parameter list with numbers reformatted.
fn normalize_proj4(definition: &str) -> Vec<String> {
    let mut params: Vec<String> = definition
        .split_whitespace()
        .filter(|p| !IGNORED_PARAMS.contains(p))
        .map(|p| match p.split_once('=') {
            Some((key, value)) => match value.parse::<f64>() {
                Ok(number) => format!("{key}={number}"),
                Err(_) => p.to_string(),
            },
            None => p.to_string(),
        })
        .collect();
    params.sort();
    params.dedup();
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_epsg_forms() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::Epsg(4326));
        assert_eq!("epsg:3857".parse::<Crs>().unwrap(), Crs::Epsg(3857));
        assert_eq!("32633".parse::<Crs>().unwrap(), Crs::Epsg(32633));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("EPSG:abc".parse::<Crs>(), Err(LayerError::InvalidCrs(_))));
        assert!(matches!("mercator".parse::<Crs>(), Err(LayerError::InvalidCrs(_))));
        assert!(matches!(Crs::from_epsg(0), Err(LayerError::InvalidCrs(_))));
    }

    #[test]
    fn test_parse_proj4() {
        let crs: Crs = "+proj=longlat +datum=WGS84 +no_defs".parse().unwrap();
        assert!(matches!(crs, Crs::Proj4(_)));
        assert!(crs.is_geographic());
        assert_eq!(crs.epsg_code(), None);
    }

    #[test]
    fn test_invalid_proj4_rejected() {
        let result = Crs::from_proj4("+proj=nonsense +ellps=WGS84");
        assert!(matches!(result, Err(LayerError::InvalidCrs(_))));
    }

    #[test]
    fn test_display_roundtrip() {
        assert_eq!(Crs::Epsg(2004).to_string(), "EPSG:2004");
        let crs: Crs = Crs::Epsg(2004).to_string().parse().unwrap();
        assert_eq!(crs, Crs::Epsg(2004));
    }

    #[test]
    fn test_equivalence_through_database() {
        let proj = get_proj_string(4326).expect("4326 should be in database");
        let from_string = Crs::from_proj4(proj).unwrap();
        assert!(Crs::lat_lng().is_equivalent(&from_string));
        assert!(from_string.is_equivalent(&Crs::lat_lng()));
        assert!(!Crs::lat_lng().is_equivalent(&Crs::web_mercator()));
    }

    #[test]
    fn test_equivalence_ignores_order_and_number_format() {
        let a = Crs::from_proj4("+proj=merc +a=6378137 +b=6378137 +k=1 +units=m").unwrap();
        let b = Crs::from_proj4("+units=m +k=1.0 +b=6378137 +a=6378137.0 +proj=merc +no_defs").unwrap();
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn test_web_mercator_detection() {
        assert!(Crs::web_mercator().is_web_mercator());
        assert!(Crs::Epsg(900_913).is_web_mercator());
        assert!(!Crs::lat_lng().is_web_mercator());
        let proj = get_proj_string(3857).expect("3857 should be in database");
        assert!(Crs::from_proj4(proj).unwrap().is_web_mercator());
    }

    #[test]
    fn test_is_geographic_crs() {
        assert!(is_geographic_crs(4326), "4326 is geographic");
        assert!(is_geographic_crs(4269), "NAD83 is geographic");
        assert!(!is_geographic_crs(3857), "3857 is projected");
        assert!(!is_geographic_crs(32633), "UTM is projected");
    }

    #[test]
    fn test_get_proj_string_common_codes() {
        assert!(get_proj_string(4326).is_some());
        assert!(get_proj_string(3857).is_some());
        assert!(get_proj_string(32633).is_some());
        assert!(get_proj_string(-1).is_none());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Crs::Epsg(3857)).unwrap();
        assert_eq!(json, "\"EPSG:3857\"");
        let back: Crs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Crs::Epsg(3857));
        assert!(serde_json::from_str::<Crs>("\"nope\"").is_err());
    }
}
