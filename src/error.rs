//! Error type shared by every layer-construction stage.

use thiserror::Error;

/// Errors raised while building extents, bounds, layouts and metadata.
///
/// Every error is raised at the point of construction or aggregation, so a
/// value that exists has passed its checks.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Invalid or empty strategy input.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Inputs do not share a coordinate reference system.
    #[error("CRS mismatch at input {index}: expected {expected}, found {found}")]
    CrsMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// Inputs carry pixel types that cannot be widened into one.
    #[error("cell type mismatch at input {index}: cannot reconcile {expected} with {found}")]
    CellTypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// Min key greater than max key, or keys of different variants.
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("invalid extent: {0}")]
    InvalidExtent(String),

    #[error("invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("invalid cell type: {0}")]
    InvalidCellType(String),

    #[error("layer not found: {0}")]
    LayerNotFound(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LayerError>;
