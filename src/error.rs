//! Error type shared by every morphing operation

use thiserror::Error;

/// Errors raised by the warping, weighting and blending operations.
///
/// Source coordinates that fall outside a source image are not an error:
/// the renderer leaves those pixels unwritten and keeps going.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MorphError {
    /// Zero-length feature line, collinear triangle, or an empty triangulation.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Templates (or weights) that do not share the same structure.
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    /// Query coordinate lies outside the triangulated anchor region.
    #[error("query ({x}, {y}) lies outside the anchor hull")]
    OutOfHull { x: f64, y: f64 },

    /// A scalar parameter is out of its allowed range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Weights are negative, non-finite, or do not sum to one.
    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    /// Buffers that must share a size do not.
    #[error("size mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Every warp weight vanished, so the displacement average is undefined.
    #[error("all correspondence weights are zero at ({x}, {y})")]
    ZeroTotalWeight { x: f64, y: f64 },

    /// An operation that needs at least one input received none.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),
}

pub type Result<T> = std::result::Result<T, MorphError>;

impl MorphError {
    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        MorphError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
