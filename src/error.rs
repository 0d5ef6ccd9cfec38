//! Error types for color parsing, histogram reduction and palette synthesis.

use thiserror::Error;

/// Error type for parsing hex color strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseColorError {
    /// Hex string has invalid length (must be 3 or 6 digits after stripping '#')
    #[error("invalid hex color length {0} (expected 3 or 6 digits)")]
    InvalidLength(usize),
    /// Invalid hexadecimal character encountered
    #[error("invalid hex character: {0:?}")]
    InvalidDigit(char),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid weight {weight} at histogram index {index}")]
    InvalidWeight { index: usize, weight: f64 },

    #[error("merge factor must be finite and non-negative (got {0})")]
    InvalidMergeFactor(f64),

    #[error("palette count must be at least 1")]
    InvalidCount,

    #[error("max primary brightness must be within 0..=1 (got {0})")]
    InvalidBrightness(f64),

    #[error("unable to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid color: {0}")]
    ParseColor(#[from] ParseColorError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
