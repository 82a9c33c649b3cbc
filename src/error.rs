//! Errors surfaced to callers before any detection work begins.

/// Invalid configuration is reported through this enum before the core
/// allocates anything. Allocation failure and internal invariant violations
/// abort instead; they have no recovery path.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error("image dimensions must be non-zero, got {height}x{width}")]
    EmptyImage { height: usize, width: usize },

    #[error("image dimensions {height}x{width} exceed the supported maximum")]
    ImageTooLarge { height: usize, width: usize },

    #[error("image data has {len} values, expected {height}x{width}")]
    DimensionMismatch {
        len: usize,
        height: usize,
        width: usize,
    },

    #[error("connectivity kernel dimensions must be odd, got {height}x{width}")]
    EvenKernel { height: usize, width: usize },

    #[error("connectivity kernel selects no neighbours")]
    EmptyKernel,

    #[error("{name} must be positive, got {value}")]
    NonPositiveParameter { name: &'static str, value: f64 },

    #[error("{name} must be non-negative, got {value}")]
    NegativeParameter { name: &'static str, value: f64 },

    #[error("rejection boundary is only tabulated for alpha = 1e-6, got {0}")]
    UnsupportedAlpha(f64),
}
