//! A `Number` is a floating-point pixel type over which the max-tree and its
//! attributes are computed.

use std::fmt::Debug;
use std::fmt::Display;
use std::iter::Sum;
use std::ops::AddAssign;

use num_traits::Float;
use num_traits::NumCast;

/// Collection of the traits a pixel value must satisfy. The tree stores the
/// image and the per-node `volume`/`power` attributes in this type; derived
/// statistics (noise model, significance thresholds, summaries) are computed
/// in `f64` regardless of `T`.
pub trait Number:
    Float + NumCast + AddAssign + Sum + Copy + Debug + Display + Send + Sync + 'static
{
    /// Converts an `f64` into this type, saturating on overflow.
    fn from_f64(value: f64) -> Self;

    /// Converts a node area into this type for the attribute recurrences.
    fn from_i32(value: i32) -> Self;

    /// Returns the value as an `f64`.
    fn as_f64(self) -> f64;
}

impl Number for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn from_i32(value: i32) -> Self {
        value as f32
    }

    fn as_f64(self) -> f64 {
        <f64 as From<f32>>::from(self)
    }
}

impl Number for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn from_i32(value: i32) -> Self {
        <f64 as From<i32>>::from(value)
    }

    fn as_f64(self) -> f64 {
        self
    }
}
