//! The detection parameter bundle.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;

/// Significance level the default node test is tabulated for.
pub const DEFAULT_ALPHA: f64 = 1e-6;

/// Detection parameters shared by the object selector and the significance
/// test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Variance of the background noise, in squared image units.
    pub bg_variance: f64,

    /// Poisson-to-variance conversion factor relating pixel intensity to
    /// noise variance: `sigma^2 ~ intensity / gain + bg_variance`.
    pub gain: f64,

    /// Brightness offset factor for moving object markers deeper into the
    /// tree. Zero disables the move pass.
    pub move_factor: f64,

    /// Significance level of the node test.
    pub alpha: f64,

    /// Minimum normalized distance a node must sit above its closest
    /// significant ancestor to be considered at all. Zero disables the
    /// check.
    pub min_distance: f64,

    /// Gates the selector's informational logging.
    pub verbosity_level: u32,
}

impl Parameters {
    /// Creates a parameter bundle with the given noise model and the
    /// defaults `move_factor = 0`, `alpha = 1e-6`, `min_distance = 0`.
    ///
    /// # Errors
    ///
    /// `NonPositiveParameter` if `bg_variance` or `gain` is not positive.
    pub fn new(bg_variance: f64, gain: f64) -> Result<Self, Error> {
        let parameters = Parameters {
            bg_variance,
            gain,
            move_factor: 0.0,
            alpha: DEFAULT_ALPHA,
            min_distance: 0.0,
            verbosity_level: 0,
        };
        parameters.validate()?;
        Ok(parameters)
    }

    pub fn with_move_factor(mut self, move_factor: f64) -> Self {
        self.move_factor = move_factor;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }

    pub fn with_verbosity_level(mut self, verbosity_level: u32) -> Self {
        self.verbosity_level = verbosity_level;
        self
    }

    /// Re-checks every field. The selector calls this before allocating
    /// anything.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.bg_variance > 0.0) {
            return Err(Error::NonPositiveParameter {
                name: "bg_variance",
                value: self.bg_variance,
            });
        }
        if !(self.gain > 0.0) {
            return Err(Error::NonPositiveParameter {
                name: "gain",
                value: self.gain,
            });
        }
        if self.move_factor < 0.0 {
            return Err(Error::NegativeParameter {
                name: "move_factor",
                value: self.move_factor,
            });
        }
        if self.min_distance < 0.0 {
            return Err(Error::NegativeParameter {
                name: "min_distance",
                value: self.min_distance,
            });
        }
        Ok(())
    }
}
