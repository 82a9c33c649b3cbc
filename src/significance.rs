//! Statistical significance of max-tree nodes against the noise model.

use crate::error::Error;
use crate::number::Number;
use crate::objects::ObjectDetection;
use crate::parameters::Parameters;

/// Areas above this clamp to it when evaluating the rejection boundary.
const MAX_TEST_AREA: i32 = 4087;

// Pade coefficients of the rejection boundary for alpha = 1e-6.
const P1: f64 = 1.683355084690155e-01;
const P2: f64 = 3.770229379757511e+02;
const P3: f64 = 1.176722049258011e+05;
const P4: f64 = 6.239836661965291e+06;
const Q1: f64 = 1.354265276841128e+03;
const Q2: f64 = 2.091126298053044e+05;
const Q3: f64 = 1.424803575269314e+06;

/// A pluggable decision rule for whether a node stands out from the noise.
///
/// Implementations own whatever state they need, so alternative tests can
/// be substituted without touching the selector. The selector hands each
/// level root to the test in ascending order of image value, after the
/// node's closest significant ancestor has been established.
pub trait SignificanceTest<T: Number> {
    fn is_significant(&self, detection: &ObjectDetection<'_, T>, node: i32) -> bool;
}

/// The default test: the power the subtree would have relative to its
/// closest significant ancestor, normalized by the local noise variance and
/// area, against a Pade-style rejection boundary in the area.
#[derive(Debug, Clone)]
pub struct PowerTest {
    min_distance: f64,
}

impl PowerTest {
    /// # Errors
    ///
    /// `UnsupportedAlpha` unless `alpha == 1e-6`: the rejection boundary is
    /// tabulated only there.
    pub fn new(parameters: &Parameters) -> Result<Self, Error> {
        if parameters.alpha != 1e-6 {
            return Err(Error::UnsupportedAlpha(parameters.alpha));
        }
        Ok(PowerTest {
            min_distance: parameters.min_distance,
        })
    }

    fn rejection_boundary(area: i32) -> f64 {
        let area = f64::from(area.min(MAX_TEST_AREA));
        let area_2 = area * area;
        let area_3 = area_2 * area;
        (P1 * area_3 + P2 * area_2 + P3 * area + P4) / (area_3 + Q1 * area_2 + Q2 * area + Q3)
    }
}

impl<T: Number> SignificanceTest<T> for PowerTest {
    fn is_significant(&self, detection: &ObjectDetection<'_, T>, node: i32) -> bool {
        let variance = detection.noise_variance(node, None);

        if self.min_distance > 0.0
            && detection.distance(node) / variance.sqrt() < self.min_distance
        {
            return false;
        }

        let power = detection.alternative_power(node, None);
        let area = detection.tree().area(node);
        let normalized = power / variance / f64::from(area);

        normalized > Self::rejection_boundary(area)
    }
}
