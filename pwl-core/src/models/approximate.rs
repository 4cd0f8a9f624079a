use super::{Breakpoint, PiecewiseFunction};
use tracing::{Level, event};

/// How the segment width is derived from the domain and segment count
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum StepKind {
    /// `step = ub / n`, for real-valued variables
    #[default]
    Continuous,
    /// `step = floor(ub / n)`, for integer-valued variables. The remainder
    /// `floor(ub) - n · step` is spread one unit at a time over the leading
    /// segments, so no segment is wider than `step + 1`.
    Integral,
}

/// The configuration surface of the approximator, one per approximated variable
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ApproximationConfig {
    /// The upper end of the domain `[0, ub]`; must be positive and finite
    pub domain_upper_bound: f64,
    /// The number of segments; must be at least 1
    pub segment_count: usize,
    /// How to compute the segment width
    #[cfg_attr(feature = "serde", serde(default))]
    pub step: StepKind,
}

impl ApproximationConfig {
    /// A configuration with a real-valued step
    pub fn new(domain_upper_bound: f64, segment_count: usize) -> Self {
        Self {
            domain_upper_bound,
            segment_count,
            step: StepKind::Continuous,
        }
    }

    /// A configuration with an integer-valued step
    pub fn integral(domain_upper_bound: f64, segment_count: usize) -> Self {
        Self {
            domain_upper_bound,
            segment_count,
            step: StepKind::Integral,
        }
    }

    /// Validate the configuration and compute the (narrowest) segment width
    pub fn step_width(&self) -> Result<f64, ApproximationError> {
        let ub = self.domain_upper_bound;
        if !(ub > 0.0 && ub.is_finite()) {
            return Err(ApproximationError::InvalidDomain(ub));
        }
        if self.segment_count < 1 {
            return Err(ApproximationError::InvalidSegmentCount(self.segment_count));
        }

        let raw = ub / self.segment_count as f64;
        let step = match self.step {
            StepKind::Continuous => raw,
            StepKind::Integral => raw.floor(),
        };

        if step > 0.0 && step.is_finite() {
            Ok(step)
        } else {
            Err(ApproximationError::DegenerateStep(step))
        }
    }
}

/// Sample `f` on `[0, ub]` into a piecewise-linear interpolant.
///
/// Breakpoints sit at `x_i = i · step` for `i = 0 … n-1`, followed by a closing
/// breakpoint at exactly `ub`, so the result always has `n + 1` breakpoints and
/// covers the whole domain. With an integral step the first `floor(ub) - n · step`
/// segments are one unit wider, which keeps every breakpoint but the closing one
/// on an integer and every segment at most `step + 1` wide.
///
/// The function is extended beyond the domain with the slopes of its first and
/// last segments, which keeps the interpolant convex whenever `f` is.
pub fn approximate<F: Fn(f64) -> f64>(
    f: F,
    config: &ApproximationConfig,
) -> Result<PiecewiseFunction, ApproximationError> {
    let step = config.step_width()?;
    let n = config.segment_count;
    let ub = config.domain_upper_bound;

    let widened = match config.step {
        StepKind::Continuous => 0,
        // less than n, since ub < n · (step + 1)
        StepKind::Integral => (ub.floor() - n as f64 * step) as usize,
    };

    let mut breakpoints: Vec<Breakpoint> = Vec::with_capacity(n.saturating_add(1));
    for x in (0..n)
        .map(|i| i as f64 * step + i.min(widened) as f64)
        .chain(std::iter::once(ub))
    {
        if let Some(prev) = breakpoints.last() {
            // Catches both a rounding collapse of i · step and a closing point
            // that would not lie beyond the last regular sample.
            if !(prev.x < x) {
                return Err(ApproximationError::DegenerateStep(step));
            }
        }
        let y = f(x);
        if !y.is_finite() {
            return Err(ApproximationError::NonFiniteSample(x));
        }
        breakpoints.push(Breakpoint::new(x, y));
    }

    // n >= 1, so there are at least two breakpoints here
    let left_slope = breakpoints[0].slope_to(&breakpoints[1]);
    let right_slope = breakpoints[n - 1].slope_to(&breakpoints[n]);
    if !(left_slope.is_finite() && right_slope.is_finite()) {
        return Err(ApproximationError::NonFiniteSlope);
    }

    event!(
        Level::DEBUG,
        segments = n,
        step,
        upper_bound = ub,
        "sampled piecewise-linear approximation"
    );

    // Safety: at least two breakpoints, all finite, strictly increasing in x,
    // and both slopes were checked to be finite.
    Ok(unsafe { PiecewiseFunction::new_unchecked(breakpoints, left_slope, right_slope) })
}

/// Approximate `x ↦ x²`, the term that replaces the bilinear revenue `p · q`
pub fn approximate_square(config: &ApproximationConfig) -> Result<PiecewiseFunction, ApproximationError> {
    approximate(|x| x * x, config)
}

/// Errors raised while constructing an approximation
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ApproximationError {
    /// The domain upper bound is not a positive, finite number
    #[error("domain upper bound must be positive and finite, got {0}")]
    InvalidDomain(f64),
    /// Fewer than one segment was requested
    #[error("segment count must be at least 1, got {0}")]
    InvalidSegmentCount(usize),
    /// The step collapsed to a value that cannot produce strictly increasing breakpoints
    #[error("step {0} is too small to produce strictly increasing breakpoints")]
    DegenerateStep(f64),
    /// The approximated function returned a NaN or infinite value
    #[error("the function is not finite at x = {0}")]
    NonFiniteSample(f64),
    /// A chord between two finite samples overflowed
    #[error("an extension slope of the approximation is not finite")]
    NonFiniteSlope,
}
