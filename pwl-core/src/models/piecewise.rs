mod breakpoint;
pub use breakpoint::Breakpoint;

// Relative slack used when comparing consecutive slopes. Slopes of exactly
// sampled convex functions can still come out a few ulps out of order once the
// chord differences are rounded.
const CONVEXITY_EPS: f64 = 1e-9;

/// A piecewise-linear function defined by ordered breakpoints
///
/// Inside `[first.x, last.x]` the function linearly interpolates between
/// neighboring breakpoints. Outside of that interval it extends linearly with
/// the `left_slope` and `right_slope` respectively.
///
/// A valid function has:
/// - at least two breakpoints,
/// - finite coordinates and extension slopes,
/// - strictly increasing `x` coordinates.
///
/// Convexity is not required for validity; use [`PiecewiseFunction::is_convex`]
/// to check it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "PiecewiseFunctionDto", into = "PiecewiseFunctionDto")
)]
pub struct PiecewiseFunction {
    breakpoints: Vec<Breakpoint>,
    left_slope: f64,
    right_slope: f64,
}

impl PiecewiseFunction {
    /// Creates a new piecewise function, validating all constraints
    pub fn new(
        breakpoints: Vec<Breakpoint>,
        left_slope: f64,
        right_slope: f64,
    ) -> Result<Self, PiecewiseError> {
        Self::try_from(PiecewiseFunctionDto {
            breakpoints,
            left_slope,
            right_slope,
        })
    }

    /// Creates a new piecewise function without validating the breakpoints
    ///
    /// # Safety
    ///
    /// The caller must guarantee the breakpoints satisfy every requirement
    /// checked by [`PiecewiseFunction::new`]. Evaluation and the solver
    /// encodings index into the breakpoints assuming at least two of them in
    /// strictly increasing order.
    pub unsafe fn new_unchecked(
        breakpoints: Vec<Breakpoint>,
        left_slope: f64,
        right_slope: f64,
    ) -> Self {
        Self {
            breakpoints,
            left_slope,
            right_slope,
        }
    }

    /// The ordered breakpoints
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// The number of linear segments between the breakpoints
    pub fn segment_count(&self) -> usize {
        self.breakpoints.len() - 1
    }

    /// The slope used to extend the function to the left of the first breakpoint
    pub fn left_slope(&self) -> f64 {
        self.left_slope
    }

    /// The slope used to extend the function to the right of the last breakpoint
    pub fn right_slope(&self) -> f64 {
        self.right_slope
    }

    /// The interval covered by the breakpoints, `(first.x, last.x)`
    pub fn domain(&self) -> (f64, f64) {
        // Safe to index: validation guarantees at least two breakpoints
        (
            self.breakpoints[0].x,
            self.breakpoints[self.breakpoints.len() - 1].x,
        )
    }

    /// Whether `[lo, hi]` lies within the breakpoint domain
    pub fn covers(&self, lo: f64, hi: f64) -> bool {
        let (min, max) = self.domain();
        min <= lo && hi <= max
    }

    /// The slope of each segment, in order
    pub fn slopes(&self) -> impl Iterator<Item = f64> + '_ {
        self.breakpoints
            .windows(2)
            .map(|pair| pair[0].slope_to(&pair[1]))
    }

    /// Each segment written as a line `y = slope · x + intercept`.
    ///
    /// For a convex function the pointwise maximum of these lines equals the
    /// function on its domain, which is what an epigraph encoding relies on.
    pub fn segment_pieces(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.breakpoints.windows(2).map(|pair| {
            let slope = pair[0].slope_to(&pair[1]);
            (slope, pair[0].y - slope * pair[0].x)
        })
    }

    /// Whether the segment slopes (including the extensions) are non-decreasing
    pub fn is_convex(&self) -> bool {
        let slopes = std::iter::once(self.left_slope)
            .chain(self.slopes())
            .chain(std::iter::once(self.right_slope))
            .collect::<Vec<_>>();

        slopes.windows(2).all(|pair| {
            let slack = CONVEXITY_EPS * (pair[0].abs() + pair[1].abs() + 1.0);
            pair[0] <= pair[1] + slack
        })
    }

    /// Evaluate the function at `x`
    pub fn evaluate(&self, x: f64) -> f64 {
        let first = &self.breakpoints[0];
        let last = &self.breakpoints[self.breakpoints.len() - 1];

        if x < first.x {
            return first.y + self.left_slope * (x - first.x);
        }
        if x > last.x {
            return last.y + self.right_slope * (x - last.x);
        }

        // The first breakpoint strictly to the right of x. Since x >= first.x,
        // this is at least 1; it equals len only when x == last.x.
        let idx = self.breakpoints.partition_point(|bp| bp.x <= x);
        if idx == self.breakpoints.len() {
            return last.y;
        }

        let a = &self.breakpoints[idx - 1];
        let b = &self.breakpoints[idx];
        // Written so that x == a.x reproduces a.y exactly
        a.y + (b.y - a.y) * ((x - a.x) / (b.x - a.x))
    }

    /// The smallest and largest values the function takes on `[lo, hi]`.
    ///
    /// A piecewise-linear function attains its extremes over an interval at
    /// the interval's ends or at a breakpoint inside it.
    pub fn range(&self, lo: f64, hi: f64) -> (f64, f64) {
        std::iter::once(self.evaluate(lo))
            .chain(std::iter::once(self.evaluate(hi)))
            .chain(
                self.breakpoints
                    .iter()
                    .filter(|bp| lo <= bp.x && bp.x <= hi)
                    .map(|bp| bp.y),
            )
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), y| {
                (min.min(y), max.max(y))
            })
    }

    /// The worst-case gap between this interpolant and `x²` on the covered domain.
    ///
    /// On a segment of width `w` the chord of `x²` overestimates it by at most
    /// `w² / 4` (attained at the midpoint), so this is that bound for the widest
    /// segment. It is only meaningful when the breakpoints sample `x²`.
    pub fn max_square_error(&self) -> f64 {
        self.breakpoints
            .windows(2)
            .map(|pair| {
                let width = pair[1].x - pair[0].x;
                width * width / 4.0
            })
            .fold(0.0, f64::max)
    }
}

/// DTO to ensure that we always validate when we deserialize from an untrusted source
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug)]
pub struct PiecewiseFunctionDto {
    /// The breakpoints, ordered by strictly increasing `x`
    pub breakpoints: Vec<Breakpoint>,
    /// The slope to the left of the first breakpoint
    pub left_slope: f64,
    /// The slope to the right of the last breakpoint
    pub right_slope: f64,
}

impl From<PiecewiseFunction> for PiecewiseFunctionDto {
    fn from(value: PiecewiseFunction) -> Self {
        Self {
            breakpoints: value.breakpoints,
            left_slope: value.left_slope,
            right_slope: value.right_slope,
        }
    }
}

impl TryFrom<PiecewiseFunctionDto> for PiecewiseFunction {
    type Error = PiecewiseError;

    fn try_from(value: PiecewiseFunctionDto) -> Result<Self, Self::Error> {
        if value.breakpoints.len() < 2 {
            return Err(PiecewiseError::TooFewBreakpoints(value.breakpoints.len()));
        }
        if !(value.left_slope.is_finite() && value.right_slope.is_finite()) {
            return Err(PiecewiseError::NonFinite);
        }
        if !value.breakpoints.iter().all(Breakpoint::is_finite) {
            return Err(PiecewiseError::NonFinite);
        }
        if let Some(index) = value
            .breakpoints
            .windows(2)
            .position(|pair| !(pair[0].x < pair[1].x))
        {
            return Err(PiecewiseError::NonIncreasing(index + 1));
        }

        Ok(Self {
            breakpoints: value.breakpoints,
            left_slope: value.left_slope,
            right_slope: value.right_slope,
        })
    }
}

/// Errors that can occur when creating or validating a PiecewiseFunction
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum PiecewiseError {
    /// Fewer than two breakpoints were provided
    #[error("at least two breakpoints are required, got {0}")]
    TooFewBreakpoints(usize),
    /// A coordinate or extension slope is NaN or infinite
    #[error("breakpoints and slopes must be finite")]
    NonFinite,
    /// The breakpoint at this index does not lie strictly to the right of its predecessor
    #[error("breakpoint {0} does not strictly increase in x")]
    NonIncreasing(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(points: &[f64]) -> PiecewiseFunction {
        let breakpoints = points
            .iter()
            .map(|&x| Breakpoint::new(x, x * x))
            .collect::<Vec<_>>();
        PiecewiseFunction::new(breakpoints, 0.0, 2.0 * points[points.len() - 1]).unwrap()
    }

    #[test]
    fn test_too_few() {
        assert_eq!(
            PiecewiseFunction::new(vec![], 0.0, 0.0).unwrap_err(),
            PiecewiseError::TooFewBreakpoints(0)
        );
        assert_eq!(
            PiecewiseFunction::new(vec![Breakpoint::new(0.0, 0.0)], 0.0, 0.0).unwrap_err(),
            PiecewiseError::TooFewBreakpoints(1)
        );
    }

    #[test]
    fn test_non_finite() {
        assert_eq!(
            PiecewiseFunction::new(
                vec![Breakpoint::new(0.0, f64::NAN), Breakpoint::new(1.0, 1.0)],
                0.0,
                0.0
            )
            .unwrap_err(),
            PiecewiseError::NonFinite
        );
        assert_eq!(
            PiecewiseFunction::new(
                vec![Breakpoint::new(0.0, 0.0), Breakpoint::new(1.0, 1.0)],
                f64::NEG_INFINITY,
                0.0
            )
            .unwrap_err(),
            PiecewiseError::NonFinite
        );
    }

    #[test]
    fn test_duplicate_x() {
        assert_eq!(
            PiecewiseFunction::new(
                vec![
                    Breakpoint::new(0.0, 0.0),
                    Breakpoint::new(1.0, 1.0),
                    Breakpoint::new(1.0, 2.0),
                ],
                0.0,
                0.0
            )
            .unwrap_err(),
            PiecewiseError::NonIncreasing(2)
        );
    }

    #[test]
    fn test_decreasing_x() {
        assert_eq!(
            PiecewiseFunction::new(
                vec![Breakpoint::new(1.0, 1.0), Breakpoint::new(0.0, 0.0)],
                0.0,
                0.0
            )
            .unwrap_err(),
            PiecewiseError::NonIncreasing(1)
        );
    }

    #[test]
    fn test_evaluate_interior() {
        let f = square(&[0.0, 1.0, 2.0, 4.0]);
        assert_eq!(f.evaluate(0.0), 0.0);
        assert_eq!(f.evaluate(0.5), 0.5);
        assert_eq!(f.evaluate(1.0), 1.0);
        assert_eq!(f.evaluate(1.5), 2.5);
        assert_eq!(f.evaluate(3.0), 10.0);
        assert_eq!(f.evaluate(4.0), 16.0);
    }

    #[test]
    fn test_evaluate_extension() {
        let f = square(&[0.0, 1.0, 2.0]);
        // left slope 0, right slope 4
        assert_eq!(f.evaluate(-3.0), 0.0);
        assert_eq!(f.evaluate(3.0), 8.0);
    }

    #[test]
    fn test_slopes_and_pieces() {
        let f = square(&[0.0, 1.0, 3.0]);
        assert_eq!(f.slopes().collect::<Vec<_>>(), vec![1.0, 4.0]);
        assert_eq!(
            f.segment_pieces().collect::<Vec<_>>(),
            vec![(1.0, 0.0), (4.0, -3.0)]
        );
        assert_eq!(f.segment_count(), 2);
    }

    #[test]
    fn test_convexity() {
        assert!(square(&[0.0, 1.0, 2.0, 5.0]).is_convex());

        // A concave tent
        let tent = PiecewiseFunction::new(
            vec![
                Breakpoint::new(0.0, 0.0),
                Breakpoint::new(1.0, 1.0),
                Breakpoint::new(2.0, 0.0),
            ],
            1.0,
            -1.0,
        )
        .unwrap();
        assert!(!tent.is_convex());

        // Convex interior, but an extension that bends the wrong way
        let bent = PiecewiseFunction::new(
            vec![Breakpoint::new(0.0, 0.0), Breakpoint::new(1.0, 1.0)],
            0.0,
            0.0,
        )
        .unwrap();
        assert!(!bent.is_convex());
    }

    #[test]
    fn test_domain_and_cover() {
        let f = square(&[0.0, 2.0, 5.0]);
        assert_eq!(f.domain(), (0.0, 5.0));
        assert!(f.covers(0.0, 5.0));
        assert!(f.covers(1.0, 2.0));
        assert!(!f.covers(0.0, 5.5));
        assert!(!f.covers(-1.0, 5.0));
    }

    #[test]
    fn test_range() {
        let f = square(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(f.range(0.0, 3.0), (0.0, 9.0));
        assert_eq!(f.range(1.5, 2.5), (2.5, 6.5));
    }

    #[test]
    fn test_max_square_error() {
        let f = square(&[0.0, 1.0, 3.0]);
        assert_eq!(f.max_square_error(), 1.0);
        // The midpoint of the widest segment attains the bound
        assert_eq!(f.evaluate(2.0) - 4.0, 1.0);
    }
}
