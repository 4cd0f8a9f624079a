/// A sampled vertex `(x, f(x))` of a piecewise-linear function
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Breakpoint {
    /// The input coordinate
    pub x: f64,
    /// The output coordinate, an exact sample of the approximated function
    pub y: f64,
}

impl Breakpoint {
    /// Construct a breakpoint from its coordinates
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The slope of the chord from `self` to `other`.
    ///
    /// Returns an infinite (or NaN) value if both points share the same `x`.
    pub fn slope_to(&self, other: &Self) -> f64 {
        (other.y - self.y) / (other.x - self.x)
    }

    /// Whether both coordinates are finite numbers
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Breakpoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slope() {
        let a = Breakpoint::new(1.0, 1.0);
        let b = Breakpoint::new(3.0, 9.0);
        assert_eq!(a.slope_to(&b), 4.0);
        assert_eq!(b.slope_to(&a), 4.0);
    }

    #[test]
    fn test_vertical_slope() {
        let a = Breakpoint::new(2.0, 1.0);
        let b = Breakpoint::new(2.0, 5.0);
        assert!(a.slope_to(&b).is_infinite());
    }

    #[test]
    fn test_finite() {
        assert!(Breakpoint::from((0.0, 0.0)).is_finite());
        assert!(!Breakpoint::new(f64::NAN, 0.0).is_finite());
        assert!(!Breakpoint::new(0.0, f64::INFINITY).is_finite());
    }
}
