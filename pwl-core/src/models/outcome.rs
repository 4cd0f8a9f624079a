use super::Map;
use std::fmt;

/// How a solve attempt ended
///
/// Infeasibility and unboundedness are ordinary outcomes the caller is
/// expected to branch on. Solver errors and timeouts are passed through
/// unchanged; nothing in this workspace retries them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum SolveStatus {
    /// An optimal assignment was found
    Optimal,
    /// The constraints cannot all be satisfied
    Infeasible,
    /// The objective can be improved without limit
    Unbounded,
    /// The backend failed, or the model is outside what the backend supports
    SolverError,
    /// The backend's time limit was reached before convergence
    Timeout,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimal => "optimal",
            Self::Infeasible => "infeasible",
            Self::Unbounded => "unbounded",
            Self::SolverError => "solver_error",
            Self::Timeout => "timeout",
        }
        .fmt(f)
    }
}

/// The result of handing an optimization model to a solver adapter
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveResult {
    /// How the solve ended
    pub status: SolveStatus,
    /// The value of each variable by name, in model order. Empty unless optimal.
    pub assignment: Map<String>,
    /// The objective value in the model's own sense. NaN unless optimal.
    pub objective: f64,
}

impl SolveResult {
    /// A successful solve
    pub fn optimal(assignment: Map<String>, objective: f64) -> Self {
        Self {
            status: SolveStatus::Optimal,
            assignment,
            objective,
        }
    }

    /// A solve that produced no usable assignment
    pub fn without_solution(status: SolveStatus) -> Self {
        Self {
            status,
            assignment: Map::default(),
            objective: f64::NAN,
        }
    }

    /// Whether the status is [`SolveStatus::Optimal`]
    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    /// The value assigned to the variable `name`, if any
    pub fn value(&self, name: &str) -> Option<f64> {
        self.assignment.get(name).copied()
    }
}
