use super::{Map, SolveResult, SolveStatus};
use tracing::{Level, event};

/// What to do when the objective gap exceeds the tolerance
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum OnExceed {
    /// Log a warning and report `within_tolerance = false`
    #[default]
    Warn,
    /// Return [`ReconcileError::ToleranceExceeded`]
    Fail,
}

/// The acceptance policy for comparing the exact and piecewise results
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TolerancePolicy {
    /// The largest acceptable relative objective gap
    pub tolerance: f64,
    /// The reaction to a gap beyond `tolerance`
    #[cfg_attr(feature = "serde", serde(default))]
    pub on_exceed: OnExceed,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            on_exceed: OnExceed::Warn,
        }
    }
}

/// The gap between the two strategies' values of one variable
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableGap {
    /// The value in the exact solve
    pub exact: f64,
    /// The value in the piecewise solve
    pub piecewise: f64,
    /// `|exact − piecewise| / |exact|`, or the absolute difference if `exact` is 0
    pub gap: f64,
}

/// A comparison of an exact and a piecewise-linear solve of the same parameters
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reconciliation {
    /// The exact objective value
    pub exact_objective: f64,
    /// The piecewise objective value
    pub piecewise_objective: f64,
    /// `|exact − piecewise| / |exact|`, or the absolute difference if `exact` is 0
    pub objective_gap: f64,
    /// The gap of every variable present in both assignments, in exact-model order
    pub variables: Map<String, VariableGap>,
    /// Whether `objective_gap` is within the policy's tolerance
    pub within_tolerance: bool,
}

impl Reconciliation {
    /// The variable with the largest gap, if any variables were compared
    pub fn worst_variable(&self) -> Option<(&str, &VariableGap)> {
        self.variables
            .iter()
            .max_by(|a, b| a.1.gap.total_cmp(&b.1.gap))
            .map(|(name, gap)| (name.as_str(), gap))
    }
}

fn relative_gap(reference: f64, other: f64) -> f64 {
    let diff = (reference - other).abs();
    if reference == 0.0 {
        diff
    } else {
        diff / reference.abs()
    }
}

/// Compare the results of the exact and piecewise strategies.
///
/// Variables that only exist in one of the models (such as the piecewise
/// surrogates) are ignored. Both results must be optimal.
pub fn reconcile(
    exact: &SolveResult,
    piecewise: &SolveResult,
    policy: &TolerancePolicy,
) -> Result<Reconciliation, ReconcileError> {
    if !exact.is_optimal() {
        return Err(ReconcileError::NotOptimal {
            strategy: "exact",
            status: exact.status,
        });
    }
    if !piecewise.is_optimal() {
        return Err(ReconcileError::NotOptimal {
            strategy: "piecewise",
            status: piecewise.status,
        });
    }

    let objective_gap = relative_gap(exact.objective, piecewise.objective);

    let variables = exact
        .assignment
        .iter()
        .filter_map(|(name, &exact_value)| {
            piecewise.value(name).map(|piecewise_value| {
                (
                    name.clone(),
                    VariableGap {
                        exact: exact_value,
                        piecewise: piecewise_value,
                        gap: relative_gap(exact_value, piecewise_value),
                    },
                )
            })
        })
        .collect::<Map<String, VariableGap>>();

    // A NaN gap is never within tolerance
    let within_tolerance = objective_gap <= policy.tolerance;

    if !within_tolerance {
        match policy.on_exceed {
            OnExceed::Warn => {
                event!(
                    Level::WARN,
                    gap = objective_gap,
                    tolerance = policy.tolerance,
                    exact = exact.objective,
                    piecewise = piecewise.objective,
                    "piecewise objective deviates from the exact objective beyond tolerance"
                );
            }
            OnExceed::Fail => {
                return Err(ReconcileError::ToleranceExceeded {
                    gap: objective_gap,
                    tolerance: policy.tolerance,
                });
            }
        }
    } else {
        event!(
            Level::DEBUG,
            gap = objective_gap,
            tolerance = policy.tolerance,
            "piecewise objective within tolerance"
        );
    }

    Ok(Reconciliation {
        exact_objective: exact.objective,
        piecewise_objective: piecewise.objective,
        objective_gap,
        variables,
        within_tolerance,
    })
}

/// Errors raised while reconciling two results
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    /// One of the results has no optimal solution to compare
    #[error("the {strategy} solve ended with status {status}")]
    NotOptimal {
        /// Which strategy failed, "exact" or "piecewise"
        strategy: &'static str,
        /// The status it ended with
        status: SolveStatus,
    },
    /// The objective gap exceeds the tolerance under [`OnExceed::Fail`]
    #[error("objective gap {gap} exceeds tolerance {tolerance}")]
    ToleranceExceeded {
        /// The relative objective gap
        gap: f64,
        /// The configured tolerance
        tolerance: f64,
    },
}
