use pwl_core::models::{
    ApproximationError, BuildError, Mode, OptimizationModel, ProblemParameters, ReconcileError,
    Reconciliation, SolveResult, StepKind, TolerancePolicy, build, price_approximations,
    reconcile,
};
use pwl_core::ports::SolverAdapter;
use std::sync::Arc;
use tracing::{Level, event};

/// How the piecewise strategy is set up and judged
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComparisonConfig {
    /// Segments per price approximation
    pub segment_count: usize,
    /// Breakpoint spacing of the approximations
    #[cfg_attr(feature = "serde", serde(default))]
    pub step: StepKind,
    /// Acceptance policy for the objective gap
    #[cfg_attr(feature = "serde", serde(default))]
    pub policy: TolerancePolicy,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            segment_count: 1250,
            step: StepKind::Continuous,
            policy: TolerancePolicy::default(),
        }
    }
}

/// The outcome of solving the same parameters with both strategies
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Comparison {
    /// The result of the exact (quadratic revenue) model
    pub exact: SolveResult,
    /// The result of the piecewise-linear model
    pub piecewise: SolveResult,
    /// How far the two results are apart
    pub reconciliation: Reconciliation,
}

fn models(
    params: &ProblemParameters,
    config: &ComparisonConfig,
) -> Result<(OptimizationModel, OptimizationModel), CompareError> {
    let approximations = price_approximations(params, config.segment_count, config.step)?;
    let exact = build(params, &Mode::Exact)?;
    let piecewise = build(params, &Mode::PiecewiseLinear(approximations))?;
    Ok((exact, piecewise))
}

fn finish(
    exact: SolveResult,
    piecewise: SolveResult,
    config: &ComparisonConfig,
) -> Result<Comparison, CompareError> {
    event!(
        Level::INFO,
        exact_status = %exact.status,
        exact_objective = exact.objective,
        piecewise_status = %piecewise.status,
        piecewise_objective = piecewise.objective,
        "solved both strategies"
    );
    let reconciliation = reconcile(&exact, &piecewise, &config.policy)?;
    Ok(Comparison {
        exact,
        piecewise,
        reconciliation,
    })
}

/// Build and solve both the exact and the piecewise model, one after the other,
/// and reconcile the results.
pub fn compare<S: SolverAdapter>(
    solver: &S,
    params: &ProblemParameters,
    config: &ComparisonConfig,
) -> Result<Comparison, CompareError> {
    let (exact, piecewise) = models(params, config)?;
    let exact = solver.solve(&exact);
    let piecewise = solver.solve(&piecewise);
    finish(exact, piecewise, config)
}

/// Like [`compare`], but both solves run concurrently on tokio's blocking pool.
///
/// The models share nothing mutable; the only shared data are the immutable
/// approximations inside the piecewise model.
pub async fn compare_parallel<S>(
    solver: Arc<S>,
    params: &ProblemParameters,
    config: &ComparisonConfig,
) -> Result<Comparison, CompareError>
where
    S: SolverAdapter + Send + Sync + 'static,
{
    let (exact, piecewise) = models(params, config)?;

    let exact = tokio::task::spawn_blocking({
        let solver = Arc::clone(&solver);
        move || solver.solve(&exact)
    });
    let piecewise = tokio::task::spawn_blocking(move || solver.solve(&piecewise));

    let exact = exact.await?;
    let piecewise = piecewise.await?;
    finish(exact, piecewise, config)
}

/// Errors raised while comparing the two strategies
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    /// The price approximations could not be generated
    #[error(transparent)]
    Approximation(#[from] ApproximationError),
    /// A model could not be built
    #[error(transparent)]
    Build(#[from] BuildError),
    /// The results could not be reconciled
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    /// A solve task panicked or was cancelled
    #[error("solver task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
