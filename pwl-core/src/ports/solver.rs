use crate::models::{OptimizationModel, SolveResult};

/// Interface for optimization backends that solve an assembled model.
///
/// An adapter owns its configuration and nothing else; every call to
/// [`SolverAdapter::solve`] starts from scratch. Backend failures never
/// panic, they are reported through [`SolveResult::status`].
pub trait SolverAdapter {
    /// The configuration type for this adapter (verbosity, time limits, tolerances, ...)
    type Settings;

    /// Create a new instance with the provided settings
    fn new(settings: Self::Settings) -> Self;

    /// Solve `model` and report the outcome.
    ///
    /// # Returns
    ///
    /// A [`SolveResult`] whose assignment (when optimal) has one entry per
    /// model variable, keyed by variable name, and whose objective is in the
    /// model's own sense.
    fn solve(&self, model: &OptimizationModel) -> SolveResult;
}
