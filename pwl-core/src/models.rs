mod approximate;
mod build;
mod map;
mod model;
mod outcome;
mod parameters;
mod piecewise;
mod reconcile;

pub use approximate::{
    ApproximationConfig, ApproximationError, StepKind, approximate, approximate_square,
};
pub use build::{
    BuildError, Mode, build, demand_constraint, price_approximations, price_var, quantity_var,
    square_constraint, surrogate_var,
};
pub use map::Map;
pub use model::{
    DecisionVariable, LinearConstraint, LinearExpr, ModelError, Objective, OptimizationModel,
    PiecewiseConstraint, Relation, Sense, VarId,
};
pub use outcome::{SolveResult, SolveStatus};
pub use parameters::{
    DemandCurve, ParameterError, ProblemParameters, ProblemParametersDto, Product, Resource,
};
pub use piecewise::{Breakpoint, PiecewiseError, PiecewiseFunction, PiecewiseFunctionDto};
pub use reconcile::{
    OnExceed, ReconcileError, Reconciliation, TolerancePolicy, VariableGap, reconcile,
};

// Deterministic iteration order for name bookkeeping
pub(crate) type Set<T> = indexmap::IndexSet<T, rustc_hash::FxBuildHasher>;
