#![warn(missing_docs)]
//! Solver backends for the piecewise-linear pricing models.
//!
//! Every backend implements [`SolverAdapter`] for an
//! [`OptimizationModel`](pwl_core::models::OptimizationModel): the model is
//! lowered to a convex quadratic program in [`StandardForm`] and handed to the
//! backend, and the backend's verdict is mapped onto a
//! [`SolveStatus`](pwl_core::models::SolveStatus).
//!
//! Besides the backends this crate can write a model in CPLEX LP format and
//! run both solution strategies side by side.

/**
 * These are the concrete backends.
 */
mod impls;
pub use impls::*;

/**
 * The shared rewrite of a model into the form the backends consume.
 */
mod standard;
pub use standard::{Csc, LoweringError, PiecewiseEncoding, Row, StandardForm, lower};

mod export;
pub use export::export_lp;

mod compare;
pub use compare::{CompareError, Comparison, ComparisonConfig, compare, compare_parallel};

pub use pwl_core::ports::SolverAdapter;

// We use non-std collections here for their ordering semantics and performance
pub(crate) type Map<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;
pub(crate) type Set<T> = indexmap::IndexSet<T, rustc_hash::FxBuildHasher>;
