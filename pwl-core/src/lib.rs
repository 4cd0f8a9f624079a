#![warn(missing_docs)]
//! Core models for approximating a monopolist's two-product pricing problem.
//!
//! The quadratic revenue `price · quantity` of each product is replaced by a
//! piecewise-linear surrogate of `price²`, turning a nonlinear program into one
//! that any linear or convex solver can handle. This crate holds the pieces of
//! that technique which do not depend on a particular solver:
//!
//! - [`models::approximate`] samples a convex function into a [`models::PiecewiseFunction`],
//! - [`models::build`] assembles an [`models::OptimizationModel`] in either the exact or the
//!   piecewise-linear form,
//! - [`models::reconcile`] measures how far the two strategies' results are apart,
//! - [`ports::SolverAdapter`] is the seam a concrete solver plugs into.

/// Domain models: parameters, piecewise functions, optimization models and results.
///
/// The models are plain data with validation at construction time. Nothing in
/// here performs I/O or talks to a solver.
pub mod models;

/// Interface traits implemented outside of this crate.
///
/// These are the "ports" that concrete solver backends implement, keeping the
/// model construction decoupled from any particular optimization library.
pub mod ports;
