use crate::{Csc, PiecewiseEncoding, StandardForm, lower};
use clarabel::{algebra::*, solver::*};
use pwl_core::models::{OptimizationModel, SolveResult, SolveStatus};
use pwl_core::ports::SolverAdapter;
use tracing::{Level, event};

/// A solver adapter that uses the Clarabel interior point solver.
///
/// Clarabel solves the lowered quadratic program to high accuracy and is the
/// default backend.
pub struct ClarabelSolver {
    settings: DefaultSettings<f64>,
    encoding: PiecewiseEncoding,
}

impl Default for ClarabelSolver {
    fn default() -> Self {
        let mut settings = DefaultSettings::default();
        settings.verbose = false;
        Self::new(settings)
    }
}

impl ClarabelSolver {
    /// Use `encoding` for interpolation constraints
    pub fn with_encoding(mut self, encoding: PiecewiseEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The backend settings
    pub fn settings(&self) -> &DefaultSettings<f64> {
        &self.settings
    }
}

fn matrix(csc: Csc) -> CscMatrix<f64> {
    CscMatrix {
        m: csc.nrows,
        n: csc.ncols,
        colptr: csc.colptr,
        rowval: csc.rowval,
        nzval: csc.nzval,
    }
}

fn status(status: SolverStatus) -> SolveStatus {
    match status {
        SolverStatus::Solved | SolverStatus::AlmostSolved => SolveStatus::Optimal,
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
            SolveStatus::Infeasible
        }
        SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
            SolveStatus::Unbounded
        }
        SolverStatus::MaxTime => SolveStatus::Timeout,
        _ => SolveStatus::SolverError,
    }
}

impl SolverAdapter for ClarabelSolver {
    type Settings = DefaultSettings<f64>;

    fn new(settings: Self::Settings) -> Self {
        Self {
            settings,
            encoding: PiecewiseEncoding::default(),
        }
    }

    fn solve(&self, model: &OptimizationModel) -> SolveResult {
        let form = match lower(model, self.encoding) {
            Ok(form) => form,
            Err(error) => {
                event!(Level::WARN, model = model.name(), %error, "model cannot be lowered");
                return SolveResult::without_solution(SolveStatus::SolverError);
            }
        };

        let StandardForm {
            columns,
            linear,
            rows,
            ..
        } = &form;

        // Clarabel handles constraints via a cone specification, e.g. Ax + s = b, where s is a cone.
        // The equality rows go first, into the zero cone.
        let mut triplets = Vec::new();
        let mut b = Vec::new();

        for row in rows.iter().filter(|row| row.is_equality()) {
            for &(j, a) in row.terms.iter() {
                triplets.push((b.len(), j, a));
            }
            b.push(row.upper);
        }
        let nzero = b.len();

        // The remaining limits become s ≥ 0 rows. The signs on the lower
        // limits are flipped so that -Ax + s = -lower.
        for row in rows.iter().filter(|row| !row.is_equality()) {
            if row.lower.is_finite() {
                for &(j, a) in row.terms.iter() {
                    triplets.push((b.len(), j, -a));
                }
                b.push(-row.lower);
            }
            if row.upper.is_finite() {
                for &(j, a) in row.terms.iter() {
                    triplets.push((b.len(), j, a));
                }
                b.push(row.upper);
            }
        }

        let mut cones = Vec::new();
        if nzero > 0 {
            cones.push(ZeroConeT(nzero));
        }
        if b.len() > nzero {
            cones.push(NonnegativeConeT(b.len() - nzero));
        }

        let a_matrix = matrix(Csc::from_triplets(b.len(), *columns, triplets));
        let p_matrix = matrix(form.hessian_matrix());

        let mut solver = match DefaultSolver::new(
            &p_matrix,
            linear,
            &a_matrix,
            &b,
            &cones,
            self.settings.clone(),
        ) {
            Ok(solver) => solver,
            Err(error) => {
                event!(Level::WARN, model = model.name(), ?error, "unable to set up clarabel");
                return SolveResult::without_solution(SolveStatus::SolverError);
            }
        };

        solver.solve();

        let outcome = status(solver.solution.status);
        event!(
            Level::DEBUG,
            model = model.name(),
            status = ?solver.solution.status,
            iterations = solver.solution.iterations,
            "clarabel finished"
        );

        if outcome == SolveStatus::Optimal {
            form.solution(model, &solver.solution.x)
        } else {
            SolveResult::without_solution(outcome)
        }
    }
}
