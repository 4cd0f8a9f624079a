use crate::{Csc, PiecewiseEncoding, lower};
use osqp::{CscMatrix, Problem, Settings, Status};
use pwl_core::models::{OptimizationModel, SolveResult, SolveStatus};
use pwl_core::ports::SolverAdapter;
use tracing::{Level, event};

/// A solver adapter that uses the OSQP (Operator Splitting Quadratic Program)
/// solver.
///
/// OSQP uses the Alternating Direction Method of Multipliers (ADMM) approach,
/// which can be faster than interior point methods for large-scale problems,
/// though sometimes with lower precision. The default settings tighten the
/// tolerances and enable solution polishing to compensate.
pub struct OsqpSolver {
    settings: Settings,
    encoding: PiecewiseEncoding,
}

impl Default for OsqpSolver {
    fn default() -> Self {
        Self::new(
            Settings::default()
                .verbose(false)
                .polish(true)
                .eps_abs(1e-7)
                .eps_rel(1e-7)
                .max_iter(200_000),
        )
    }
}

impl OsqpSolver {
    /// Use `encoding` for interpolation constraints
    pub fn with_encoding(mut self, encoding: PiecewiseEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

fn matrix(csc: Csc) -> CscMatrix<'static> {
    CscMatrix {
        nrows: csc.nrows,
        ncols: csc.ncols,
        indptr: csc.colptr.into(),
        indices: csc.rowval.into(),
        data: csc.nzval.into(),
    }
}

impl SolverAdapter for OsqpSolver {
    type Settings = Settings;

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

        // OSQP handles constraints via a box specification, e.g. lb <= Ax <= ub,
        // where equality is handled via setting lb[i] = ub[i].
        let lb = form.rows.iter().map(|row| row.lower).collect::<Vec<_>>();
        let ub = form.rows.iter().map(|row| row.upper).collect::<Vec<_>>();

        let a_matrix = matrix(form.constraint_matrix());
        let p_matrix = matrix(form.hessian_matrix());

        let mut problem =
            match Problem::new(&p_matrix, &form.linear, &a_matrix, &lb, &ub, &self.settings) {
                Ok(problem) => problem,
                Err(error) => {
                    event!(Level::WARN, model = model.name(), ?error, "unable to set up osqp");
                    return SolveResult::without_solution(SolveStatus::SolverError);
                }
            };

        let result = match problem.solve() {
            Status::Solved(solution) => form.solution(model, solution.x()),
            Status::TimeLimitReached(_) => SolveResult::without_solution(SolveStatus::Timeout),
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                SolveResult::without_solution(SolveStatus::Infeasible)
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                SolveResult::without_solution(SolveStatus::Unbounded)
            }
            // inaccurate solutions, iteration limits and non-convexity
            _ => SolveResult::without_solution(SolveStatus::SolverError),
        };

        event!(
            Level::DEBUG,
            model = model.name(),
            status = %result.status,
            "osqp finished"
        );

        result
    }
}
