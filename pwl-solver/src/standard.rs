use crate::{Map, Set};
use pwl_core::models::{
    LinearConstraint, OptimizationModel, PiecewiseConstraint, Relation, Sense, SolveResult,
};
use tracing::{Level, event};

// Diagonal shift (relative to the largest Hessian entry) applied before the
// Cholesky test, so that singular but semidefinite Hessians still pass.
const PSD_EPS: f64 = 1e-9;

/// How an interpolation constraint `s = pwl(x)` is written as linear rows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum PiecewiseEncoding {
    /// One row `s ≥ m_k · x + c_k` per segment (and per distinct extension)
    #[default]
    Epigraph,
    /// One weight `λ_k ≥ 0` per breakpoint with `Σ λ_k = 1`,
    /// `x = Σ λ_k x_k` and `s = Σ λ_k y_k`
    ConvexCombination,
}

/// A constraint row `lower ≤ Σ a_j x_j ≤ upper`; equality when `lower == upper`
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// The (column, coefficient) pairs; repeated columns are summed
    pub terms: Vec<(usize, f64)>,
    /// The lower limit, possibly `-∞`
    pub lower: f64,
    /// The upper limit, possibly `+∞`
    pub upper: f64,
}

impl Row {
    /// Whether the row pins its expression to a single value
    pub fn is_equality(&self) -> bool {
        self.lower == self.upper
    }
}

impl From<&LinearConstraint> for Row {
    fn from(constraint: &LinearConstraint) -> Self {
        let (lower, upper) = match constraint.relation {
            Relation::LessEqual => (f64::NEG_INFINITY, constraint.rhs),
            Relation::GreaterEqual => (constraint.rhs, f64::INFINITY),
            Relation::Equal => (constraint.rhs, constraint.rhs),
        };
        Self {
            terms: constraint
                .expr
                .iter()
                .map(|(id, coefficient)| (id.index(), coefficient))
                .collect(),
            lower,
            upper,
        }
    }
}

/// A sparse matrix in compressed sparse column form, the input format shared by
/// both backends
#[derive(Clone, Debug, PartialEq)]
pub struct Csc {
    /// Number of rows
    pub nrows: usize,
    /// Number of columns
    pub ncols: usize,
    /// Offsets into `rowval`/`nzval` where each column starts, plus the total length
    pub colptr: Vec<usize>,
    /// Row index of every stored entry
    pub rowval: Vec<usize>,
    /// Value of every stored entry
    pub nzval: Vec<f64>,
}

impl Csc {
    /// Assemble a matrix from (row, column, value) triplets in any order.
    /// Repeated positions are summed and explicit zeros dropped.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Self {
        let mut entries = Map::<(usize, usize), f64>::default();
        for (row, col, value) in triplets {
            *entries.entry((col, row)).or_default() += value;
        }
        entries.retain(|_, value| *value != 0.0);
        entries.sort_unstable_keys();

        let mut colptr = Vec::with_capacity(ncols + 1);
        let mut rowval = Vec::with_capacity(entries.len());
        let mut nzval = Vec::with_capacity(entries.len());

        for ((col, row), value) in entries {
            while colptr.len() <= col {
                colptr.push(rowval.len());
            }
            rowval.push(row);
            nzval.push(value);
        }
        while colptr.len() <= ncols {
            colptr.push(rowval.len());
        }

        Self {
            nrows,
            ncols,
            colptr,
            rowval,
            nzval,
        }
    }
}

/// An optimization model rewritten as
///
/// ```text
/// minimize    ½ xᵀPx + qᵀx
/// subject to  lower ≤ Ax ≤ upper
/// ```
///
/// The first `model_columns` columns are the model's variables in order; any
/// further columns are auxiliary weights introduced by the piecewise encoding.
/// The objective constant is not carried, since results are re-evaluated
/// against the original model.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardForm {
    /// Total number of columns
    pub columns: usize,
    /// Number of columns that correspond to model variables
    pub model_columns: usize,
    /// Upper-triangular entries `(row, col, value)` of P, `row ≤ col`, sorted column-major
    pub hessian: Vec<(usize, usize, f64)>,
    /// The linear objective q, one entry per column
    pub linear: Vec<f64>,
    /// The constraint rows, including one row per bounded variable
    pub rows: Vec<Row>,
}

impl StandardForm {
    /// P as an upper-triangular sparse matrix
    pub fn hessian_matrix(&self) -> Csc {
        Csc::from_triplets(self.columns, self.columns, self.hessian.iter().copied())
    }

    /// A as a sparse matrix, rows in order
    pub fn constraint_matrix(&self) -> Csc {
        Csc::from_triplets(
            self.rows.len(),
            self.columns,
            self.rows.iter().enumerate().flat_map(|(i, row)| {
                row.terms
                    .iter()
                    .map(move |&(j, coefficient)| (i, j, coefficient))
            }),
        )
    }

    /// Turn a primal solution of the standard form into a result for `model`
    pub fn solution(&self, model: &OptimizationModel, x: &[f64]) -> SolveResult {
        let values = &x[..self.model_columns.min(x.len())];
        SolveResult::optimal(model.assignment(values), model.objective().evaluate(values))
    }
}

/// Rewrite `model` into [`StandardForm`].
///
/// Maximization is turned into minimization by negating the objective.
/// Quadratic terms that are not jointly convex are rewritten by substituting
/// variables defined through equality constraints (`q + b·p = a` turns
/// `p·q` into `a·p − b·p²`), which leaves the objective unchanged on the
/// feasible set. Each equality is used at most once.
///
/// Interpolation constraints are relaxed to `s ≥ pwl(x)` (or the convex hull
/// of the breakpoints), which is exact only if `pwl` is convex, the objective
/// strictly penalizes `s`, and `s` appears nowhere else.
pub fn lower(
    model: &OptimizationModel,
    encoding: PiecewiseEncoding,
) -> Result<StandardForm, LoweringError> {
    let model_columns = model.variables().len();
    let sign = match model.sense() {
        Sense::Minimize => 1.0,
        Sense::Maximize => -1.0,
    };

    let objective = model.objective();
    let mut linear = vec![0.0; model_columns];
    for (id, coefficient) in objective.linear.iter() {
        linear[id.index()] += sign * coefficient;
    }
    let quadratic = objective
        .quadratic
        .iter()
        .map(|(a, b, coefficient)| (a.index(), b.index(), sign * coefficient))
        .collect();
    let hessian = convexify(model, quadratic, &mut linear)?;

    let mut rows = model
        .linear_constraints()
        .iter()
        .map(Row::from)
        .collect::<Vec<_>>();

    for (j, var) in model.variables().iter().enumerate() {
        if var.lower_bound.is_finite() || var.upper_bound.is_finite() {
            rows.push(Row {
                terms: vec![(j, 1.0)],
                lower: var.lower_bound,
                upper: var.upper_bound,
            });
        }
    }

    for constraint in model.piecewise_constraints() {
        check_surrogate(model, constraint, &linear, &hessian)?;
        match encoding {
            PiecewiseEncoding::Epigraph => epigraph(constraint, &mut rows),
            PiecewiseEncoding::ConvexCombination => {
                convex_combination(constraint, &mut linear, &mut rows)
            }
        }
    }

    let mut hessian = hessian.into_iter().collect::<Vec<_>>();
    hessian.sort_unstable_by_key(|&((row, col), _)| (col, row));

    let form = StandardForm {
        columns: linear.len(),
        model_columns,
        hessian: hessian
            .into_iter()
            .map(|((row, col), value)| (row, col, value))
            .collect(),
        linear,
        rows,
    };

    event!(
        Level::DEBUG,
        model = model.name(),
        columns = form.columns,
        rows = form.rows.len(),
        hessian = form.hessian.len(),
        "lowered model to standard form"
    );

    Ok(form)
}

// Quadratic terms `c · x_a · x_b`, indexed by column
type Terms = Vec<(usize, usize, f64)>;

fn convexify(
    model: &OptimizationModel,
    mut terms: Terms,
    linear: &mut [f64],
) -> Result<Map<(usize, usize), f64>, LoweringError> {
    let constraints = model.linear_constraints();
    let mut used = vec![false; constraints.len()];

    loop {
        let hessian = hessian(&terms);
        if is_positive_semidefinite(&hessian) {
            return Ok(hessian);
        }

        // Prefer eliminating the second factor of a bilinear term
        let Some((var, row)) = terms
            .iter()
            .filter(|(a, b, _)| a != b)
            .flat_map(|&(a, b, _)| [b, a])
            .find_map(|var| defining_equality(constraints, &used, var).map(|row| (var, row)))
        else {
            return Err(LoweringError::NonConvexObjective);
        };

        used[row] = true;
        terms = substitute(&constraints[row], var, terms, linear);

        event!(
            Level::TRACE,
            constraint = constraints[row].name.as_str(),
            variable = model.variables()[var].name.as_str(),
            "substituted equality into quadratic objective"
        );
    }
}

fn pivot(constraint: &LinearConstraint, var: usize) -> f64 {
    constraint
        .expr
        .iter()
        .filter(|(id, _)| id.index() == var)
        .map(|(_, coefficient)| coefficient)
        .sum()
}

fn defining_equality(constraints: &[LinearConstraint], used: &[bool], var: usize) -> Option<usize> {
    constraints.iter().enumerate().position(|(i, constraint)| {
        !used[i] && constraint.relation == Relation::Equal && pivot(constraint, var) != 0.0
    })
}

// Replace `x_var` by `offset + Σ β_k x_k` throughout `terms`
fn substitute(constraint: &LinearConstraint, var: usize, terms: Terms, linear: &mut [f64]) -> Terms {
    let pivot = pivot(constraint, var);
    let offset = constraint.rhs / pivot;
    let rest = constraint
        .expr
        .iter()
        .filter(|(id, _)| id.index() != var)
        .map(|(id, coefficient)| (id.index(), -coefficient / pivot))
        .collect::<Vec<_>>();

    let mut substituted = Vec::with_capacity(terms.len() + rest.len());
    for (a, b, c) in terms {
        match (a == var, b == var) {
            (false, false) => substituted.push((a, b, c)),
            (true, true) => {
                // the constant c · offset² is dropped
                for &(k, beta) in rest.iter() {
                    linear[k] += 2.0 * c * offset * beta;
                }
                for &(k, beta_k) in rest.iter() {
                    for &(l, beta_l) in rest.iter() {
                        substituted.push((k, l, c * beta_k * beta_l));
                    }
                }
            }
            _ => {
                let other = if a == var { b } else { a };
                linear[other] += c * offset;
                for &(k, beta) in rest.iter() {
                    substituted.push((other, k, c * beta));
                }
            }
        }
    }
    substituted
}

// P such that ½ xᵀPx = Σ c · x_a · x_b, upper triangle only
fn hessian(terms: &[(usize, usize, f64)]) -> Map<(usize, usize), f64> {
    let mut entries = Map::<(usize, usize), f64>::default();
    for &(a, b, c) in terms.iter() {
        if a == b {
            *entries.entry((a, a)).or_default() += 2.0 * c;
        } else {
            *entries.entry((a.min(b), a.max(b))).or_default() += c;
        }
    }
    entries.retain(|_, value| *value != 0.0);
    entries
}

fn is_positive_semidefinite(hessian: &Map<(usize, usize), f64>) -> bool {
    if hessian.is_empty() {
        return true;
    }

    // Only the columns touched by the Hessian matter
    let mut index = hessian
        .keys()
        .flat_map(|&(i, j)| [i, j])
        .collect::<Set<usize>>();
    index.sort_unstable();
    let k = index.len();

    let mut dense = vec![0.0; k * k];
    for (&(i, j), &value) in hessian.iter() {
        if let (Some(a), Some(b)) = (index.get_index_of(&i), index.get_index_of(&j)) {
            dense[a * k + b] = value;
            dense[b * k + a] = value;
        }
    }

    let shift = PSD_EPS * dense.iter().fold(1.0_f64, |max, value| max.max(value.abs()));

    // Cholesky factorization of dense + shift·I; fails iff it is not positive definite
    let mut factor = vec![0.0; k * k];
    for j in 0..k {
        let pivot = dense[j * k + j] + shift
            - (0..j).map(|m| factor[j * k + m] * factor[j * k + m]).sum::<f64>();
        if !(pivot > 0.0) {
            return false;
        }
        let pivot = pivot.sqrt();
        factor[j * k + j] = pivot;
        for i in (j + 1)..k {
            let dot = (0..j)
                .map(|m| factor[i * k + m] * factor[j * k + m])
                .sum::<f64>();
            factor[i * k + j] = (dense[i * k + j] - dot) / pivot;
        }
    }
    true
}

fn check_surrogate(
    model: &OptimizationModel,
    constraint: &PiecewiseConstraint,
    linear: &[f64],
    hessian: &Map<(usize, usize), f64>,
) -> Result<(), LoweringError> {
    if !constraint.function.is_convex() {
        return Err(LoweringError::NonConvexFunction(constraint.name.clone()));
    }

    let output = constraint.output.index();
    if !(linear[output] > 0.0) {
        return Err(LoweringError::SurrogateNotPenalized(constraint.name.clone()));
    }

    let shared = model.appears_in_constraints(constraint.output)
        || hessian.keys().any(|&(i, j)| i == output || j == output)
        || model
            .piecewise_constraints()
            .iter()
            .filter(|other| other.output == constraint.output || other.input == constraint.output)
            .count()
            > 1;
    if shared {
        return Err(LoweringError::SharedSurrogate(constraint.name.clone()));
    }

    Ok(())
}

fn epigraph(constraint: &PiecewiseConstraint, rows: &mut Vec<Row>) {
    let x = constraint.input.index();
    let s = constraint.output.index();
    let function = &constraint.function;

    let mut push = |slope: f64, intercept: f64| {
        rows.push(Row {
            terms: vec![(s, 1.0), (x, -slope)],
            lower: intercept,
            upper: f64::INFINITY,
        })
    };

    let breakpoints = function.breakpoints();
    let first = breakpoints[0];
    let last = breakpoints[breakpoints.len() - 1];
    let slopes = function.slopes().collect::<Vec<_>>();

    if slopes.first() != Some(&function.left_slope()) {
        push(function.left_slope(), first.y - function.left_slope() * first.x);
    }
    for (slope, intercept) in function.segment_pieces() {
        push(slope, intercept);
    }
    if slopes.last() != Some(&function.right_slope()) {
        push(function.right_slope(), last.y - function.right_slope() * last.x);
    }
}

fn convex_combination(constraint: &PiecewiseConstraint, linear: &mut Vec<f64>, rows: &mut Vec<Row>) {
    let x = constraint.input.index();
    let s = constraint.output.index();
    let breakpoints = constraint.function.breakpoints();

    let offset = linear.len();
    linear.resize(offset + breakpoints.len(), 0.0);
    let weights = offset..offset + breakpoints.len();

    rows.push(Row {
        terms: weights.clone().map(|k| (k, 1.0)).collect(),
        lower: 1.0,
        upper: 1.0,
    });
    rows.push(Row {
        terms: std::iter::once((x, 1.0))
            .chain(weights.clone().zip(breakpoints).map(|(k, bp)| (k, -bp.x)))
            .collect(),
        lower: 0.0,
        upper: 0.0,
    });
    rows.push(Row {
        terms: std::iter::once((s, 1.0))
            .chain(weights.clone().zip(breakpoints).map(|(k, bp)| (k, -bp.y)))
            .collect(),
        lower: 0.0,
        upper: 0.0,
    });
    for k in weights {
        rows.push(Row {
            terms: vec![(k, 1.0)],
            lower: 0.0,
            upper: f64::INFINITY,
        });
    }
}

/// Reasons a model cannot be handed to a convex QP backend
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum LoweringError {
    /// The quadratic objective is not convex, even after substituting equalities
    #[error("the quadratic objective is not convex in the solver's sense")]
    NonConvexObjective,
    /// A piecewise function has decreasing slopes
    #[error("piecewise constraint {0} uses a non-convex function")]
    NonConvexFunction(String),
    /// The objective does not strictly penalize the surrogate variable
    #[error("the objective does not push the output of piecewise constraint {0} down")]
    SurrogateNotPenalized(String),
    /// The surrogate variable is used outside of its interpolation constraint
    #[error("the output of piecewise constraint {0} is used elsewhere in the model")]
    SharedSurrogate(String),
}
