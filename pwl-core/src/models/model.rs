use super::{Map, PiecewiseFunction, Set};
use std::fmt;
use std::sync::Arc;

/// An index into the variables of an [`OptimizationModel`]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VarId(usize);

impl VarId {
    /// The position of the variable in [`OptimizationModel::variables`]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named, bounded continuous decision variable
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionVariable {
    /// The unique name of the variable within its model
    pub name: String,
    /// The lower bound, possibly `-∞`
    pub lower_bound: f64,
    /// The upper bound, possibly `+∞`
    pub upper_bound: f64,
}

/// The relation between a linear expression and its right-hand side
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    /// `expr ≤ rhs`
    LessEqual,
    /// `expr ≥ rhs`
    GreaterEqual,
    /// `expr = rhs`
    Equal,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Equal => "=",
        }
        .fmt(f)
    }
}

/// A sum of weighted variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearExpr(Vec<(VarId, f64)>);

impl LinearExpr {
    /// The empty expression
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `coefficient · var` to the expression
    pub fn term(mut self, var: VarId, coefficient: f64) -> Self {
        self.0.push((var, coefficient));
        self
    }

    /// Iterate over the (variable, coefficient) pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.0.iter().copied()
    }

    /// The coefficient of `var`, summing repeated terms
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.0
            .iter()
            .filter(|(id, _)| *id == var)
            .map(|(_, c)| c)
            .sum()
    }

    /// Whether the expression has no terms
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Evaluate the expression against values indexed by [`VarId::index`]
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.0.iter().map(|(id, c)| c * values[id.0]).sum()
    }
}

impl FromIterator<(VarId, f64)> for LinearExpr {
    fn from_iter<I: IntoIterator<Item = (VarId, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `expr (≤ | ≥ | =) rhs`
#[derive(Clone, Debug, PartialEq)]
pub struct LinearConstraint {
    /// The unique name of the constraint
    pub name: String,
    /// The left-hand side
    pub expr: LinearExpr,
    /// How the sides relate
    pub relation: Relation,
    /// The right-hand side
    pub rhs: f64,
}

impl LinearConstraint {
    /// Whether the constraint holds for `values`, up to an absolute tolerance
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.relation {
            Relation::LessEqual => lhs <= self.rhs + tolerance,
            Relation::GreaterEqual => lhs >= self.rhs - tolerance,
            Relation::Equal => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// `output = function(input)`, tying an auxiliary variable to the
/// piecewise-linear value of another variable
#[derive(Clone, Debug, PartialEq)]
pub struct PiecewiseConstraint {
    /// The unique name of the constraint
    pub name: String,
    /// The variable the function is evaluated at
    pub input: VarId,
    /// The auxiliary variable carrying the function value
    pub output: VarId,
    /// The interpolant, shared with every model built from it
    pub function: Arc<PiecewiseFunction>,
}

/// Whether the objective is to be maximized or minimized
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Sense {
    /// Find the largest objective value
    Maximize,
    /// Find the smallest objective value
    Minimize,
}

/// `constant + Σ c_j x_j + Σ c_jk x_j x_k`, together with its sense
#[derive(Clone, Debug, PartialEq)]
pub struct Objective {
    /// Maximize or minimize
    pub sense: Sense,
    /// A constant offset
    pub constant: f64,
    /// Linear terms
    pub linear: Vec<(VarId, f64)>,
    /// Quadratic (including bilinear) terms
    pub quadratic: Vec<(VarId, VarId, f64)>,
}

impl Objective {
    fn new(sense: Sense) -> Self {
        Self {
            sense,
            constant: 0.0,
            linear: Vec::new(),
            quadratic: Vec::new(),
        }
    }

    /// Evaluate the objective against values indexed by [`VarId::index`]
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.constant
            + self
                .linear
                .iter()
                .map(|(id, c)| c * values[id.0])
                .sum::<f64>()
            + self
                .quadratic
                .iter()
                .map(|(a, b, c)| c * values[a.0] * values[b.0])
                .sum::<f64>()
    }

    /// The summed linear coefficient of `var`
    pub fn linear_coefficient(&self, var: VarId) -> f64 {
        self.linear
            .iter()
            .filter(|(id, _)| *id == var)
            .map(|(_, c)| c)
            .sum()
    }

    /// Whether `var` appears in any quadratic term
    pub fn has_quadratic(&self, var: VarId) -> bool {
        self.quadratic.iter().any(|(a, b, _)| *a == var || *b == var)
    }
}

/// A self-contained optimization model: variables, constraints and objective.
///
/// Models are built once per solve strategy, handed to a solver adapter and
/// discarded afterwards. Variables are referenced by [`VarId`], which is only
/// meaningful within the model that issued it.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationModel {
    name: String,
    variables: Vec<DecisionVariable>,
    lookup: Map<String, VarId>,
    constraint_names: Set<String>,
    linear: Vec<LinearConstraint>,
    piecewise: Vec<PiecewiseConstraint>,
    objective: Objective,
}

impl OptimizationModel {
    /// An empty model with the given objective sense
    pub fn new(name: impl Into<String>, sense: Sense) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            lookup: Map::default(),
            constraint_names: Set::default(),
            linear: Vec::new(),
            piecewise: Vec::new(),
            objective: Objective::new(sense),
        }
    }

    /// The model's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a continuous variable bounded by `[lower_bound, upper_bound]`
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<VarId, ModelError> {
        let name = name.into();
        if self.lookup.contains_key(&name) {
            return Err(ModelError::DuplicateVariable(name));
        }
        if lower_bound.is_nan()
            || upper_bound.is_nan()
            || lower_bound > upper_bound
            || lower_bound == f64::INFINITY
            || upper_bound == f64::NEG_INFINITY
        {
            return Err(ModelError::InvalidBounds {
                name,
                lower_bound,
                upper_bound,
            });
        }

        let id = VarId(self.variables.len());
        self.lookup.insert(name.clone(), id);
        self.variables.push(DecisionVariable {
            name,
            lower_bound,
            upper_bound,
        });
        Ok(id)
    }

    /// Add `expr (relation) rhs`
    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        expr: LinearExpr,
        relation: Relation,
        rhs: f64,
    ) -> Result<(), ModelError> {
        let name = name.into();
        for (id, coefficient) in expr.iter() {
            self.check_variable(id)?;
            if !coefficient.is_finite() {
                return Err(ModelError::NonFinite(name));
            }
        }
        if !rhs.is_finite() {
            return Err(ModelError::NonFinite(name));
        }
        self.claim_constraint_name(&name)?;
        self.linear.push(LinearConstraint {
            name,
            expr,
            relation,
            rhs,
        });
        Ok(())
    }

    /// Add `output = function(input)`
    pub fn add_piecewise(
        &mut self,
        name: impl Into<String>,
        input: VarId,
        output: VarId,
        function: Arc<PiecewiseFunction>,
    ) -> Result<(), ModelError> {
        let name = name.into();
        self.check_variable(input)?;
        self.check_variable(output)?;
        if input == output {
            return Err(ModelError::SelfReferential(name));
        }
        self.claim_constraint_name(&name)?;
        self.piecewise.push(PiecewiseConstraint {
            name,
            input,
            output,
            function,
        });
        Ok(())
    }

    /// Add `coefficient · var` to the objective
    pub fn add_linear_objective(&mut self, var: VarId, coefficient: f64) -> Result<(), ModelError> {
        self.check_variable(var)?;
        if !coefficient.is_finite() {
            return Err(ModelError::NonFinite(String::from("objective")));
        }
        self.objective.linear.push((var, coefficient));
        Ok(())
    }

    /// Add `coefficient · a · b` to the objective
    pub fn add_quadratic_objective(
        &mut self,
        a: VarId,
        b: VarId,
        coefficient: f64,
    ) -> Result<(), ModelError> {
        self.check_variable(a)?;
        self.check_variable(b)?;
        if !coefficient.is_finite() {
            return Err(ModelError::NonFinite(String::from("objective")));
        }
        self.objective.quadratic.push((a, b, coefficient));
        Ok(())
    }

    /// Set the constant offset of the objective
    pub fn set_objective_constant(&mut self, constant: f64) {
        self.objective.constant = constant;
    }

    /// The variables, indexed by [`VarId::index`]
    pub fn variables(&self) -> &[DecisionVariable] {
        &self.variables
    }

    /// The variable behind `id`
    pub fn variable(&self, id: VarId) -> Option<&DecisionVariable> {
        self.variables.get(id.0)
    }

    /// Look up a variable by name
    pub fn find(&self, name: &str) -> Option<VarId> {
        self.lookup.get(name).copied()
    }

    /// The linear constraints, in insertion order
    pub fn linear_constraints(&self) -> &[LinearConstraint] {
        &self.linear
    }

    /// The piecewise interpolation constraints, in insertion order
    pub fn piecewise_constraints(&self) -> &[PiecewiseConstraint] {
        &self.piecewise
    }

    /// The objective
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// The objective's sense
    pub fn sense(&self) -> Sense {
        self.objective.sense
    }

    /// Whether the model has neither quadratic objective terms nor piecewise constraints
    pub fn is_linear(&self) -> bool {
        self.objective.quadratic.is_empty() && self.piecewise.is_empty()
    }

    /// Whether `var` appears in any linear constraint
    pub fn appears_in_constraints(&self, var: VarId) -> bool {
        self.linear
            .iter()
            .any(|constraint| constraint.expr.iter().any(|(id, _)| id == var))
    }

    /// Pair solver output (indexed by [`VarId::index`]) with the variable names
    pub fn assignment(&self, values: &[f64]) -> Map<String> {
        self.variables
            .iter()
            .zip(values)
            .map(|(var, value)| (var.name.clone(), *value))
            .collect()
    }

    fn check_variable(&self, id: VarId) -> Result<(), ModelError> {
        if id.0 < self.variables.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownVariable(id))
        }
    }

    fn claim_constraint_name(&mut self, name: &str) -> Result<(), ModelError> {
        if self.constraint_names.insert(name.to_owned()) {
            Ok(())
        } else {
            Err(ModelError::DuplicateConstraint(name.to_owned()))
        }
    }
}

/// Errors raised while assembling an [`OptimizationModel`]
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// A variable with this name already exists
    #[error("variable {0} already exists")]
    DuplicateVariable(String),
    /// A constraint with this name already exists
    #[error("constraint {0} already exists")]
    DuplicateConstraint(String),
    /// The bounds are NaN, reversed, or exclude every finite value
    #[error("invalid bounds [{lower_bound}, {upper_bound}] for variable {name}")]
    InvalidBounds {
        /// The offending variable
        name: String,
        /// The requested lower bound
        lower_bound: f64,
        /// The requested upper bound
        upper_bound: f64,
    },
    /// The id was not issued by this model
    #[error("variable {0} does not belong to this model")]
    UnknownVariable(VarId),
    /// A coefficient or right-hand side is NaN or infinite
    #[error("non-finite coefficient in {0}")]
    NonFinite(String),
    /// A piecewise constraint uses the same variable as input and output
    #[error("piecewise constraint {0} maps a variable onto itself")]
    SelfReferential(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Breakpoint;

    fn line() -> Arc<PiecewiseFunction> {
        Arc::new(
            PiecewiseFunction::new(
                vec![Breakpoint::new(0.0, 0.0), Breakpoint::new(1.0, 1.0)],
                1.0,
                1.0,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_duplicate_variable() {
        let mut model = OptimizationModel::new("m", Sense::Minimize);
        model.add_variable("x", 0.0, 1.0).unwrap();
        assert_eq!(
            model.add_variable("x", 0.0, 2.0).unwrap_err(),
            ModelError::DuplicateVariable("x".into())
        );
    }

    #[test]
    fn test_bad_bounds() {
        let mut model = OptimizationModel::new("m", Sense::Minimize);
        assert!(matches!(
            model.add_variable("x", 2.0, 1.0),
            Err(ModelError::InvalidBounds { .. })
        ));
        assert!(matches!(
            model.add_variable("y", f64::NAN, 1.0),
            Err(ModelError::InvalidBounds { .. })
        ));
        assert!(matches!(
            model.add_variable("z", f64::INFINITY, f64::INFINITY),
            Err(ModelError::InvalidBounds { .. })
        ));
        assert!(model.add_variable("w", f64::NEG_INFINITY, f64::INFINITY).is_ok());
    }

    #[test]
    fn test_unknown_variable() {
        let mut other = OptimizationModel::new("other", Sense::Minimize);
        other.add_variable("a", 0.0, 1.0).unwrap();
        let foreign = other.add_variable("b", 0.0, 1.0).unwrap();

        let mut model = OptimizationModel::new("m", Sense::Minimize);
        model.add_variable("x", 0.0, 1.0).unwrap();
        assert_eq!(
            model
                .add_constraint("c", LinearExpr::new().term(foreign, 1.0), Relation::Equal, 0.0)
                .unwrap_err(),
            ModelError::UnknownVariable(foreign)
        );
        assert_eq!(
            model.add_linear_objective(foreign, 1.0).unwrap_err(),
            ModelError::UnknownVariable(foreign)
        );
    }

    #[test]
    fn test_duplicate_constraint() {
        let mut model = OptimizationModel::new("m", Sense::Minimize);
        let x = model.add_variable("x", 0.0, 1.0).unwrap();
        let s = model.add_variable("s", 0.0, 1.0).unwrap();
        model
            .add_constraint("c", LinearExpr::new().term(x, 1.0), Relation::LessEqual, 1.0)
            .unwrap();
        assert_eq!(
            model.add_piecewise("c", x, s, line()).unwrap_err(),
            ModelError::DuplicateConstraint("c".into())
        );
        assert_eq!(
            model.add_piecewise("p", x, x, line()).unwrap_err(),
            ModelError::SelfReferential("p".into())
        );
    }

    #[test]
    fn test_non_finite() {
        let mut model = OptimizationModel::new("m", Sense::Minimize);
        let x = model.add_variable("x", 0.0, 1.0).unwrap();
        assert!(matches!(
            model.add_constraint("c", LinearExpr::new().term(x, f64::NAN), Relation::Equal, 0.0),
            Err(ModelError::NonFinite(_))
        ));
        assert!(matches!(
            model.add_constraint("d", LinearExpr::new().term(x, 1.0), Relation::Equal, f64::INFINITY),
            Err(ModelError::NonFinite(_))
        ));
    }

    #[test]
    fn test_evaluate() {
        let mut model = OptimizationModel::new("m", Sense::Maximize);
        let x = model.add_variable("x", 0.0, 10.0).unwrap();
        let y = model.add_variable("y", 0.0, 10.0).unwrap();
        model.add_linear_objective(x, 2.0).unwrap();
        model.add_quadratic_objective(x, y, -1.0).unwrap();
        model.set_objective_constant(5.0);

        assert_eq!(model.objective().evaluate(&[3.0, 4.0]), 5.0 + 6.0 - 12.0);
        assert!(!model.is_linear());
        assert!(model.objective().has_quadratic(y));
        assert_eq!(model.find("y"), Some(y));
        assert_eq!(model.find("z"), None);

        let assignment = model.assignment(&[3.0, 4.0]);
        assert_eq!(assignment.get("x"), Some(&3.0));
        assert_eq!(assignment.get_index(1), Some((&"y".to_string(), &4.0)));
    }

    #[test]
    fn test_constraint_satisfaction() {
        let mut model = OptimizationModel::new("m", Sense::Minimize);
        let x = model.add_variable("x", 0.0, 10.0).unwrap();
        let y = model.add_variable("y", 0.0, 10.0).unwrap();
        let expr = LinearExpr::new().term(x, 1.0).term(y, 2.0);
        assert_eq!(expr.coefficient(y), 2.0);
        model
            .add_constraint("c", expr, Relation::LessEqual, 5.0)
            .unwrap();

        let c = &model.linear_constraints()[0];
        assert!(c.is_satisfied(&[1.0, 2.0], 1e-9));
        assert!(!c.is_satisfied(&[2.0, 2.0], 1e-9));
        assert!(model.appears_in_constraints(y));
    }
}
