use super::{
    ApproximationConfig, ApproximationError, LinearExpr, ModelError, OptimizationModel,
    PiecewiseFunction, ProblemParameters, Relation, Sense, StepKind, approximate_square,
};
use std::sync::Arc;
use tracing::{Level, event};

/// Which form the revenue term takes in a built model
#[derive(Clone, Debug)]
pub enum Mode {
    /// Revenue is the literal bilinear `price · quantity`; needs a solver that
    /// can handle quadratic objectives
    Exact,
    /// Revenue is `intercept · price − slope · s` with `s = pwl(price)`, one
    /// approximation of `price²` per product in product order
    PiecewiseLinear(Vec<Arc<PiecewiseFunction>>),
}

/// The name of the price variable of product `product`
pub fn price_var(product: &str) -> String {
    format!("p_{product}")
}

/// The name of the quantity variable of product `product`
pub fn quantity_var(product: &str) -> String {
    format!("q_{product}")
}

/// The name of the auxiliary variable standing in for the squared price of `product`
pub fn surrogate_var(product: &str) -> String {
    format!("s_{product}")
}

/// The name of the demand constraint of `product`
pub fn demand_constraint(product: &str) -> String {
    format!("demand_{product}")
}

/// The name of the interpolation constraint tying `s_<product>` to `p_<product>`
pub fn square_constraint(product: &str) -> String {
    format!("square_{product}")
}

/// Approximate `price²` for every product over its full price range `[0, intercept/slope]`.
///
/// The returned functions are in product order, ready for [`Mode::PiecewiseLinear`].
pub fn price_approximations(
    params: &ProblemParameters,
    segment_count: usize,
    step: StepKind,
) -> Result<Vec<Arc<PiecewiseFunction>>, ApproximationError> {
    params
        .products()
        .iter()
        .map(|product| {
            let config = ApproximationConfig {
                domain_upper_bound: product.demand.max_price(),
                segment_count,
                step,
            };
            approximate_square(&config).map(Arc::new)
        })
        .collect()
}

/// Assemble the profit-maximization model for `params`.
///
/// Both modes share the variables `p_i ∈ [0, intercept_i/slope_i]` and
/// `q_i ∈ [0, ∞)`, the demand constraints `q_i + slope_i · p_i = intercept_i`,
/// one capacity constraint `Σ_i usage_ri · q_i ≤ limit_r` per resource, and the
/// cost term `−Σ_i unit_cost_i · q_i`. They differ only in the revenue term.
pub fn build(params: &ProblemParameters, mode: &Mode) -> Result<OptimizationModel, BuildError> {
    let products = params.products();

    // Check the approximations before doing any work
    if let Mode::PiecewiseLinear(functions) = mode {
        if functions.len() != products.len() {
            return Err(BuildError::InconsistentMode {
                expected: products.len(),
                found: functions.len(),
            });
        }
        for (product, function) in products.iter().zip(functions.iter()) {
            let max_price = product.demand.max_price();
            if !function.covers(0.0, max_price) {
                return Err(BuildError::UncoveredDomain {
                    product: product.name.clone(),
                    domain: function.domain(),
                    required: max_price,
                });
            }
        }
    }

    let name = match mode {
        Mode::Exact => "profit_exact",
        Mode::PiecewiseLinear(_) => "profit_piecewise",
    };
    let mut model = OptimizationModel::new(name, Sense::Maximize);

    let mut quantities = Vec::with_capacity(products.len());
    for (index, product) in products.iter().enumerate() {
        let demand = product.demand;
        let max_price = demand.max_price();

        let p = model.add_variable(price_var(&product.name), 0.0, max_price)?;
        let q = model.add_variable(quantity_var(&product.name), 0.0, f64::INFINITY)?;
        quantities.push(q);

        model.add_constraint(
            demand_constraint(&product.name),
            LinearExpr::new().term(q, 1.0).term(p, demand.slope),
            Relation::Equal,
            demand.intercept,
        )?;

        match mode {
            Mode::Exact => {
                model.add_quadratic_objective(p, q, 1.0)?;
            }
            Mode::PiecewiseLinear(functions) => {
                let function = &functions[index];
                let (lo, hi) = function.range(0.0, max_price);
                let s = model.add_variable(surrogate_var(&product.name), lo, hi)?;
                model.add_piecewise(
                    square_constraint(&product.name),
                    p,
                    s,
                    Arc::clone(function),
                )?;
                model.add_linear_objective(p, demand.intercept)?;
                model.add_linear_objective(s, -demand.slope)?;
            }
        }

        model.add_linear_objective(q, -params.unit_cost(index))?;
    }

    for resource in params.resources() {
        let expr = quantities
            .iter()
            .zip(resource.usage.iter())
            .filter(|(_, usage)| **usage != 0.0)
            .map(|(q, usage)| (*q, *usage))
            .collect::<LinearExpr>();
        if expr.is_empty() {
            continue;
        }
        model.add_constraint(resource.name.clone(), expr, Relation::LessEqual, resource.limit)?;
    }

    event!(
        Level::DEBUG,
        model = model.name(),
        variables = model.variables().len(),
        constraints = model.linear_constraints().len(),
        piecewise = model.piecewise_constraints().len(),
        "built optimization model"
    );

    Ok(model)
}

/// Errors raised while building a model
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// Piecewise mode needs exactly one approximation per product
    #[error("piecewise mode needs {expected} approximations, got {found}")]
    InconsistentMode {
        /// The number of products
        expected: usize,
        /// The number of approximations supplied
        found: usize,
    },
    /// An approximation does not cover the product's price range
    #[error("approximation for product {product} covers {domain:?}, but prices reach {required}")]
    UncoveredDomain {
        /// The product whose approximation is too short
        product: String,
        /// The domain the approximation covers
        domain: (f64, f64),
        /// The product's maximum price
        required: f64,
    },
    /// The model itself rejected a variable or constraint
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DemandCurve, Product, Relation, Resource};
    use approx::assert_relative_eq;

    fn reference_piecewise(segments: usize) -> Mode {
        Mode::PiecewiseLinear(
            price_approximations(&ProblemParameters::reference(), segments, StepKind::Continuous)
                .unwrap(),
        )
    }

    #[test]
    fn test_exact_shape() {
        let model = build(&ProblemParameters::reference(), &Mode::Exact).unwrap();
        let names = model
            .variables()
            .iter()
            .map(|v| v.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["p_1", "q_1", "p_2", "q_2"]);
        assert_eq!(model.sense(), Sense::Maximize);
        assert_eq!(model.linear_constraints().len(), 4);
        assert!(model.piecewise_constraints().is_empty());
        assert_eq!(model.objective().quadratic.len(), 2);

        let p1 = model.variable(model.find("p_1").unwrap()).unwrap();
        assert_eq!((p1.lower_bound, p1.upper_bound), (0.0, 1250.0));
        let q2 = model.variable(model.find("q_2").unwrap()).unwrap();
        assert_eq!((q2.lower_bound, q2.upper_bound), (0.0, f64::INFINITY));
    }

    #[test]
    fn test_piecewise_shape() {
        let model = build(&ProblemParameters::reference(), &reference_piecewise(10)).unwrap();
        assert_eq!(model.variables().len(), 6);
        assert_eq!(model.piecewise_constraints().len(), 2);
        assert!(model.objective().quadratic.is_empty());

        let s1 = model.find("s_1").unwrap();
        let p1 = model.find("p_1").unwrap();
        let objective = model.objective();
        assert_eq!(objective.linear_coefficient(s1), -8.0);
        assert_eq!(objective.linear_coefficient(p1), 10000.0);
        assert!(!model.appears_in_constraints(s1));

        let s2 = model.variable(model.find("s_2").unwrap()).unwrap();
        assert_eq!((s2.lower_bound, s2.upper_bound), (0.0, 1600.0 * 1600.0));
    }

    #[test]
    fn test_shared_constraints() {
        let exact = build(&ProblemParameters::reference(), &Mode::Exact).unwrap();
        let piecewise = build(&ProblemParameters::reference(), &reference_piecewise(4)).unwrap();

        let shape = |model: &OptimizationModel| {
            model
                .linear_constraints()
                .iter()
                .map(|c| {
                    let terms = c
                        .expr
                        .iter()
                        .map(|(id, coef)| (model.variables()[id.index()].name.clone(), coef))
                        .collect::<Vec<_>>();
                    (c.name.clone(), terms, c.relation, c.rhs)
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&exact), shape(&piecewise));

        let machine = exact
            .linear_constraints()
            .iter()
            .find(|c| c.name == "machine_hours")
            .unwrap();
        assert_eq!(machine.relation, Relation::LessEqual);
        assert_eq!(machine.rhs, 600.0);
    }

    #[test]
    fn test_objectives_agree_at_breakpoints() {
        // With p on a breakpoint, the surrogate equals p² and both objectives coincide
        let params = ProblemParameters::reference();
        let Mode::PiecewiseLinear(functions) = reference_piecewise(1250) else {
            unreachable!()
        };
        let exact = build(&params, &Mode::Exact).unwrap();
        let piecewise = build(&params, &Mode::PiecewiseLinear(functions.clone())).unwrap();

        let p1 = functions[0].breakpoints()[1000].x;
        let p2 = functions[1].breakpoints()[1000].x;
        let q1 = params.products()[0].demand.quantity(p1);
        let q2 = params.products()[1].demand.quantity(p2);

        let exact_value = exact.objective().evaluate(&[p1, q1, p2, q2]);
        let piecewise_value = piecewise.objective().evaluate(&[
            p1,
            q1,
            functions[0].evaluate(p1),
            p2,
            q2,
            functions[1].evaluate(p2),
        ]);
        assert_relative_eq!(exact_value, piecewise_value, max_relative = 1e-12);
    }

    #[test]
    fn test_missing_approximation() {
        let params = ProblemParameters::reference();
        let mut functions =
            price_approximations(&params, 10, StepKind::Continuous).unwrap();
        functions.pop();
        assert_eq!(
            build(&params, &Mode::PiecewiseLinear(functions)).unwrap_err(),
            BuildError::InconsistentMode {
                expected: 2,
                found: 1
            }
        );
        assert_eq!(
            build(&params, &Mode::PiecewiseLinear(vec![])).unwrap_err(),
            BuildError::InconsistentMode {
                expected: 2,
                found: 0
            }
        );
    }

    #[test]
    fn test_short_approximation() {
        let params = ProblemParameters::reference();
        let short = Arc::new(approximate_square(&ApproximationConfig::new(1000.0, 10)).unwrap());
        let full = Arc::new(approximate_square(&ApproximationConfig::new(1600.0, 10)).unwrap());
        assert_eq!(
            build(&params, &Mode::PiecewiseLinear(vec![short, full])).unwrap_err(),
            BuildError::UncoveredDomain {
                product: "1".into(),
                domain: (0.0, 1000.0),
                required: 1250.0,
            }
        );
    }

    #[test]
    fn test_unused_resource_is_skipped() {
        let params = ProblemParameters::new(
            vec![Product {
                name: "a".into(),
                demand: DemandCurve {
                    intercept: 10.0,
                    slope: 1.0,
                },
            }],
            vec![Resource {
                name: "idle".into(),
                limit: 1.0,
                unit_cost: 3.0,
                usage: vec![0.0],
            }],
        )
        .unwrap();
        let model = build(&params, &Mode::Exact).unwrap();
        assert_eq!(model.linear_constraints().len(), 1);
    }

    #[test]
    fn test_resource_named_like_a_constraint() {
        let product = |name: &str| Product {
            name: name.into(),
            demand: DemandCurve {
                intercept: 10.0,
                slope: 1.0,
            },
        };
        let capacity = |name: &str| Resource {
            name: name.into(),
            limit: 5.0,
            unit_cost: 1.0,
            usage: vec![1.0],
        };

        // a name that would clash with the generated constraints never gets here
        assert!(ProblemParameters::new(vec![product("a")], vec![capacity("demand_a")]).is_err());

        let params = ProblemParameters::new(vec![product("a")], vec![capacity("square_b")]).unwrap();
        let functions = price_approximations(&params, 4, StepKind::Continuous).unwrap();
        for mode in [Mode::Exact, Mode::PiecewiseLinear(functions)] {
            let model = build(&params, &mode).unwrap();
            assert!(model.linear_constraints().iter().any(|c| c.name == "square_b"));
        }
    }
}
