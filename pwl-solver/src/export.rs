use pwl_core::models::{OptimizationModel, Relation, Sense, VarId};
use std::io::Write;

/// Export an optimization model to CPLEX `.lp` format.
///
/// Quadratic objective terms use the bracketed `[ ... ] / 2` extension and
/// interpolation constraints are written as `PWL` general constraints, so the
/// output can be fed to any solver that reads the Gurobi dialect of the
/// format. That dialect extends a PWL function beyond its breakpoints with the
/// first and last segments, rather than with the function's own extension
/// slopes.
pub fn export_lp(model: &OptimizationModel, buffer: &mut impl Write) -> Result<(), std::io::Error> {
    // https://www.gurobi.com/documentation/current/refman/lp_format.html
    // is a good reference.
    let name = |id: VarId| model.variables()[id.index()].name.as_str();

    writeln!(buffer, "\\ Model {}", model.name())?;
    match model.sense() {
        Sense::Maximize => writeln!(buffer, "Maximize")?,
        Sense::Minimize => writeln!(buffer, "Minimize")?,
    }

    let objective = model.objective();
    write!(buffer, " obj:")?;
    let mut empty = true;
    for &(id, coefficient) in objective.linear.iter() {
        write_term(buffer, coefficient, name(id), &mut empty)?;
    }
    if !objective.quadratic.is_empty() {
        // The bracketed terms are halved, so we double them here
        write!(buffer, " + [")?;
        let mut first = true;
        for &(a, b, coefficient) in objective.quadratic.iter() {
            let term = if a == b {
                format!("{} ^ 2", name(a))
            } else {
                format!("{} * {}", name(a), name(b))
            };
            write_term(buffer, 2.0 * coefficient, &term, &mut first)?;
        }
        write!(buffer, " ] / 2")?;
        empty = false;
    }
    if objective.constant != 0.0 || empty {
        write_constant(buffer, objective.constant, empty)?;
    }
    writeln!(buffer)?;

    writeln!(buffer, "Subject To")?;
    for constraint in model.linear_constraints() {
        write!(buffer, " {}:", constraint.name)?;
        let mut first = true;
        for (id, coefficient) in constraint.expr.iter() {
            write_term(buffer, coefficient, name(id), &mut first)?;
        }
        let relation = match constraint.relation {
            Relation::LessEqual => "<=",
            Relation::GreaterEqual => ">=",
            Relation::Equal => "=",
        };
        writeln!(buffer, " {relation} {}", constraint.rhs)?;
    }

    // LP format defaults to [0, +inf), but we spell out every variable
    writeln!(buffer, "Bounds")?;
    for var in model.variables() {
        let lower = var.lower_bound;
        let upper = var.upper_bound;
        match (lower.is_finite(), upper.is_finite()) {
            (false, false) => writeln!(buffer, " {} free", var.name)?,
            (true, false) => writeln!(buffer, " {} >= {lower}", var.name)?,
            (false, true) => writeln!(buffer, " -inf <= {} <= {upper}", var.name)?,
            (true, true) if lower == upper => writeln!(buffer, " {} = {lower}", var.name)?,
            (true, true) => writeln!(buffer, " {lower} <= {} <= {upper}", var.name)?,
        }
    }

    if !model.piecewise_constraints().is_empty() {
        writeln!(buffer, "General Constraints")?;
        for constraint in model.piecewise_constraints() {
            write!(
                buffer,
                " {}: {} = PWL ( {} ) :",
                constraint.name,
                name(constraint.output),
                name(constraint.input)
            )?;
            for point in constraint.function.breakpoints() {
                write!(buffer, " ( {} , {} )", point.x, point.y)?;
            }
            writeln!(buffer)?;
        }
    }

    writeln!(buffer, "End")?;
    Ok(())
}

fn write_term(
    buffer: &mut impl Write,
    coefficient: f64,
    name: &str,
    first: &mut bool,
) -> Result<(), std::io::Error> {
    let sign = if coefficient < 0.0 { "-" } else { "+" };
    if *first && sign == "+" {
        write!(buffer, " {} {name}", coefficient.abs())?;
    } else {
        write!(buffer, " {sign} {} {name}", coefficient.abs())?;
    }
    *first = false;
    Ok(())
}

fn write_constant(buffer: &mut impl Write, constant: f64, first: bool) -> Result<(), std::io::Error> {
    if first {
        write!(buffer, " {constant}")
    } else if constant < 0.0 {
        write!(buffer, " - {}", constant.abs())
    } else {
        write!(buffer, " + {constant}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwl_core::models::{Breakpoint, LinearExpr, PiecewiseFunction};
    use std::sync::Arc;

    fn export(model: &OptimizationModel) -> String {
        let mut buffer = Vec::new();
        export_lp(model, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_export_quadratic() {
        let mut model = OptimizationModel::new("tiny", Sense::Maximize);
        let p = model.add_variable("p", 0.0, 5.0).unwrap();
        let q = model.add_variable("q", 0.0, f64::INFINITY).unwrap();
        model
            .add_constraint(
                "demand",
                LinearExpr::new().term(q, 1.0).term(p, 2.0),
                Relation::Equal,
                10.0,
            )
            .unwrap();
        model.add_quadratic_objective(p, q, 1.0).unwrap();
        model.add_linear_objective(q, -3.0).unwrap();

        let expected = "\\ Model tiny
Maximize
 obj: - 3 q + [ 2 p * q ] / 2
Subject To
 demand: 1 q + 2 p = 10
Bounds
 0 <= p <= 5
 q >= 0
End
";
        assert_eq!(export(&model), expected);
    }

    #[test]
    fn test_export_piecewise() {
        let mut model = OptimizationModel::new("pwl", Sense::Minimize);
        let x = model.add_variable("x", f64::NEG_INFINITY, f64::INFINITY).unwrap();
        let s = model.add_variable("s", 1.0, 1.0).unwrap();
        let function = PiecewiseFunction::new(
            vec![
                Breakpoint::new(0.0, 0.0),
                Breakpoint::new(1.0, 1.0),
                Breakpoint::new(2.0, 4.0),
            ],
            1.0,
            3.0,
        )
        .unwrap();
        model.add_piecewise("square_x", x, s, Arc::new(function)).unwrap();
        model.add_linear_objective(s, 1.0).unwrap();
        model.set_objective_constant(-2.5);

        let expected = "\\ Model pwl
Minimize
 obj: 1 s - 2.5
Subject To
Bounds
 x free
 s = 1
General Constraints
 square_x: s = PWL ( x ) : ( 0 , 0 ) ( 1 , 1 ) ( 2 , 4 )
End
";
        assert_eq!(export(&model), expected);
    }

    #[test]
    fn test_export_empty_objective() {
        let mut model = OptimizationModel::new("empty", Sense::Minimize);
        model.add_variable("x", -1.0, f64::INFINITY).unwrap();
        let text = export(&model);
        assert!(text.contains(" obj: 0\n"));
        assert!(text.contains(" x >= -1\n"));
    }
}
