//! Numeric equation scaling of the explicit ODE.
//!
//! Each right-hand side is divided by the max-norm of its row of the Jacobian
//! with respect to `[x, z, pi, pf, u]`, evaluated at the variables' start
//! values in nominal units (`start / nominal`, matching a model that went
//! through `scale_variables`) with time and all derivatives at zero.

use faer::Mat;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

use daesort_core::{DaeResult, NodeId, OcpModel};

/// Row scaling factors of `jacobian`: the max-norm of each row, ignoring
/// NaN entries. A row without a usable entry gets factor 1.
pub fn row_scale_factors(jacobian: &Mat<f64>) -> Vec<f64> {
    (0..jacobian.nrows())
        .map(|i| {
            (0..jacobian.ncols())
                .map(|j| jacobian.read(i, j))
                .filter(|v| !v.is_nan())
                .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        })
        .collect()
}

/// Scale the explicit ODE in place and return the factors used.
pub fn scale_equations(model: &mut OcpModel) -> DaeResult<Vec<f64>> {
    let start = Instant::now();
    let ode = model.explicit.equations().to_vec();
    if ode.is_empty() {
        return Ok(Vec::new());
    }

    let mut wrt: Vec<NodeId> = Vec::new();
    wrt.extend(model.registry.symbols(model.explicit.unknowns()));
    wrt.extend(model.registry.symbols(model.algebraic.unknowns()));
    wrt.extend(model.registry.symbols(&model.pi));
    wrt.extend(model.registry.symbols(&model.pf));
    wrt.extend(model.registry.symbols(&model.u));

    // Evaluation point: scaled start values, time and derivatives at zero.
    let mut values: HashMap<NodeId, f64> = HashMap::new();
    values.insert(model.t, 0.0);
    for (_, var) in model.registry.iter() {
        values.insert(var.var, var.start / var.nominal);
        values.insert(var.der, 0.0);
    }

    let jac = model.graph.jacobian(&ode, &wrt)?;
    let numeric = model.graph.evaluate(jac.entries(), &values)?;
    let ncols = wrt.len();
    let jac0 = Mat::from_fn(ode.len(), ncols, |i, j| numeric[i * ncols + j]);

    let mut factors = row_scale_factors(&jac0);
    for (i, factor) in factors.iter_mut().enumerate() {
        if *factor == 0.0 {
            warn!(
                "Could not generate a scaling factor for equation {} (0 == {}), selecting 1",
                i,
                model.graph.render(ode[i])
            );
            *factor = 1.0;
        }
    }

    for (eq, &factor) in model.explicit.equations_mut().iter_mut().zip(&factors) {
        let c = model.graph.constant(factor);
        *eq = model.graph.div(*eq, c);
    }
    info!(
        "Equation scaling complete: {} equations in {:.3}s",
        factors.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use daesort_core::Category;

    #[test]
    fn test_row_factors_ignore_nan() {
        let m = Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => -4.0,
            (0, 1) => 2.0,
            (1, 0) => f64::NAN,
            _ => 0.0,
        });
        let f = row_scale_factors(&m);
        assert_eq!(f[0], 4.0);
        assert_eq!(f[1], 0.0);
    }

    #[test]
    fn test_scale_equations_divides_by_row_norm() {
        let mut m = OcpModel::new();
        let x = m.declare("x", Category::State).unwrap();
        let y = m.declare("y", Category::State).unwrap();
        let xs = m.registry.get(x).var;
        let ten = m.graph.constant(-10.0);
        let rhs_x = m.graph.mul(ten, xs);
        let rhs_y = m.graph.constant(3.0);
        m.push_ode(x, rhs_x);
        m.push_ode(y, rhs_y);

        let factors = scale_equations(&mut m).unwrap();
        assert_eq!(factors, vec![10.0, 1.0]);
        let values = HashMap::from([(xs, 1.0)]);
        let scaled = m.graph.evaluate(m.explicit.equations(), &values).unwrap();
        assert_eq!(scaled, vec![-1.0, 3.0]);
    }

    #[test]
    fn test_scaled_model_is_evaluated_in_nominal_units() {
        // der(x) = x^2 with nominal 4 and start 2
        let mut m = OcpModel::new();
        let x = m.declare("x", Category::State).unwrap();
        m.set_nominal("x", 4.0).unwrap();
        m.set_start("x", 2.0).unwrap();
        let xs = m.registry.get(x).var;
        let rhs = m.graph.mul(xs, xs);
        m.implicit.take();
        m.push_ode(x, rhs);

        m.scale_variables().unwrap();
        // rhs is now (4 x)^2; its slope 32 x at x = 2 / 4 is 16
        let factors = scale_equations(&mut m).unwrap();
        assert_eq!(factors, vec![16.0]);
    }
}
