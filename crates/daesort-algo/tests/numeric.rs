//! Numeric checks of symbolic block solutions

mod common;

use std::collections::HashMap;

use common::{assert_close, declare, init_tracing};
use daesort_algo::{BlockSolver, CausalizationReport, CausalizeConfig, Causalizer, StructuralPasses};
use daesort_core::{Category, ExprGraph, NodeId, OcpModel};
use faer::{prelude::*, solvers::PartialPivLu, Mat};

const A: [[f64; 4]; 4] = [
    [4.0, 1.0, 0.0, 1.0],
    [1.0, 4.0, 1.0, 0.0],
    [0.0, 1.0, 4.0, 1.0],
    [1.0, 0.0, 1.0, 4.0],
];
const B: [f64; 4] = [1.0, 2.0, 3.0, 4.0];

/// Residuals `A x - b` of a dense linear system.
fn linear_residuals(g: &mut ExprGraph, xs: &[NodeId]) -> Vec<NodeId> {
    (0..4)
        .map(|i| {
            let terms: Vec<NodeId> = (0..4)
                .map(|j| {
                    let c = g.constant(A[i][j]);
                    g.mul(c, xs[j])
                })
                .collect();
            let lhs = g.sum(&terms);
            let b = g.constant(B[i]);
            g.sub(lhs, b)
        })
        .collect()
}

fn lu_reference() -> Vec<f64> {
    let mat = Mat::from_fn(4, 4, |i, j| A[i][j]);
    let rhs = Mat::from_fn(4, 1, |i, _| B[i]);
    let lu = PartialPivLu::new(mat.as_ref());
    let sol = lu.solve(&rhs);
    (0..4).map(|i| sol.read(i, 0)).collect()
}

#[test]
fn block_solutions_match_lu() {
    let expected = lu_reference();
    for threshold in [3, 4] {
        let mut g = ExprGraph::new();
        let xs: Vec<NodeId> = (0..4).map(|i| g.symbol(&format!("x{i}"))).collect();
        let eqs = linear_residuals(&mut g, &xs);
        let jac = g.jacobian(&eqs, &xs).unwrap();
        let sol = BlockSolver::new(threshold)
            .solve(&mut g, &eqs, &xs, &jac)
            .unwrap()
            .unwrap();
        let values = g.evaluate(&sol, &HashMap::new()).unwrap();
        for (v, e) in values.iter().zip(&expected) {
            assert_close(*v, *e);
        }
    }
}

#[test]
fn explicit_ode_satisfies_implicit_equations() {
    init_tracing();
    // der(x) + der(y) = k x, der(x) - der(y) = y, 2 der(z) - der(x) = z
    let mut m = OcpModel::new();
    let (_, k, _) = declare(&mut m, "k", Category::IndependentParameter);
    let (_, x, dx) = declare(&mut m, "x", Category::State);
    let (_, y, dy) = declare(&mut m, "y", Category::State);
    let (_, z, dz) = declare(&mut m, "z", Category::State);
    let two = m.graph.constant(2.0);
    let s = m.graph.add(dx, dy);
    let kx = m.graph.mul(k, x);
    let e1 = m.graph.sub(s, kx);
    let d = m.graph.sub(dx, dy);
    let e2 = m.graph.sub(d, y);
    let tdz = m.graph.mul(two, dz);
    let t = m.graph.sub(tdz, dx);
    let e3 = m.graph.sub(t, z);
    let original = vec![e1, e2, e3];
    for &e in &original {
        m.push_implicit_equation(e);
    }

    let report = m.make_explicit().unwrap();
    assert_eq!(report.blocks, 2);
    let ders = m.registry.derivatives(m.explicit.unknowns());
    assert!(!m.graph.depends_on(m.explicit.equations(), &ders));

    let mut values = HashMap::from([(k, 4.0), (x, 1.0), (y, 2.0), (z, 3.0)]);
    let rates = m.graph.evaluate(m.explicit.equations(), &values).unwrap();
    for (&der, &rate) in ders.iter().zip(&rates) {
        values.insert(der, rate);
    }
    assert_close(values[&dx], 3.0);
    assert_close(values[&dy], 1.0);
    assert_close(values[&dz], 3.0);
    for r in m.graph.evaluate(&original, &values).unwrap() {
        assert_close(r, 0.0);
    }
}

#[test]
fn qr_and_inverse_give_the_same_ode() {
    let build = || {
        let mut m = OcpModel::new();
        let states: Vec<(NodeId, NodeId)> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| {
                let (_, v, d) = declare(&mut m, name, Category::State);
                (v, d)
            })
            .collect();
        let ders: Vec<NodeId> = states.iter().map(|&(_, d)| d).collect();
        for (i, e) in linear_residuals(&mut m.graph, &ders).into_iter().enumerate() {
            let e = m.graph.add(e, states[i].0);
            m.push_implicit_equation(e);
        }
        m
    };

    let mut by_inverse = build();
    let mut by_qr = build();
    Causalizer::new()
        .with_inverse_threshold(4)
        .make_explicit(&mut by_inverse)
        .unwrap();
    Causalizer::new()
        .with_inverse_threshold(1)
        .make_explicit(&mut by_qr)
        .unwrap();

    let point = |m: &OcpModel| -> HashMap<NodeId, f64> {
        ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, name)| (m.var(name).unwrap(), 0.5 * i as f64))
            .collect()
    };
    let l = by_inverse
        .graph
        .evaluate(by_inverse.explicit.equations(), &point(&by_inverse))
        .unwrap();
    let r = by_qr
        .graph
        .evaluate(by_qr.explicit.equations(), &point(&by_qr))
        .unwrap();
    assert_eq!(
        by_inverse.registry.names(by_inverse.explicit.unknowns()),
        by_qr.registry.names(by_qr.explicit.unknowns())
    );
    for (a, b) in l.iter().zip(&r) {
        assert_close(*a, *b);
    }
}

#[test]
fn equation_scaling_after_make_explicit() {
    // der(x) = -100 x + y, der(y) = 0.5 x
    let mut m = OcpModel::new();
    let (_, x, dx) = declare(&mut m, "x", Category::State);
    let (_, y, dy) = declare(&mut m, "y", Category::State);
    m.set_start("x", 1.0).unwrap();
    let c100 = m.graph.constant(-100.0);
    let t = m.graph.mul(c100, x);
    let rhs_x = m.graph.add(t, y);
    let half = m.graph.constant(0.5);
    let rhs_y = m.graph.mul(half, x);
    let e1 = m.graph.sub(dx, rhs_x);
    let e2 = m.graph.sub(dy, rhs_y);
    m.push_implicit_equation(e1);
    m.push_implicit_equation(e2);

    m.make_explicit().unwrap();
    let factors = m.scale_equations().unwrap();
    assert_eq!(factors.len(), 2);
    assert_close(factors[0], 100.0);
    assert_close(factors[1], 0.5);

    let scaled = m
        .graph
        .evaluate(m.explicit.equations(), &HashMap::from([(x, 1.0), (y, 0.0)]))
        .unwrap();
    assert_close(scaled[0], -1.0);
    assert_close(scaled[1], 1.0);
}

#[test]
fn config_round_trips_through_json() {
    let config = CausalizeConfig {
        inverse_threshold: 6,
        verify_acyclic: false,
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: CausalizeConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    let empty: CausalizeConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(empty, CausalizeConfig::default());

    let report = CausalizationReport {
        blocks: 3,
        solved_blocks: 2,
        retained_blocks: 1,
        solved_equations: 2,
        retained_equations: 2,
    };
    let value = serde_json::to_value(report).unwrap();
    assert_eq!(value["retained_blocks"], 1);
}
