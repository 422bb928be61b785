//! Shared helpers for the integration tests.

#![allow(dead_code)]

use daesort_core::{Category, NodeId, OcpModel, VarId};

/// Route log output through the test harness (respects RUST_LOG).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Declare a variable and return its id, value symbol and derivative symbol.
pub fn declare(model: &mut OcpModel, name: &str, category: Category) -> (VarId, NodeId, NodeId) {
    let id = model.declare(name, category).unwrap();
    let var = model.registry.get(id);
    (id, var.var, var.der)
}

pub fn assert_close(left: f64, right: f64) {
    assert!(
        (left - right).abs() < 1e-10,
        "expected {} to be close to {}",
        left,
        right
    );
}
