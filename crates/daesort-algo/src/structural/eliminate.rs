//! Dependent-variable elimination.
//!
//! The dependent set is an ordered list of definitions `y_k = dep_k` in which a
//! definition may only mention dependent variables of earlier entries; after
//! chaining, no definition mentions a dependent variable at all. Newly
//! resolved definitions are merged in front of the existing ones and then
//! substituted into the rest of the model.

use daesort_core::{DaeError, DaeResult, EquationSystem, NodeId, OcpModel, SubstitutionScope};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependentEliminator {
    /// Check that no dependent definition still references a dependent variable.
    pub verify_acyclic: bool,
}

impl Default for DependentEliminator {
    fn default() -> Self {
        Self {
            verify_acyclic: true,
        }
    }
}

impl DependentEliminator {
    pub fn new(verify_acyclic: bool) -> Self {
        Self { verify_acyclic }
    }

    /// Merge `resolved` (definitions in block order) into the dependent set and
    /// eliminate every dependent variable from the other collections.
    pub fn eliminate(&self, model: &mut OcpModel, resolved: EquationSystem) -> DaeResult<()> {
        if !resolved.is_square() {
            return Err(DaeError::LengthMismatch {
                context: "resolved definitions",
                left: resolved.num_unknowns(),
                right: resolved.num_equations(),
            });
        }
        if resolved.is_empty() {
            return Ok(());
        }
        let (new_exprs, new_unknowns) = resolved.into_parts();
        let new_vars = model.registry.symbols(&new_unknowns);
        let old_vars = model.dependent_symbols();
        let old_exprs = model.dependent.equations().to_vec();

        // Express the new definitions through the existing ones, then chain them.
        let mut new_exprs = model.graph.substitute(&new_exprs, &old_vars, &old_exprs)?;
        model.graph.substitute_in_place(&new_vars, &mut new_exprs)?;

        // Existing definitions may mention the newly resolved variables.
        let old_exprs = model.graph.substitute(&old_exprs, &new_vars, &new_exprs)?;
        model.dependent.equations_mut().copy_from_slice(&old_exprs);
        model
            .dependent
            .prepend(EquationSystem::from_parts(new_exprs, new_unknowns));
        debug!(
            "Dependent set grew by {} to {} definitions",
            new_vars.len(),
            model.dependent.num_equations()
        );

        if self.verify_acyclic {
            self.check_acyclic(model)?;
        }
        self.eliminate_dependent(model)
    }

    /// Chain the dependent set in place so no definition mentions a dependent variable.
    pub fn eliminate_interdependencies(&self, model: &mut OcpModel) -> DaeResult<()> {
        let vars = model.dependent_symbols();
        model
            .graph
            .substitute_in_place(&vars, model.dependent.equations_mut())?;
        self.check_acyclic(model)
    }

    /// Substitute every dependent variable by its definition in all other collections.
    pub fn eliminate_dependent(&self, model: &mut OcpModel) -> DaeResult<()> {
        let vars = model.dependent_symbols();
        if vars.is_empty() {
            return Ok(());
        }
        let exprs: Vec<NodeId> = model.dependent.equations().to_vec();
        model.substitute_collections(&vars, &exprs, SubstitutionScope::ExceptDependent)
    }

    /// Fails with [`DaeError::ResidualDependency`] naming the first definition
    /// that still references a dependent variable.
    pub fn check_acyclic(&self, model: &OcpModel) -> DaeResult<()> {
        let vars = model.dependent_symbols();
        match model.graph.first_dependent(model.dependent.equations(), &vars) {
            Some(index) => Err(DaeError::ResidualDependency {
                index,
                variable: model
                    .registry
                    .get(model.dependent.unknowns()[index])
                    .name
                    .clone(),
            }),
            None => Ok(()),
        }
    }
}
