//! Model-level structural passes.
//!
//! | Pass | Precondition | On an unsolvable block |
//! |------|--------------|------------------------|
//! | [`Causalizer::sort_dae`] | #equations == #states | - |
//! | [`Causalizer::sort_alg`] | #equations == #algebraic variables | - |
//! | [`Causalizer::identify_alg`] | none | - |
//! | [`Causalizer::make_explicit`] | #equations == #states | the whole pass fails |
//! | [`Causalizer::eliminate_algebraic`] | #equations == #algebraic variables | the block stays implicit |
//!
//! Every pass returns immediately when its collections are empty. A failing
//! pass may leave a permutation applied; the model should then be discarded.
//!
//! ```ignore
//! use daesort_algo::{Causalizer, CausalizeConfig};
//!
//! let causalizer = Causalizer::new().with_inverse_threshold(4);
//! causalizer.identify_alg(&mut model)?;
//! causalizer.make_explicit(&mut model)?;
//! let report = causalizer.eliminate_algebraic(&mut model)?;
//! println!("{} algebraic blocks stayed implicit", report.retained_blocks);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info, warn};

use daesort_core::{
    Category, DaeError, DaeResult, EquationSystem, ExprGraph, NodeId, OcpModel, VarId,
    VariableRegistry,
};

use crate::scaling;
use crate::structural::block_solve::DEFAULT_INVERSE_THRESHOLD;
use crate::structural::{
    BlockDecomposer, BlockSolver, BltOrdering, DependencyAnalyzer, DependentEliminator,
    DifferentialSplit, EquationClassifier,
};

/// Tuning knobs of the causalization passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CausalizeConfig {
    /// Largest block solved by explicit inverse; larger blocks use QR.
    pub inverse_threshold: usize,
    /// Assert that the dependent set is free of dependent variables after elimination.
    pub verify_acyclic: bool,
}

impl Default for CausalizeConfig {
    fn default() -> Self {
        Self {
            inverse_threshold: DEFAULT_INVERSE_THRESHOLD,
            verify_acyclic: true,
        }
    }
}

/// Outcome of a causalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalizationReport {
    pub blocks: usize,
    pub solved_blocks: usize,
    pub retained_blocks: usize,
    pub solved_equations: usize,
    pub retained_equations: usize,
}

/// Runs the structural passes with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Causalizer {
    config: CausalizeConfig,
    decomposer: BlockDecomposer,
}

impl Causalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: CausalizeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_inverse_threshold(mut self, threshold: usize) -> Self {
        self.config.inverse_threshold = threshold;
        self
    }

    pub fn config(&self) -> &CausalizeConfig {
        &self.config
    }

    fn solver(&self) -> BlockSolver {
        BlockSolver::new(self.config.inverse_threshold)
    }

    fn eliminator(&self) -> DependentEliminator {
        DependentEliminator::new(self.config.verify_acyclic)
    }

    /// BLT-order `system` by its dependence on `unknowns`.
    fn sort_system(
        &self,
        pass: &'static str,
        graph: &ExprGraph,
        system: &mut EquationSystem,
        unknowns: &[NodeId],
    ) -> DaeResult<BltOrdering> {
        let mut analyzer = DependencyAnalyzer::new(graph, system.equations(), unknowns)?;
        let pattern = analyzer.pattern();
        let blt = self.decomposer.decompose(pass, &pattern)?;
        system.permute(blt.row_perm(), blt.col_perm())?;
        Ok(blt)
    }

    /// Reorder the implicit DAE into BLT form with respect to the state derivatives.
    pub fn sort_dae(&self, model: &mut OcpModel) -> DaeResult<BltOrdering> {
        if model.implicit.is_empty() {
            return Ok(BltOrdering::empty());
        }
        let start = Instant::now();
        let ders = model.implicit_derivatives();
        let blt = self.sort_system("sort_dae", &model.graph, &mut model.implicit, &ders)?;
        info!(
            "sort_dae: {} equations in {} blocks ({:.3}s)",
            blt.len(),
            blt.num_blocks(),
            start.elapsed().as_secs_f64()
        );
        Ok(blt)
    }

    /// Reorder the algebraic equations into BLT form with respect to the algebraic variables.
    pub fn sort_alg(&self, model: &mut OcpModel) -> DaeResult<BltOrdering> {
        if model.algebraic.is_empty() {
            return Ok(BltOrdering::empty());
        }
        let start = Instant::now();
        let z = model.algebraic_symbols();
        let blt = self.sort_system("sort_alg", &model.graph, &mut model.algebraic, &z)?;
        info!(
            "sort_alg: {} equations in {} blocks ({:.3}s)",
            blt.len(),
            blt.num_blocks(),
            start.elapsed().as_secs_f64()
        );
        Ok(blt)
    }

    /// Move equations without derivatives, and states whose derivative appears
    /// nowhere, from the implicit DAE to the algebraic part.
    pub fn identify_alg(&self, model: &mut OcpModel) -> DaeResult<DifferentialSplit> {
        if model.implicit.is_empty() {
            return Ok(DifferentialSplit::default());
        }
        let ders = model.implicit_derivatives();
        let split =
            EquationClassifier::split_differential(&model.graph, model.implicit.equations(), &ders)?;
        let moved = model
            .implicit
            .split_off_masked(&split.differential_equations, &split.differential_states)?;
        for &id in moved.unknowns() {
            model.registry.get_mut(id).category = Category::Algebraic;
        }
        info!(
            "identify_alg: {} differential and {} algebraic equations",
            model.implicit.num_equations(),
            moved.num_equations()
        );
        model.algebraic.append(moved);
        Ok(split)
    }

    /// Solve the implicit DAE for the state derivatives, block by block.
    ///
    /// All or nothing: if any block cannot be solved explicitly the pass fails
    /// with [`DaeError::UnsolvableBlock`] and nothing is moved to the explicit ODE.
    pub fn make_explicit(&self, model: &mut OcpModel) -> DaeResult<CausalizationReport> {
        if model.implicit.is_empty() {
            return Ok(CausalizationReport::default());
        }
        let start = Instant::now();
        let ders = model.implicit_derivatives();
        let blt = self.sort_system("make_explicit", &model.graph, &mut model.implicit, &ders)?;

        let ders = model.implicit_derivatives();
        let equations = model.implicit.equations().to_vec();
        let states = model.implicit.unknowns().to_vec();
        let jac = model.graph.jacobian(&equations, &ders)?;
        let solver = self.solver();
        let mut ode = Vec::with_capacity(equations.len());
        for b in 0..blt.num_blocks() {
            let rows = blt.block_rows(b);
            let cols = blt.block_cols(b);
            let targets = &ders[cols.clone()];
            let jb = jac.block(rows.clone(), cols.clone());
            if !EquationClassifier::is_explicit_block(&model.graph, &jb, targets) {
                return Err(unsolvable_block(&model.registry, &states, b, rows, cols));
            }
            match solver.solve(&mut model.graph, &equations[rows.clone()], targets, &jb)? {
                Some(solution) => ode.extend(solution),
                None => return Err(unsolvable_block(&model.registry, &states, b, rows, cols)),
            }
            debug!("make_explicit: solved block {} of size {}", b, rows.len());
        }
        model.graph.substitute_in_place(&ders, &mut ode)?;

        model.implicit.take();
        model.explicit.append(EquationSystem::from_parts(ode, states));
        info!(
            "make_explicit: {} blocks solved for {} derivatives ({:.3}s)",
            blt.num_blocks(),
            blt.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(CausalizationReport {
            blocks: blt.num_blocks(),
            solved_blocks: blt.num_blocks(),
            retained_blocks: 0,
            solved_equations: blt.len(),
            retained_equations: 0,
        })
    }

    /// Solve algebraic blocks that are linear in their variables and move them
    /// to the dependent set; the remaining blocks stay implicit.
    pub fn eliminate_algebraic(&self, model: &mut OcpModel) -> DaeResult<CausalizationReport> {
        if model.algebraic.is_empty() {
            return Ok(CausalizationReport::default());
        }
        let start = Instant::now();
        let z = model.algebraic_symbols();
        let blt = self.sort_system("eliminate_algebraic", &model.graph, &mut model.algebraic, &z)?;

        let z = model.algebraic_symbols();
        let equations = model.algebraic.equations().to_vec();
        let unknowns = model.algebraic.unknowns().to_vec();
        let jac = model.graph.jacobian(&equations, &z)?;
        let solver = self.solver();
        let mut report = CausalizationReport {
            blocks: blt.num_blocks(),
            ..CausalizationReport::default()
        };
        let mut resolved = EquationSystem::new();
        let mut retained = EquationSystem::new();
        for b in 0..blt.num_blocks() {
            let rows = blt.block_rows(b);
            let cols = blt.block_cols(b);
            let targets = &z[cols.clone()];
            let jb = jac.block(rows.clone(), cols.clone());
            let solution = if EquationClassifier::is_explicit_block(&model.graph, &jb, targets) {
                solver.solve(&mut model.graph, &equations[rows.clone()], targets, &jb)?
            } else {
                None
            };
            match solution {
                Some(solution) => {
                    for (expr, &var) in solution.into_iter().zip(&unknowns[cols]) {
                        resolved.push(expr, var);
                    }
                    report.solved_blocks += 1;
                    report.solved_equations += rows.len();
                }
                None => {
                    let err = unsolvable_block(&model.registry, &unknowns, b, rows.clone(), cols.clone());
                    warn!("eliminate_algebraic: keeping block implicit: {}", err);
                    for &e in &equations[rows.clone()] {
                        retained.push_equation(e);
                    }
                    for &v in &unknowns[cols] {
                        retained.push_unknown(v);
                    }
                    report.retained_blocks += 1;
                    report.retained_equations += rows.len();
                }
            }
        }

        model.algebraic = retained;
        self.eliminator().eliminate(model, resolved)?;
        info!(
            "eliminate_algebraic: {} of {} blocks solved, {} equations remain implicit ({:.3}s)",
            report.solved_blocks,
            report.blocks,
            report.retained_equations,
            start.elapsed().as_secs_f64()
        );
        Ok(report)
    }

    /// Order the dependent parameters by their binding equations.
    pub fn sort_dependent_parameters(&self, model: &mut OcpModel) -> DaeResult<()> {
        if model.pd.is_empty() {
            return Ok(());
        }
        let v = model.registry.symbols(&model.pd);
        let y = model.dependent_symbols();
        let dep = model.dependent.equations().to_vec();
        let bound = model.graph.substitute(&v, &y, &dep)?;
        let residual: Vec<NodeId> = v
            .iter()
            .zip(&bound)
            .map(|(&var, &def)| model.graph.sub(var, def))
            .collect();
        let pattern = DependencyAnalyzer::new(&model.graph, &residual, &v)?.pattern();
        let d = self.decomposer.decompose_raw(&pattern);
        model.pd = d.col_perm.iter().map(|&j| model.pd[j]).collect();
        debug!("sort_dependent_parameters: {} parameters", model.pd.len());
        Ok(())
    }

    /// Chain the dependent definitions so none references a dependent variable.
    pub fn eliminate_interdependencies(&self, model: &mut OcpModel) -> DaeResult<()> {
        self.eliminator().eliminate_interdependencies(model)
    }

    /// Substitute the dependent definitions into every other collection.
    pub fn eliminate_dependent(&self, model: &mut OcpModel) -> DaeResult<()> {
        self.eliminator().eliminate_dependent(model)
    }

    /// Divide each ODE right-hand side by its Jacobian row norm at the start point.
    pub fn scale_equations(&self, model: &mut OcpModel) -> DaeResult<Vec<f64>> {
        scaling::scale_equations(model)
    }
}

fn unsolvable_block(
    registry: &VariableRegistry,
    unknowns: &[VarId],
    block: usize,
    rows: Range<usize>,
    cols: Range<usize>,
) -> DaeError {
    DaeError::UnsolvableBlock {
        block,
        first_equation: rows.start,
        end_equation: rows.end,
        variables: registry.names(&unknowns[cols]),
    }
}

/// The structural passes as methods on the model, with the default configuration.
pub trait StructuralPasses {
    fn sort_dae(&mut self) -> DaeResult<BltOrdering>;
    fn sort_alg(&mut self) -> DaeResult<BltOrdering>;
    fn identify_alg(&mut self) -> DaeResult<DifferentialSplit>;
    fn make_explicit(&mut self) -> DaeResult<CausalizationReport>;
    fn eliminate_algebraic(&mut self) -> DaeResult<CausalizationReport>;
    fn sort_dependent_parameters(&mut self) -> DaeResult<()>;
    fn eliminate_interdependencies(&mut self) -> DaeResult<()>;
    fn eliminate_dependent(&mut self) -> DaeResult<()>;
    fn scale_equations(&mut self) -> DaeResult<Vec<f64>>;
}

impl StructuralPasses for OcpModel {
    fn sort_dae(&mut self) -> DaeResult<BltOrdering> {
        Causalizer::new().sort_dae(self)
    }

    fn sort_alg(&mut self) -> DaeResult<BltOrdering> {
        Causalizer::new().sort_alg(self)
    }

    fn identify_alg(&mut self) -> DaeResult<DifferentialSplit> {
        Causalizer::new().identify_alg(self)
    }

    fn make_explicit(&mut self) -> DaeResult<CausalizationReport> {
        Causalizer::new().make_explicit(self)
    }

    fn eliminate_algebraic(&mut self) -> DaeResult<CausalizationReport> {
        Causalizer::new().eliminate_algebraic(self)
    }

    fn sort_dependent_parameters(&mut self) -> DaeResult<()> {
        Causalizer::new().sort_dependent_parameters(self)
    }

    fn eliminate_interdependencies(&mut self) -> DaeResult<()> {
        Causalizer::new().eliminate_interdependencies(self)
    }

    fn eliminate_dependent(&mut self) -> DaeResult<()> {
        Causalizer::new().eliminate_dependent(self)
    }

    fn scale_equations(&mut self) -> DaeResult<Vec<f64>> {
        Causalizer::new().scale_equations(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_partial_json() {
        let config: CausalizeConfig = serde_json::from_str(r#"{"inverse_threshold": 5}"#).unwrap();
        assert_eq!(config.inverse_threshold, 5);
        assert!(config.verify_acyclic);
        assert_eq!(CausalizeConfig::default().inverse_threshold, 3);
    }

    #[test]
    fn test_builder() {
        let c = Causalizer::new().with_inverse_threshold(1);
        assert_eq!(c.config().inverse_threshold, 1);
        let c = c.with_config(CausalizeConfig {
            inverse_threshold: 7,
            verify_acyclic: false,
        });
        assert_eq!(c.config().inverse_threshold, 7);
        assert!(!c.config().verify_acyclic);
    }

    #[test]
    fn test_empty_model_passes_are_no_ops() {
        let mut m = OcpModel::new();
        let c = Causalizer::new();
        assert!(c.sort_dae(&mut m).unwrap().is_empty());
        assert!(c.sort_alg(&mut m).unwrap().is_empty());
        assert_eq!(c.identify_alg(&mut m).unwrap(), DifferentialSplit::default());
        assert_eq!(c.make_explicit(&mut m).unwrap(), CausalizationReport::default());
        assert_eq!(
            c.eliminate_algebraic(&mut m).unwrap(),
            CausalizationReport::default()
        );
        c.sort_dependent_parameters(&mut m).unwrap();
    }

    #[test]
    fn test_sort_dae_dimension_mismatch() {
        let mut m = OcpModel::new();
        let x = m.declare("x", Category::State).unwrap();
        m.declare("y", Category::State).unwrap();
        let dx = m.registry.get(x).der;
        m.push_implicit_equation(dx);
        assert_eq!(
            m.sort_dae().unwrap_err(),
            DaeError::DimensionMismatch {
                pass: "sort_dae",
                equations: 1,
                variables: 2
            }
        );
    }
}
