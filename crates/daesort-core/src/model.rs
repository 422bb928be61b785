//! The symbolic optimal-control model the structural passes operate on.
//!
//! An [`OcpModel`] owns the expression graph, the variable registry and every
//! equation collection. Loaders populate it through [`OcpModel::add_variable`]
//! and the `push_*` helpers; the structural passes in `daesort-algo` then
//! permute, reclassify and eliminate in place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{DaeError, DaeResult};
use crate::expr::{ExprGraph, NodeId};
use crate::system::{Constraint, EquationSystem};
use crate::variable::{Category, Causality, VarId, Variable, VariableRegistry};

/// Which collections a model-wide substitution touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubstitutionScope {
    /// Everything except the dependent definitions themselves.
    ExceptDependent,
    /// Every collection including the dependent definitions.
    All,
}

/// Symbolic DAE-constrained optimal control problem.
#[derive(Debug, Clone)]
pub struct OcpModel {
    pub graph: ExprGraph,
    /// Independent variable.
    pub t: NodeId,
    pub registry: VariableRegistry,

    /// Fully implicit DAE `0 = f(t, s, der(s), ...)` and its states.
    pub implicit: EquationSystem,
    /// Explicit ODE `der(x) = ode(...)` and its differential states.
    pub explicit: EquationSystem,
    /// Algebraic equations `0 = alg(...)` and the algebraic variables.
    pub algebraic: EquationSystem,
    /// Quadrature equations `der(q) = quad(...)` and the quadrature states.
    pub quadrature: EquationSystem,
    /// Dependent definitions `y = dep(...)`, ordered so that each entry only
    /// references dependent variables of earlier entries.
    pub dependent: EquationSystem,

    /// Controls.
    pub u: Vec<VarId>,
    /// Independent parameters.
    pub pi: Vec<VarId>,
    /// Free parameters.
    pub pf: Vec<VarId>,
    /// Dependent parameters.
    pub pd: Vec<VarId>,
    /// Independent constants.
    pub ci: Vec<VarId>,
    /// Dependent constants.
    pub cd: Vec<VarId>,

    pub initial: Vec<NodeId>,
    pub path: Vec<Constraint>,
    pub point: Vec<Constraint>,
    pub mayer: Vec<NodeId>,
    pub lagrange: Vec<NodeId>,

    pub t0: Option<f64>,
    pub tf: Option<f64>,
}

impl Default for OcpModel {
    fn default() -> Self {
        Self::new()
    }
}

impl OcpModel {
    pub fn new() -> Self {
        let mut graph = ExprGraph::new();
        let t = graph.symbol("time");
        Self {
            graph,
            t,
            registry: VariableRegistry::new(),
            implicit: EquationSystem::new(),
            explicit: EquationSystem::new(),
            algebraic: EquationSystem::new(),
            quadrature: EquationSystem::new(),
            dependent: EquationSystem::new(),
            u: Vec::new(),
            pi: Vec::new(),
            pf: Vec::new(),
            pd: Vec::new(),
            ci: Vec::new(),
            cd: Vec::new(),
            initial: Vec::new(),
            path: Vec::new(),
            point: Vec::new(),
            mayer: Vec::new(),
            lagrange: Vec::new(),
            t0: None,
            tf: None,
        }
    }

    /// Register `var` and route it to the collection its category selects.
    pub fn add_variable(&mut self, var: Variable) -> DaeResult<VarId> {
        let category = var.category;
        let causality = var.causality;
        let free = var.free;
        let id = self.registry.insert(var)?;
        match category {
            Category::Derivative => {}
            Category::State => self.implicit.push_unknown(id),
            Category::DependentConstant => self.cd.push(id),
            Category::IndependentConstant => self.ci.push(id),
            Category::DependentParameter => self.pd.push(id),
            Category::IndependentParameter => {
                if free {
                    self.pf.push(id)
                } else {
                    self.pi.push(id)
                }
            }
            Category::Control => self.u.push(id),
            Category::Algebraic => match causality {
                Causality::Internal | Causality::Output => self.implicit.push_unknown(id),
                Causality::Input => self.u.push(id),
            },
        }
        debug!("Added variable {} ({})", self.registry.get(id).name, category);
        Ok(id)
    }

    /// Create a variable with default attributes and register it.
    pub fn declare(&mut self, name: &str, category: Category) -> DaeResult<VarId> {
        let var = Variable::new(&mut self.graph, name, category);
        self.add_variable(var)
    }

    pub fn variable(&self, name: &str) -> DaeResult<&Variable> {
        self.registry.by_name(name)
    }

    pub fn variable_mut(&mut self, name: &str) -> DaeResult<&mut Variable> {
        self.registry.by_name_mut(name)
    }

    /// Value symbol of the variable `name`.
    pub fn var(&self, name: &str) -> DaeResult<NodeId> {
        Ok(self.variable(name)?.var)
    }

    /// Derivative symbol of the variable `name`.
    pub fn der(&self, name: &str) -> DaeResult<NodeId> {
        Ok(self.variable(name)?.der)
    }

    pub fn set_nominal(&mut self, name: &str, value: f64) -> DaeResult<()> {
        self.variable_mut(name)?.nominal = value;
        Ok(())
    }

    pub fn set_min(&mut self, name: &str, value: f64) -> DaeResult<()> {
        self.variable_mut(name)?.min = value;
        Ok(())
    }

    pub fn set_max(&mut self, name: &str, value: f64) -> DaeResult<()> {
        self.variable_mut(name)?.max = value;
        Ok(())
    }

    pub fn set_start(&mut self, name: &str, value: f64) -> DaeResult<()> {
        self.variable_mut(name)?.start = value;
        Ok(())
    }

    pub fn set_initial_guess(&mut self, name: &str, value: f64) -> DaeResult<()> {
        self.variable_mut(name)?.initial_guess = value;
        Ok(())
    }

    pub fn set_derivative_start(&mut self, name: &str, value: f64) -> DaeResult<()> {
        self.variable_mut(name)?.derivative_start = value;
        Ok(())
    }

    pub fn set_unit(&mut self, name: &str, unit: &str) -> DaeResult<()> {
        self.variable_mut(name)?.unit = unit.to_string();
        Ok(())
    }

    pub fn nominal(&self, name: &str) -> DaeResult<f64> {
        Ok(self.variable(name)?.nominal)
    }

    /// Lower bound, optionally in units of the nominal value.
    pub fn min(&self, name: &str, scaled: bool) -> DaeResult<f64> {
        let v = self.variable(name)?;
        Ok(if scaled { v.min / v.nominal } else { v.min })
    }

    /// Upper bound, optionally in units of the nominal value.
    pub fn max(&self, name: &str, scaled: bool) -> DaeResult<f64> {
        let v = self.variable(name)?;
        Ok(if scaled { v.max / v.nominal } else { v.max })
    }

    /// Start value, optionally in units of the nominal value.
    pub fn start(&self, name: &str, scaled: bool) -> DaeResult<f64> {
        let v = self.variable(name)?;
        Ok(if scaled { v.start / v.nominal } else { v.start })
    }

    pub fn push_implicit_equation(&mut self, residual: NodeId) {
        self.implicit.push_equation(residual);
    }

    pub fn push_algebraic_equation(&mut self, residual: NodeId) {
        self.algebraic.push_equation(residual);
    }

    /// Append `der(state) = rhs` to the explicit ODE.
    pub fn push_ode(&mut self, state: VarId, rhs: NodeId) {
        self.explicit.push(rhs, state);
    }

    /// Append the definition `var = expr` after the existing dependent entries.
    pub fn push_dependent(&mut self, var: VarId, expr: NodeId) {
        self.dependent.push(expr, var);
    }

    pub fn push_initial(&mut self, residual: NodeId) {
        self.initial.push(residual);
    }

    pub fn push_path(&mut self, constraint: Constraint) {
        self.path.push(constraint);
    }

    pub fn push_point(&mut self, constraint: Constraint) {
        self.point.push(constraint);
    }

    pub fn push_mayer(&mut self, term: NodeId) {
        self.mayer.push(term);
    }

    pub fn push_lagrange(&mut self, term: NodeId) {
        self.lagrange.push(term);
    }

    /// Value symbols of the implicit states.
    pub fn implicit_states(&self) -> Vec<NodeId> {
        self.registry.symbols(self.implicit.unknowns())
    }

    /// Derivative symbols of the implicit states.
    pub fn implicit_derivatives(&self) -> Vec<NodeId> {
        self.registry.derivatives(self.implicit.unknowns())
    }

    pub fn algebraic_symbols(&self) -> Vec<NodeId> {
        self.registry.symbols(self.algebraic.unknowns())
    }

    pub fn dependent_symbols(&self) -> Vec<NodeId> {
        self.registry.symbols(self.dependent.unknowns())
    }

    /// Simultaneously replace `old[k]` by `new[k]` across the model's collections.
    ///
    /// All expressions go through one substitution so shared subexpressions are
    /// rewritten once.
    pub fn substitute_collections(
        &mut self,
        old: &[NodeId],
        new: &[NodeId],
        scope: SubstitutionScope,
    ) -> DaeResult<()> {
        let with_dependent = scope == SubstitutionScope::All;
        let mut exprs: Vec<NodeId> = Vec::new();
        exprs.extend_from_slice(self.implicit.equations());
        exprs.extend_from_slice(self.explicit.equations());
        exprs.extend_from_slice(self.algebraic.equations());
        exprs.extend_from_slice(self.quadrature.equations());
        if with_dependent {
            exprs.extend_from_slice(self.dependent.equations());
        }
        exprs.extend_from_slice(&self.initial);
        exprs.extend(self.path.iter().map(|c| c.expr));
        exprs.extend(self.point.iter().map(|c| c.expr));
        exprs.extend_from_slice(&self.mayer);
        exprs.extend_from_slice(&self.lagrange);

        let rewritten = self.graph.substitute(&exprs, old, new)?;
        let mut values = rewritten.into_iter();
        refill(self.implicit.equations_mut().iter_mut(), &mut values);
        refill(self.explicit.equations_mut().iter_mut(), &mut values);
        refill(self.algebraic.equations_mut().iter_mut(), &mut values);
        refill(self.quadrature.equations_mut().iter_mut(), &mut values);
        if with_dependent {
            refill(self.dependent.equations_mut().iter_mut(), &mut values);
        }
        refill(self.initial.iter_mut(), &mut values);
        refill(self.path.iter_mut().map(|c| &mut c.expr), &mut values);
        refill(self.point.iter_mut().map(|c| &mut c.expr), &mut values);
        refill(self.mayer.iter_mut(), &mut values);
        refill(self.lagrange.iter_mut(), &mut values);
        Ok(())
    }

    /// Turn every Lagrange term into a quadrature state `q_k` whose final value
    /// joins the Mayer terms.
    ///
    /// Fails with [`DaeError::DuplicateVariable`] before touching the model if
    /// some `q_k` name is already registered.
    pub fn eliminate_lagrange_terms(&mut self) -> DaeResult<()> {
        if let Some(name) = (0..self.lagrange.len())
            .map(|k| format!("q_{k}"))
            .find(|name| self.registry.by_name(name).is_ok())
        {
            return Err(DaeError::DuplicateVariable(name));
        }
        let terms = std::mem::take(&mut self.lagrange);
        for (k, term) in terms.iter().enumerate() {
            let mut q = Variable::new(&mut self.graph, format!("q_{k}"), Category::State)
                .with_causality(Causality::Internal)
                .with_start(0.0);
            if let Some(tf) = self.tf {
                q = q.with_nominal(tf);
            }
            let symbol = q.var;
            let id = self.registry.insert(q)?;
            self.quadrature.push(*term, id);
            self.mayer.push(symbol);
        }
        debug!("Converted {} Lagrange terms to quadrature states", terms.len());
        Ok(())
    }

    /// Move the quadrature states and equations to the end of the explicit ODE.
    pub fn eliminate_quadrature_states(&mut self) {
        let quadrature = self.quadrature.take();
        debug!(
            "Moved {} quadrature states to the ODE",
            quadrature.num_unknowns()
        );
        self.explicit.append(quadrature);
    }

    /// Express the model in nominal-scaled variables: every time-dependent
    /// unknown and parameter `v` is replaced by `v * nominal(v)`.
    pub fn scale_variables(&mut self) -> DaeResult<()> {
        let start = Instant::now();
        let mut old = Vec::new();
        let mut new = Vec::new();
        let mut scaled = |var: NodeId, nominal: f64, graph: &mut ExprGraph| {
            if nominal != 1.0 {
                let n = graph.constant(nominal);
                old.push(var);
                new.push(graph.mul(var, n));
            }
        };
        for &id in self.implicit.unknowns() {
            let v = self.registry.get(id);
            scaled(v.var, v.nominal, &mut self.graph);
            scaled(v.der, v.nominal, &mut self.graph);
        }
        for ids in [
            self.explicit.unknowns(),
            self.algebraic.unknowns(),
            self.pi.as_slice(),
            self.pf.as_slice(),
            self.u.as_slice(),
        ] {
            for &id in ids {
                let v = self.registry.get(id);
                scaled(v.var, v.nominal, &mut self.graph);
            }
        }
        self.substitute_collections(&old, &new, SubstitutionScope::All)?;
        info!(
            "Variable scaling complete: {} symbols rescaled in {:.3}s",
            old.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

fn refill<'a>(slots: impl Iterator<Item = &'a mut NodeId>, values: &mut impl Iterator<Item = NodeId>) {
    for (slot, value) in slots.zip(values) {
        *slot = value;
    }
}

impl fmt::Display for OcpModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |ids: &[VarId]| self.registry.names(ids).join(", ");
        writeln!(f, "Dimensions:")?;
        writeln!(f, "  #s = {}", self.implicit.num_unknowns())?;
        writeln!(f, "  #x = {}", self.explicit.num_unknowns())?;
        writeln!(f, "  #z = {}", self.algebraic.num_unknowns())?;
        writeln!(f, "  #q = {}", self.quadrature.num_unknowns())?;
        writeln!(f, "  #y = {}", self.dependent.num_unknowns())?;
        writeln!(f, "  #u = {}", self.u.len())?;
        writeln!(f, "Variables:")?;
        writeln!(f, "  s = [{}]", names(self.implicit.unknowns()))?;
        writeln!(f, "  x = [{}]", names(self.explicit.unknowns()))?;
        writeln!(f, "  z = [{}]", names(self.algebraic.unknowns()))?;
        writeln!(f, "  q = [{}]", names(self.quadrature.unknowns()))?;
        writeln!(f, "  y = [{}]", names(self.dependent.unknowns()))?;
        writeln!(f, "  pi = [{}]", names(&self.pi))?;
        writeln!(f, "  pf = [{}]", names(&self.pf))?;
        writeln!(f, "  u = [{}]", names(&self.u))?;
        if !self.implicit.equations().is_empty() {
            writeln!(f, "Fully-implicit equations:")?;
            for &e in self.implicit.equations() {
                writeln!(f, "  0 == {}", self.graph.render(e))?;
            }
        }
        if !self.explicit.is_empty() {
            writeln!(f, "Differential equations:")?;
            for (&e, &x) in self.explicit.equations().iter().zip(self.explicit.unknowns()) {
                writeln!(f, "  der({}) == {}", self.registry.get(x).name, self.graph.render(e))?;
            }
        }
        if !self.algebraic.equations().is_empty() {
            writeln!(f, "Algebraic equations:")?;
            for &e in self.algebraic.equations() {
                writeln!(f, "  0 == {}", self.graph.render(e))?;
            }
        }
        if !self.dependent.is_empty() {
            writeln!(f, "Dependent equations:")?;
            for (&e, &y) in self.dependent.equations().iter().zip(self.dependent.unknowns()) {
                writeln!(f, "  {} == {}", self.registry.get(y).name, self.graph.render(e))?;
            }
        }
        if !self.mayer.is_empty() {
            let terms: Vec<String> = self.mayer.iter().map(|&e| self.graph.render(e)).collect();
            writeln!(f, "Mayer objective terms: [{}]", terms.join(", "))?;
        }
        if !self.lagrange.is_empty() {
            let terms: Vec<String> = self.lagrange.iter().map(|&e| self.graph.render(e)).collect();
            writeln!(f, "Lagrange objective terms: [{}]", terms.join(", "))?;
        }
        Ok(())
    }
}
