//! Model variables and the name-keyed registry that owns them.
//!
//! A variable is created once, registered once, and afterwards referred to by
//! its [`VarId`] from every collection that mentions it. Each variable owns two
//! symbols in the expression graph: its value and its time derivative
//! (`der(name)`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{DaeError, DaeResult};
use crate::expr::{ExprGraph, NodeId};

/// Stable handle of a registered variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn new(value: usize) -> Self {
        VarId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Classification of a variable. Closed: routing matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    IndependentConstant,
    DependentConstant,
    IndependentParameter,
    DependentParameter,
    State,
    Algebraic,
    Control,
    Derivative,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::IndependentConstant => "independent_constant",
            Category::DependentConstant => "dependent_constant",
            Category::IndependentParameter => "independent_parameter",
            Category::DependentParameter => "dependent_parameter",
            Category::State => "state",
            Category::Algebraic => "algebraic",
            Category::Control => "control",
            Category::Derivative => "derivative",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DaeError;

    /// Accepts snake_case and the camelCase spellings used by model descriptions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "").as_str() {
            "independentconstant" => Ok(Category::IndependentConstant),
            "dependentconstant" => Ok(Category::DependentConstant),
            "independentparameter" => Ok(Category::IndependentParameter),
            "dependentparameter" => Ok(Category::DependentParameter),
            "state" => Ok(Category::State),
            "algebraic" => Ok(Category::Algebraic),
            "control" => Ok(Category::Control),
            "derivative" => Ok(Category::Derivative),
            _ => Err(DaeError::UnknownCategory(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Causality {
    Input,
    Output,
    #[default]
    Internal,
}

/// A named symbolic unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    /// Symbol for the value.
    pub var: NodeId,
    /// Symbol for the time derivative.
    pub der: NodeId,
    pub category: Category,
    pub causality: Causality,
    /// Free (optimized) parameter.
    pub free: bool,
    pub start: f64,
    pub min: f64,
    pub max: f64,
    pub nominal: f64,
    pub initial_guess: f64,
    pub derivative_start: f64,
    pub unit: String,
}

impl Variable {
    /// Create the variable and its two symbols in `graph`.
    pub fn new(graph: &mut ExprGraph, name: impl Into<String>, category: Category) -> Self {
        let name = name.into();
        let var = graph.symbol(&name);
        let der = graph.symbol(&format!("der({name})"));
        Self {
            name,
            var,
            der,
            category,
            causality: Causality::Internal,
            free: false,
            start: 0.0,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            nominal: 1.0,
            initial_guess: 0.0,
            derivative_start: 0.0,
            unit: String::new(),
        }
    }

    pub fn with_causality(mut self, causality: Causality) -> Self {
        self.causality = causality;
        self
    }

    pub fn with_free(mut self, free: bool) -> Self {
        self.free = free;
        self
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_nominal(mut self, nominal: f64) -> Self {
        self.nominal = nominal;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Name-keyed owner of every variable in a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableRegistry {
    vars: Vec<Variable>,
    by_name: HashMap<String, VarId>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Register a variable; names are unique.
    pub fn insert(&mut self, var: Variable) -> DaeResult<VarId> {
        if self.by_name.contains_key(&var.name) {
            return Err(DaeError::DuplicateVariable(var.name));
        }
        let id = VarId(self.vars.len());
        self.by_name.insert(var.name.clone(), id);
        self.vars.push(var);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> DaeResult<VarId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| DaeError::UnknownVariable(name.to_string()))
    }

    pub fn get(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.0]
    }

    pub fn by_name(&self, name: &str) -> DaeResult<&Variable> {
        self.id(name).map(|id| self.get(id))
    }

    pub fn by_name_mut(&mut self, name: &str) -> DaeResult<&mut Variable> {
        let id = self.id(name)?;
        Ok(self.get_mut(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.vars.iter().enumerate().map(|(i, v)| (VarId(i), v))
    }

    /// Value symbols of `ids`, in order.
    pub fn symbols(&self, ids: &[VarId]) -> Vec<NodeId> {
        ids.iter().map(|&id| self.get(id).var).collect()
    }

    /// Derivative symbols of `ids`, in order.
    pub fn derivatives(&self, ids: &[VarId]) -> Vec<NodeId> {
        ids.iter().map(|&id| self.get(id).der).collect()
    }

    pub fn names(&self, ids: &[VarId]) -> Vec<String> {
        ids.iter().map(|&id| self.get(id).name.clone()).collect()
    }
}
