//! Intermediate representations consumed by solver adapters.
//!
//! A domain model compiles a problem into either the IP form (objective,
//! linear constraints, typed variables) or the SAT form (CNF clauses in
//! DIMACS sign convention). Adapters return a [`SolverOutcome`] with the
//! four-value status enum and the raw assignment for the model to decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ar_common::SolveStatistics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ir {
    Ip(IpFormulation),
    Sat(SatFormulation),
}

// ============================================================================
// IP form
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveSense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintSense {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    Binary,
    Integer,
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    #[serde(rename = "type")]
    pub kind: VariableKind,
    pub lb: f64,
    pub ub: f64,
}

impl VariableSpec {
    pub fn binary() -> Self {
        Self {
            kind: VariableKind::Binary,
            lb: 0.0,
            ub: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub coefficients: BTreeMap<String, f64>,
    pub sense: ObjectiveSense,
}

impl Objective {
    /// Constant objective for pure feasibility problems.
    pub fn feasibility() -> Self {
        Self {
            coefficients: BTreeMap::new(),
            sense: ObjectiveSense::Minimize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub coefficients: BTreeMap<String, f64>,
    pub sense: ConstraintSense,
    pub rhs: f64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpFormulation {
    pub objective: Objective,
    pub constraints: Vec<LinearConstraint>,
    pub variables: BTreeMap<String, VariableSpec>,
}

// ============================================================================
// SAT form
// ============================================================================

/// CNF clauses in DIMACS sign convention: positive literal = variable true,
/// negative = negated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatFormulation {
    pub clauses: Vec<Vec<i64>>,
}

impl SatFormulation {
    /// Highest variable index referenced by any clause.
    pub fn variable_count(&self) -> u64 {
        self.clauses
            .iter()
            .flatten()
            .map(|lit| lit.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}

// ============================================================================
// Solver results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Unsolvable,
    Error,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Feasible => "feasible",
            SolveStatus::Unsolvable => "unsolvable",
            SolveStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw variable assignment returned by a back-end kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Assignment {
    /// IP: variable name to value.
    Ip(BTreeMap<String, f64>),
    /// SAT: DIMACS variable index to truth value.
    Sat(BTreeMap<i64, bool>),
    Empty,
}

/// Result of one adapter invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOutcome {
    pub status: SolveStatus,
    pub assignment: Assignment,
    pub objective_value: Option<f64>,
    pub statistics: SolveStatistics,
    pub is_solved: bool,
    /// Infeasibility reason or error description.
    pub message: Option<String>,
}

impl SolverOutcome {
    pub fn solved(
        status: SolveStatus,
        assignment: Assignment,
        objective_value: Option<f64>,
        statistics: SolveStatistics,
    ) -> Self {
        Self {
            status,
            assignment,
            objective_value,
            statistics,
            is_solved: true,
            message: None,
        }
    }

    pub fn unsolvable(reason: impl Into<String>, statistics: SolveStatistics) -> Self {
        Self {
            status: SolveStatus::Unsolvable,
            assignment: Assignment::Empty,
            objective_value: None,
            statistics,
            is_solved: false,
            message: Some(reason.into()),
        }
    }

    pub fn error(message: impl Into<String>, statistics: SolveStatistics) -> Self {
        Self {
            status: SolveStatus::Error,
            assignment: Assignment::Empty,
            objective_value: None,
            statistics,
            is_solved: false,
            message: Some(message.into()),
        }
    }
}
