//! IP solver adapter over the microlp MILP kernel.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use microlp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem as LpProblem};
use tracing::warn;

use ar_common::SolveStatistics;

use crate::adapters::{solve_with_deadline, SolverAdapter, DEFAULT_TIME_LIMIT};
use crate::ir::{
    Assignment, ConstraintSense, Ir, IpFormulation, ObjectiveSense, SolveStatus, SolverOutcome,
    VariableKind,
};

pub struct IpSolverAdapter {
    time_limit: Duration,
}

impl IpSolverAdapter {
    pub fn new(time_limit: Duration) -> Self {
        Self { time_limit }
    }
}

impl Default for IpSolverAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_LIMIT)
    }
}

impl SolverAdapter for IpSolverAdapter {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn solve(&self, ir: &Ir) -> SolverOutcome {
        let Ir::Ip(formulation) = ir else {
            return SolverOutcome::error(
                "IP adapter received a non-IP formulation",
                SolveStatistics::default(),
            );
        };

        let formulation = formulation.clone();
        let statistics = SolveStatistics {
            wall_time_ms: 0,
            variable_count: formulation.variables.len() as u64,
            constraint_count: formulation.constraints.len() as u64,
        };

        let started = Instant::now();
        match solve_with_deadline(self.time_limit, move || solve_ip(&formulation)) {
            Some(outcome) => outcome,
            None => SolverOutcome::error(
                format!(
                    "time limit of {}s exceeded",
                    self.time_limit.as_secs()
                ),
                SolveStatistics {
                    wall_time_ms: started.elapsed().as_millis() as u64,
                    ..statistics
                },
            ),
        }
    }
}

fn solve_ip(formulation: &IpFormulation) -> SolverOutcome {
    let started = Instant::now();
    let direction = match formulation.objective.sense {
        ObjectiveSense::Minimize => OptimizationDirection::Minimize,
        ObjectiveSense::Maximize => OptimizationDirection::Maximize,
    };
    let mut problem = LpProblem::new(direction);

    let mut variables = BTreeMap::new();
    for (name, spec) in &formulation.variables {
        let objective_coef = formulation
            .objective
            .coefficients
            .get(name)
            .copied()
            .unwrap_or(0.0);
        let variable = match spec.kind {
            VariableKind::Binary => problem.add_integer_var(objective_coef, (0, 1)),
            VariableKind::Integer => problem.add_integer_var(
                objective_coef,
                (clamp_bound(spec.lb), clamp_bound(spec.ub)),
            ),
            VariableKind::Continuous => problem.add_var(objective_coef, (spec.lb, spec.ub)),
        };
        variables.insert(name.clone(), variable);
    }

    for name in formulation.objective.coefficients.keys() {
        if !variables.contains_key(name) {
            warn!(variable = %name, "objective references undeclared variable, skipping");
        }
    }

    for constraint in &formulation.constraints {
        let mut expr = LinearExpr::empty();
        for (name, coef) in &constraint.coefficients {
            match variables.get(name) {
                Some(variable) => expr.add(*variable, *coef),
                None => warn!(
                    variable = %name,
                    constraint = %constraint.name,
                    "constraint references undeclared variable, skipping coefficient"
                ),
            }
        }
        let op = match constraint.sense {
            ConstraintSense::Le => ComparisonOp::Le,
            ConstraintSense::Ge => ComparisonOp::Ge,
            ConstraintSense::Eq => ComparisonOp::Eq,
        };
        problem.add_constraint(expr, op, constraint.rhs);
    }

    let statistics = |elapsed: Duration| SolveStatistics {
        wall_time_ms: elapsed.as_millis() as u64,
        variable_count: formulation.variables.len() as u64,
        constraint_count: formulation.constraints.len() as u64,
    };

    match problem.solve() {
        Ok(solution) => {
            let assignment: BTreeMap<String, f64> = variables
                .iter()
                .map(|(name, variable)| (name.clone(), solution[*variable]))
                .collect();
            SolverOutcome::solved(
                SolveStatus::Optimal,
                Assignment::Ip(assignment),
                Some(solution.objective()),
                statistics(started.elapsed()),
            )
        }
        Err(e) => {
            let stats = statistics(started.elapsed());
            if matches!(&e, microlp::Error::Infeasible) {
                SolverOutcome::unsolvable("infeasible", stats)
            } else if matches!(&e, microlp::Error::Unbounded) {
                SolverOutcome::unsolvable("unbounded", stats)
            } else {
                SolverOutcome::error(e.to_string(), stats)
            }
        }
    }
}

fn clamp_bound(bound: f64) -> i32 {
    bound.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}
