//! SAT solver adapter over the varisat CDCL kernel.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use varisat::{CnfFormula, ExtendFormula, Lit, Solver};

use ar_common::SolveStatistics;

use crate::adapters::{solve_with_deadline, SolverAdapter, DEFAULT_TIME_LIMIT};
use crate::ir::{Assignment, Ir, SatFormulation, SolveStatus, SolverOutcome};

pub struct SatSolverAdapter {
    time_limit: Duration,
}

impl SatSolverAdapter {
    pub fn new(time_limit: Duration) -> Self {
        Self { time_limit }
    }
}

impl Default for SatSolverAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_LIMIT)
    }
}

impl SolverAdapter for SatSolverAdapter {
    fn name(&self) -> &'static str {
        "varisat"
    }

    fn solve(&self, ir: &Ir) -> SolverOutcome {
        let Ir::Sat(formulation) = ir else {
            return SolverOutcome::error(
                "SAT adapter received a non-SAT formulation",
                SolveStatistics::default(),
            );
        };

        let formulation = formulation.clone();
        let statistics = SolveStatistics {
            wall_time_ms: 0,
            variable_count: formulation.variable_count(),
            constraint_count: formulation.clauses.len() as u64,
        };

        let started = Instant::now();
        match solve_with_deadline(self.time_limit, move || solve_sat(&formulation)) {
            Some(outcome) => outcome,
            None => SolverOutcome::error(
                format!("time limit of {}s exceeded", self.time_limit.as_secs()),
                SolveStatistics {
                    wall_time_ms: started.elapsed().as_millis() as u64,
                    ..statistics
                },
            ),
        }
    }
}

fn solve_sat(formulation: &SatFormulation) -> SolverOutcome {
    let started = Instant::now();

    let mut formula = CnfFormula::new();
    for clause in &formulation.clauses {
        let literals: Vec<Lit> = clause
            .iter()
            .map(|&lit| Lit::from_dimacs(lit as isize))
            .collect();
        formula.add_clause(&literals);
    }

    let mut solver = Solver::new();
    solver.add_formula(&formula);

    let statistics = |elapsed: Duration| SolveStatistics {
        wall_time_ms: elapsed.as_millis() as u64,
        variable_count: formulation.variable_count(),
        constraint_count: formulation.clauses.len() as u64,
    };

    match solver.solve() {
        Ok(true) => {
            let assignment: BTreeMap<i64, bool> = solver
                .model()
                .unwrap_or_default()
                .iter()
                .map(|lit| {
                    let dimacs = lit.to_dimacs();
                    (dimacs.unsigned_abs() as i64, dimacs > 0)
                })
                .collect();
            SolverOutcome::solved(
                SolveStatus::Feasible,
                Assignment::Sat(assignment),
                None,
                statistics(started.elapsed()),
            )
        }
        Ok(false) => SolverOutcome::unsolvable("unsatisfiable", statistics(started.elapsed())),
        Err(e) => SolverOutcome::error(e.to_string(), statistics(started.elapsed())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(clauses: Vec<Vec<i64>>) -> SolverOutcome {
        SatSolverAdapter::default().solve(&Ir::Sat(SatFormulation { clauses }))
    }

    fn truth(outcome: &SolverOutcome, var: i64) -> bool {
        match &outcome.assignment {
            Assignment::Sat(assignment) => assignment[&var],
            other => panic!("expected SAT assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_satisfiable_formula() {
        // (1 or 2) and (not 1) forces 2
        let outcome = solve(vec![vec![1, 2], vec![-1]]);
        assert!(outcome.is_solved);
        assert_eq!(outcome.status, SolveStatus::Feasible);
        assert!(!truth(&outcome, 1));
        assert!(truth(&outcome, 2));
    }

    #[test]
    fn test_unsatisfiable_formula() {
        let outcome = solve(vec![vec![1], vec![-1]]);
        assert!(!outcome.is_solved);
        assert_eq!(outcome.status, SolveStatus::Unsolvable);
        assert_eq!(outcome.message.as_deref(), Some("unsatisfiable"));
    }

    #[test]
    fn test_unit_clauses_pin_assignment() {
        let outcome = solve(vec![vec![3], vec![-2], vec![1, 2]]);
        assert!(truth(&outcome, 3));
        assert!(!truth(&outcome, 2));
        assert!(truth(&outcome, 1));
    }

    #[test]
    fn test_mismatched_ir_reports_error() {
        let formulation = crate::ir::IpFormulation {
            objective: crate::ir::Objective::feasibility(),
            constraints: vec![],
            variables: Default::default(),
        };
        let outcome = SatSolverAdapter::default().solve(&Ir::Ip(formulation));
        assert_eq!(outcome.status, SolveStatus::Error);
        assert!(!outcome.is_solved);
    }
}
