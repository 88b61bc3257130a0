//! Sudoku domain model.
//!
//! Encodes a 9x9 grid (0 = empty cell) into either form:
//!
//! - **IP:** binary variables `x_{i}_{j}_{k}` for cell `(i, j)` holding digit
//!   `k`, with exactly-one equality constraints per cell, row, column, and
//!   box, unit equalities fixing the clues, and a constant objective.
//! - **SAT:** variable `81*r + 9*c + v + 1` for cell `(r, c)` holding digit
//!   `v + 1`, with at-least-one clauses per cell, pairwise at-most-one
//!   clauses per cell/row/column/box, and unit clauses for the clues.

use std::collections::BTreeMap;

use tracing::debug;

use ar_common::{
    Grid, Problem, ProblemData, ProblemStatus, ProblemType, Solution, SolutionData,
};

use crate::ir::{
    Assignment, ConstraintSense, Ir, IpFormulation, LinearConstraint, Objective, SatFormulation,
    SolveStatus, SolverOutcome, VariableSpec,
};
use crate::models::{DomainModel, ModelError};

pub const GRID_SIZE: usize = 9;
pub const BOX_SIZE: usize = 3;

pub struct SudokuModel;

impl DomainModel for SudokuModel {
    fn encode(&self, problem: &Problem) -> Result<Ir, ModelError> {
        let ProblemData::Sudoku { grid } = &problem.problem_data;
        validate_grid(grid)?;
        match problem.problem_type {
            ProblemType::Ip => Ok(Ir::Ip(sudoku_to_ip(grid))),
            ProblemType::Sat => Ok(Ir::Sat(sudoku_to_sat(grid))),
            other => Err(ModelError::UnsupportedBackend(other)),
        }
    }

    fn decode(&self, problem: &Problem, outcome: SolverOutcome) -> Result<Solution, ModelError> {
        let solution_time = Some(outcome.statistics.wall_time_ms as f64 / 1000.0);
        match outcome.status {
            SolveStatus::Optimal | SolveStatus::Feasible => {
                let grid = match &outcome.assignment {
                    Assignment::Ip(variables) => ip_assignment_to_grid(variables),
                    Assignment::Sat(assignment) => sat_assignment_to_grid(assignment),
                    Assignment::Empty => return Err(ModelError::MissingAssignment),
                };
                Ok(Solution {
                    problem_id: problem.problem_id.clone(),
                    status: ProblemStatus::Solved,
                    solution_data: Some(SolutionData::Sudoku {
                        grid,
                        statistics: outcome.statistics,
                        status: outcome.status.as_str().to_string(),
                    }),
                    solution_time,
                    error_message: None,
                })
            }
            SolveStatus::Unsolvable => Ok(Solution {
                problem_id: problem.problem_id.clone(),
                status: ProblemStatus::Unsolvable,
                solution_data: None,
                solution_time,
                error_message: outcome.message,
            }),
            SolveStatus::Error => Ok(Solution {
                problem_id: problem.problem_id.clone(),
                status: ProblemStatus::Failed,
                solution_data: None,
                solution_time,
                error_message: outcome
                    .message
                    .or_else(|| Some("solver error".to_string())),
            }),
        }
    }
}

fn validate_grid(grid: &Grid) -> Result<(), ModelError> {
    if grid.len() != GRID_SIZE {
        return Err(ModelError::InvalidInput(format!(
            "grid must have {} rows, got {}",
            GRID_SIZE,
            grid.len()
        )));
    }
    for (i, row) in grid.iter().enumerate() {
        if row.len() != GRID_SIZE {
            return Err(ModelError::InvalidInput(format!(
                "row {} must have {} cells, got {}",
                i,
                GRID_SIZE,
                row.len()
            )));
        }
        if let Some(cell) = row.iter().find(|cell| **cell > 9) {
            return Err(ModelError::InvalidInput(format!(
                "row {} contains invalid digit {}",
                i, cell
            )));
        }
    }
    Ok(())
}

fn var_name(i: usize, j: usize, k: usize) -> String {
    format!("x_{}_{}_{}", i, j, k)
}

/// IP formulation: 729 binary assignment variables, exactly-one equality
/// constraints, constant objective.
pub fn sudoku_to_ip(grid: &Grid) -> IpFormulation {
    let mut variables = BTreeMap::new();
    for i in 0..GRID_SIZE {
        for j in 0..GRID_SIZE {
            for k in 1..=GRID_SIZE {
                variables.insert(var_name(i, j, k), VariableSpec::binary());
            }
        }
    }

    let mut constraints = Vec::new();
    let equality = |coefficients: BTreeMap<String, f64>, name: String| LinearConstraint {
        coefficients,
        sense: ConstraintSense::Eq,
        rhs: 1.0,
        name,
    };

    // each cell picks exactly one digit
    for i in 0..GRID_SIZE {
        for j in 0..GRID_SIZE {
            let coefficients = (1..=GRID_SIZE).map(|k| (var_name(i, j, k), 1.0)).collect();
            constraints.push(equality(coefficients, format!("cell_{}_{}_one_value", i, j)));
        }
    }

    // clue cells fix their binary variable
    for i in 0..GRID_SIZE {
        for j in 0..GRID_SIZE {
            let clue = grid[i][j] as usize;
            if clue != 0 {
                let coefficients = [(var_name(i, j, clue), 1.0)].into_iter().collect();
                constraints.push(equality(coefficients, format!("clue_{}_{}", i, j)));
            }
        }
    }

    // row uniqueness per digit
    for i in 0..GRID_SIZE {
        for k in 1..=GRID_SIZE {
            let coefficients = (0..GRID_SIZE).map(|j| (var_name(i, j, k), 1.0)).collect();
            constraints.push(equality(coefficients, format!("row_{}_digit_{}", i, k)));
        }
    }

    // column uniqueness per digit
    for j in 0..GRID_SIZE {
        for k in 1..=GRID_SIZE {
            let coefficients = (0..GRID_SIZE).map(|i| (var_name(i, j, k), 1.0)).collect();
            constraints.push(equality(coefficients, format!("col_{}_digit_{}", j, k)));
        }
    }

    // box uniqueness per digit
    for box_i in 0..BOX_SIZE {
        for box_j in 0..BOX_SIZE {
            for k in 1..=GRID_SIZE {
                let mut coefficients = BTreeMap::new();
                for i in box_i * BOX_SIZE..(box_i + 1) * BOX_SIZE {
                    for j in box_j * BOX_SIZE..(box_j + 1) * BOX_SIZE {
                        coefficients.insert(var_name(i, j, k), 1.0);
                    }
                }
                constraints.push(equality(
                    coefficients,
                    format!("box_{}_{}_digit_{}", box_i, box_j, k),
                ));
            }
        }
    }

    debug!(
        variables = variables.len(),
        constraints = constraints.len(),
        "generated IP formulation"
    );

    IpFormulation {
        objective: Objective::feasibility(),
        constraints,
        variables,
    }
}

/// Extract the grid from binary assignment variables `x_i_j_k`, rounding
/// each value to the nearest integer.
pub fn ip_assignment_to_grid(variables: &BTreeMap<String, f64>) -> Grid {
    let mut grid = vec![vec![0u8; GRID_SIZE]; GRID_SIZE];
    for (name, value) in variables {
        let mut parts = name.split('_');
        if parts.next() != Some("x") {
            continue;
        }
        let indices: Option<(usize, usize, usize)> = (|| {
            let i = parts.next()?.parse().ok()?;
            let j = parts.next()?.parse().ok()?;
            let k = parts.next()?.parse().ok()?;
            Some((i, j, k))
        })();
        if let Some((i, j, k)) = indices {
            if i < GRID_SIZE && j < GRID_SIZE && (1..=GRID_SIZE).contains(&k) && value.round() == 1.0
            {
                grid[i][j] = k as u8;
            }
        }
    }
    grid
}

/// DIMACS variable for cell `(r, c)` holding digit `v + 1` (1-based).
pub fn sat_var(r: usize, c: usize, v: usize) -> i64 {
    (81 * r + 9 * c + v + 1) as i64
}

/// SAT formulation: at-least-one clause per cell, pairwise at-most-one
/// clauses per cell/row/column/box, unit clauses for clues.
pub fn sudoku_to_sat(grid: &Grid) -> SatFormulation {
    let mut clauses: Vec<Vec<i64>> = Vec::new();

    // at least one value per cell
    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            clauses.push((0..GRID_SIZE).map(|v| sat_var(r, c, v)).collect());
        }
    }

    // at most one value per cell
    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            pairwise_at_most_one(
                &mut clauses,
                &(0..GRID_SIZE).map(|v| sat_var(r, c, v)).collect::<Vec<_>>(),
            );
        }
    }

    // each value at most once per row
    for r in 0..GRID_SIZE {
        for v in 0..GRID_SIZE {
            pairwise_at_most_one(
                &mut clauses,
                &(0..GRID_SIZE).map(|c| sat_var(r, c, v)).collect::<Vec<_>>(),
            );
        }
    }

    // each value at most once per column
    for c in 0..GRID_SIZE {
        for v in 0..GRID_SIZE {
            pairwise_at_most_one(
                &mut clauses,
                &(0..GRID_SIZE).map(|r| sat_var(r, c, v)).collect::<Vec<_>>(),
            );
        }
    }

    // each value at most once per box
    for box_r in 0..BOX_SIZE {
        for box_c in 0..BOX_SIZE {
            for v in 0..GRID_SIZE {
                let mut cells = Vec::with_capacity(GRID_SIZE);
                for r in box_r * BOX_SIZE..(box_r + 1) * BOX_SIZE {
                    for c in box_c * BOX_SIZE..(box_c + 1) * BOX_SIZE {
                        cells.push(sat_var(r, c, v));
                    }
                }
                pairwise_at_most_one(&mut clauses, &cells);
            }
        }
    }

    // clues become unit clauses
    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            let clue = grid[r][c];
            if clue != 0 {
                clauses.push(vec![sat_var(r, c, clue as usize - 1)]);
            }
        }
    }

    debug!(clauses = clauses.len(), "generated SAT formulation");
    SatFormulation { clauses }
}

fn pairwise_at_most_one(clauses: &mut Vec<Vec<i64>>, vars: &[i64]) {
    for (idx, a) in vars.iter().enumerate() {
        for b in &vars[idx + 1..] {
            clauses.push(vec![-a, -b]);
        }
    }
}

/// Rebuild the grid from true-assigned literals.
pub fn sat_assignment_to_grid(assignment: &BTreeMap<i64, bool>) -> Grid {
    let mut grid = vec![vec![0u8; GRID_SIZE]; GRID_SIZE];
    for (&var, &value) in assignment {
        if !value || !(1..=729).contains(&var) {
            continue;
        }
        let idx = (var - 1) as usize;
        let r = idx / 81;
        let c = (idx % 81) / 9;
        let v = idx % 9;
        grid[r][c] = (v + 1) as u8;
    }
    grid
}
