//! End-to-end pipeline tests: encode -> solve -> decode, and the worker
//! message loop against in-memory store and queue fakes.

use std::sync::Arc;
use std::time::Duration;

use ar_common::{
    codec, Grid, Problem, ProblemData, ProblemName, ProblemStatus, ProblemType, ResultMessage,
    SolutionData,
};
use ar_queue::mock::MemoryQueue;
use ar_solver::models::sudoku::{sat_assignment_to_grid, sudoku_to_sat};
use ar_solver::{
    Assignment, Disposition, Ir, SatSolverAdapter, SolverAdapter, SolverRegistry, WorkerContext,
};
use ar_store::{MemoryStore, ProblemStore};

fn canonical_grid() -> Grid {
    [
        "530070000",
        "600195000",
        "098000060",
        "800060003",
        "400803001",
        "700020006",
        "060000280",
        "000419005",
        "000080079",
    ]
    .iter()
    .map(|row| row.bytes().map(|b| b - b'0').collect())
    .collect()
}

fn sudoku_problem(id: &str, problem_type: ProblemType, grid: Grid) -> Problem {
    Problem::new(
        id.to_string(),
        problem_type,
        ProblemName::Sudoku,
        ProblemData::Sudoku { grid },
    )
}

/// Every row, column, and box contains 1..=9 exactly once.
fn is_valid_completion(grid: &Grid) -> bool {
    let complete = |cells: &[u8]| {
        let mut seen = [false; 10];
        for &cell in cells {
            if cell == 0 || seen[cell as usize] {
                return false;
            }
            seen[cell as usize] = true;
        }
        true
    };
    for row in grid {
        if !complete(row) {
            return false;
        }
    }
    for c in 0..9 {
        let column: Vec<u8> = (0..9).map(|r| grid[r][c]).collect();
        if !complete(&column) {
            return false;
        }
    }
    for box_r in 0..3 {
        for box_c in 0..3 {
            let mut cells = Vec::with_capacity(9);
            for r in box_r * 3..box_r * 3 + 3 {
                for c in box_c * 3..box_c * 3 + 3 {
                    cells.push(grid[r][c]);
                }
            }
            if !complete(&cells) {
                return false;
            }
        }
    }
    true
}

fn preserves_clues(clues: &Grid, solved: &Grid) -> bool {
    clues.iter().zip(solved).all(|(clue_row, solved_row)| {
        clue_row
            .iter()
            .zip(solved_row)
            .all(|(&clue, &cell)| clue == 0 || clue == cell)
    })
}

fn worker(store: Arc<MemoryStore>, queue: Arc<MemoryQueue>) -> WorkerContext {
    WorkerContext {
        worker_id: 0,
        registry: Arc::new(SolverRegistry::builtin(Duration::from_secs(60))),
        store,
        queue,
    }
}

async fn enqueue_in_progress_candidate(store: &MemoryStore, problem: &Problem) -> Vec<u8> {
    let mut record = problem.clone();
    record.status = ProblemStatus::InQueue;
    store.save(&record).await.unwrap();
    codec::encode_problem(&record).unwrap()
}

#[test]
fn test_sat_sudoku_encode_solve_decode() {
    let clues = canonical_grid();
    let formulation = sudoku_to_sat(&clues);

    let outcome = SatSolverAdapter::default().solve(&Ir::Sat(formulation));
    assert!(outcome.is_solved);

    let Assignment::Sat(assignment) = &outcome.assignment else {
        panic!("expected SAT assignment");
    };
    let solved = sat_assignment_to_grid(assignment);

    assert!(is_valid_completion(&solved));
    assert!(preserves_clues(&clues, &solved));
    assert_eq!(solved[0][0], 5);
    assert_eq!(solved[0][1], 3);
    assert_eq!(solved[8][8], 9);
}

#[test]
#[ignore = "exercises the full branch-and-bound search over 729 binary variables"]
fn test_ip_sudoku_encode_solve_decode() {
    use ar_solver::models::sudoku::{ip_assignment_to_grid, sudoku_to_ip};
    use ar_solver::IpSolverAdapter;

    let clues = canonical_grid();
    let formulation = sudoku_to_ip(&clues);

    let outcome = IpSolverAdapter::default().solve(&Ir::Ip(formulation));
    assert!(outcome.is_solved);

    let Assignment::Ip(variables) = &outcome.assignment else {
        panic!("expected IP assignment");
    };
    let solved = ip_assignment_to_grid(variables);

    assert!(is_valid_completion(&solved));
    assert!(preserves_clues(&clues, &solved));
}

#[tokio::test]
async fn test_worker_solves_sat_sudoku_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let ctx = worker(store.clone(), queue.clone());

    let problem = sudoku_problem("sat-1", ProblemType::Sat, canonical_grid());
    let body = enqueue_in_progress_candidate(&store, &problem).await;

    assert_eq!(ctx.handle_message(&body).await, Disposition::Ack);

    // record is terminal with the decoded grid attached
    let record = store.load("sat-1").await.unwrap().unwrap();
    assert_eq!(record.status, ProblemStatus::Solved);
    let Some(SolutionData::Sudoku { grid, .. }) = &record.solution else {
        panic!("expected sudoku solution data");
    };
    assert!(is_valid_completion(grid));
    assert!(record.solution_time.is_some());

    // result message announced on the result queue
    let results = queue.result_messages();
    assert_eq!(results.len(), 1);
    let message: ResultMessage = serde_json::from_slice(&results[0]).unwrap();
    assert_eq!(message.problem_id, "sat-1");
    assert_eq!(message.status, ProblemStatus::Solved);
    assert!(message.output.is_some());
}

#[tokio::test]
async fn test_worker_reports_unsolvable_for_contradictory_clues() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let ctx = worker(store.clone(), queue.clone());

    // two 5s in row 0
    let mut grid = vec![vec![0u8; 9]; 9];
    grid[0][0] = 5;
    grid[0][1] = 5;
    let problem = sudoku_problem("bad-1", ProblemType::Sat, grid);
    let body = enqueue_in_progress_candidate(&store, &problem).await;

    assert_eq!(ctx.handle_message(&body).await, Disposition::Ack);

    let record = store.load("bad-1").await.unwrap().unwrap();
    assert_eq!(record.status, ProblemStatus::Unsolvable);
    assert!(record.solution.is_none());

    let message: ResultMessage =
        serde_json::from_slice(&queue.result_messages()[0]).unwrap();
    assert_eq!(message.status, ProblemStatus::Unsolvable);
}

#[tokio::test]
async fn test_worker_emits_unsupported_for_unregistered_pair() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let ctx = worker(store.clone(), queue.clone());

    let mut problem = sudoku_problem("knap-1", ProblemType::Ip, canonical_grid());
    problem.problem_name = ProblemName::Knapsack;
    let body = enqueue_in_progress_candidate(&store, &problem).await;

    assert_eq!(ctx.handle_message(&body).await, Disposition::Ack);

    let record = store.load("knap-1").await.unwrap().unwrap();
    assert_eq!(record.status, ProblemStatus::Unsupported);
    assert!(record.solution.is_none());
    assert!(record.error_message.as_deref().unwrap().contains("knapsack"));

    let message: ResultMessage =
        serde_json::from_slice(&queue.result_messages()[0]).unwrap();
    assert_eq!(message.status, ProblemStatus::Unsupported);
}

#[tokio::test]
async fn test_worker_drops_malformed_message_without_touching_store() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let ctx = worker(store.clone(), queue.clone());

    assert_eq!(
        ctx.handle_message(b"definitely not msgpack").await,
        Disposition::Ack
    );
    assert!(store.scan_ids().await.unwrap().is_empty());
    assert!(queue.result_messages().is_empty());
}

#[tokio::test]
async fn test_worker_ignores_duplicate_delivery_of_terminal_problem() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let ctx = worker(store.clone(), queue.clone());

    let mut problem = sudoku_problem("dup-1", ProblemType::Sat, canonical_grid());
    problem.status = ProblemStatus::Solved;
    store.save(&problem).await.unwrap();
    let body = codec::encode_problem(&problem).unwrap();

    assert_eq!(ctx.handle_message(&body).await, Disposition::Ack);
    // terminal record untouched, nothing re-published
    assert_eq!(
        store.load("dup-1").await.unwrap().unwrap().status,
        ProblemStatus::Solved
    );
    assert!(queue.result_messages().is_empty());
}
