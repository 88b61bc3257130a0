//! Domain models: encode a named problem into a back-end IR and decode the
//! raw solver result back into the domain answer.

use thiserror::Error;

use ar_common::{Problem, ProblemType, Solution};

use crate::ir::{Ir, SolverOutcome};

pub mod sudoku;

pub use sudoku::SudokuModel;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no {0} encoding for this problem")]
    UnsupportedBackend(ProblemType),

    #[error("solver returned no usable assignment")]
    MissingAssignment,
}

/// Two-stage transform around a solver adapter: `Problem -> IR` and
/// `raw result -> Solution`.
pub trait DomainModel: Send + Sync {
    fn encode(&self, problem: &Problem) -> Result<Ir, ModelError>;

    fn decode(&self, problem: &Problem, outcome: SolverOutcome) -> Result<Solution, ModelError>;
}
