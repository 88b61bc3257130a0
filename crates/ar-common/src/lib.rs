use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod codec;
pub mod logging;

pub use codec::CodecError;

// ============================================================================
// Problem taxonomy
// ============================================================================

/// Back-end intermediate representation a problem is compiled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    Search,
    Csp,
    Sat,
    Ip,
}

impl ProblemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Search => "search",
            ProblemType::Csp => "csp",
            ProblemType::Sat => "sat",
            ProblemType::Ip => "ip",
        }
    }
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named problem family; selects the domain encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemName {
    Sudoku,
    NQueens,
    GraphColoring,
    Knapsack,
}

impl ProblemName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemName::Sudoku => "sudoku",
            ProblemName::NQueens => "n_queens",
            ProblemName::GraphColoring => "graph_coloring",
            ProblemName::Knapsack => "knapsack",
        }
    }
}

impl std::fmt::Display for ProblemName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Status lattice
// ============================================================================

/// Lifecycle status of a problem record.
///
/// Transitions are monotonic: `CREATED -> IN_QUEUE -> IN_PROGRESS -> terminal`.
/// Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemStatus {
    Created,
    InQueue,
    InProgress,
    Solved,
    Unsolvable,
    Unsupported,
    Failed,
}

impl ProblemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemStatus::Created => "CREATED",
            ProblemStatus::InQueue => "IN_QUEUE",
            ProblemStatus::InProgress => "IN_PROGRESS",
            ProblemStatus::Solved => "SOLVED",
            ProblemStatus::Unsolvable => "UNSOLVABLE",
            ProblemStatus::Unsupported => "UNSUPPORTED",
            ProblemStatus::Failed => "FAILED",
        }
    }

    /// A record in a terminal status is immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProblemStatus::Solved
                | ProblemStatus::Unsolvable
                | ProblemStatus::Unsupported
                | ProblemStatus::Failed
        )
    }

    /// Whether `next` is reachable from `self`. Re-applying the current
    /// status is always allowed so that at-least-once result delivery stays
    /// idempotent.
    pub fn can_transition_to(&self, next: ProblemStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            ProblemStatus::Created => matches!(next, ProblemStatus::InQueue),
            ProblemStatus::InQueue => matches!(next, ProblemStatus::InProgress),
            ProblemStatus::InProgress => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ProblemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for ProblemStatus {
    fn default() -> Self {
        ProblemStatus::Created
    }
}

// ============================================================================
// Problem payloads
// ============================================================================

/// A 9x9 Sudoku grid; 0 marks an empty cell.
pub type Grid = Vec<Vec<u8>>;

/// Instance payload of a problem. The `kind` tag discriminates variants on
/// the wire; unknown tags fail decoding with a [`CodecError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProblemData {
    Sudoku { grid: Grid },
}

impl ProblemData {
    pub fn kind(&self) -> &'static str {
        match self {
            ProblemData::Sudoku { .. } => "sudoku",
        }
    }
}

/// Aggregate solver statistics carried in solution payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveStatistics {
    pub wall_time_ms: u64,
    pub variable_count: u64,
    pub constraint_count: u64,
}

/// Decoded solution payload stored on a solved problem record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolutionData {
    Sudoku {
        grid: Grid,
        statistics: SolveStatistics,
        status: String,
    },
    /// Generic IP answer: variable assignment plus objective.
    Assignment {
        variables: BTreeMap<String, f64>,
        objective_value: Option<f64>,
        statistics: SolveStatistics,
        status: String,
    },
}

// ============================================================================
// Problem record
// ============================================================================

/// Persisted problem record, keyed in the KV store by `problem_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub problem_id: String,
    pub problem_type: ProblemType,
    pub problem_name: ProblemName,
    pub problem_data: ProblemData,
    pub created_at: DateTime<Utc>,
    pub status: ProblemStatus,
    #[serde(default)]
    pub solution: Option<SolutionData>,
    #[serde(default)]
    pub solution_time: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Problem {
    pub fn new(
        problem_id: String,
        problem_type: ProblemType,
        problem_name: ProblemName,
        problem_data: ProblemData,
    ) -> Self {
        Self {
            problem_id,
            problem_type,
            problem_name,
            problem_data,
            created_at: Utc::now(),
            status: ProblemStatus::Created,
            solution: None,
            solution_time: None,
            error_message: None,
        }
    }

    /// Codec discriminator of the instance payload.
    pub fn problem_class(&self) -> &'static str {
        self.problem_data.kind()
    }

    /// Apply a result update, honoring the status lattice. Returns `false`
    /// (and leaves the record untouched) when the transition is not allowed.
    pub fn apply_update(&mut self, update: &ResultUpdate) -> bool {
        if !self.status.can_transition_to(update.status) {
            return false;
        }
        self.status = update.status;
        match update.status {
            ProblemStatus::Solved => {
                if let Some(output) = &update.output {
                    if let Ok(data) = serde_json::from_str::<SolutionData>(output) {
                        self.solution = Some(data);
                    }
                }
                self.error_message = None;
            }
            ProblemStatus::Failed | ProblemStatus::Unsupported => {
                self.solution = None;
                self.error_message = update
                    .error_message
                    .clone()
                    .or_else(|| update.output.clone());
            }
            ProblemStatus::Unsolvable => {
                self.solution = None;
                self.error_message = update.error_message.clone();
            }
            _ => {}
        }
        if update.solution_time.is_some() {
            self.solution_time = update.solution_time;
        }
        true
    }

    /// Human-readable rendering of the instance, used by the print route.
    pub fn display_text(&self) -> String {
        let mut out = format!(
            "Problem ID: {}, Type: {}\n",
            self.problem_id, self.problem_type
        );
        match &self.problem_data {
            ProblemData::Sudoku { grid } => {
                for (i, row) in grid.iter().enumerate() {
                    for (j, cell) in row.iter().enumerate() {
                        if *cell == 0 {
                            out.push('_');
                        } else {
                            out.push_str(&cell.to_string());
                        }
                        out.push(' ');
                        if (j + 1) % 3 == 0 && j < 8 {
                            out.push_str("| ");
                        }
                    }
                    if (i + 1) % 3 == 0 && i < 8 {
                        out.push_str("\n------|-------|------\n");
                    } else {
                        out.push('\n');
                    }
                }
            }
        }
        out
    }
}

// ============================================================================
// Result propagation
// ============================================================================

/// Wire message on the result queue.
///
/// The wire field stays `puzzle_id` for compatibility with historical
/// consumers; `problem_id` is accepted on decode during the migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(rename = "puzzle_id", alias = "problem_id")]
    pub problem_id: String,
    pub status: ProblemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Field-level update applied to a problem record when a result arrives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultUpdate {
    pub status: ProblemStatus,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub solution_time: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ResultUpdate {
    pub fn status_only(status: ProblemStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// Outcome of solving one problem, produced by a domain model and written
/// back onto the problem record. `solution_data` is present exactly when
/// `status == SOLVED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub problem_id: String,
    pub status: ProblemStatus,
    pub solution_data: Option<SolutionData>,
    #[serde(default)]
    pub solution_time: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Solution {
    pub fn unsupported(problem_id: &str, message: impl Into<String>) -> Self {
        Self {
            problem_id: problem_id.to_string(),
            status: ProblemStatus::Unsupported,
            solution_data: None,
            solution_time: None,
            error_message: Some(message.into()),
        }
    }

    pub fn failed(problem_id: &str, message: impl Into<String>) -> Self {
        Self {
            problem_id: problem_id.to_string(),
            status: ProblemStatus::Failed,
            solution_data: None,
            solution_time: None,
            error_message: Some(message.into()),
        }
    }

    fn output(&self) -> Option<String> {
        match &self.solution_data {
            Some(data) => serde_json::to_string(data).ok(),
            None => self.error_message.clone(),
        }
    }

    /// Field-level update to persist this solution onto its record.
    pub fn to_update(&self) -> ResultUpdate {
        ResultUpdate {
            status: self.status,
            output: self.output(),
            solution_time: self.solution_time,
            error_message: self.error_message.clone(),
        }
    }

    /// Wire message announcing this solution on the result queue.
    pub fn to_result_message(&self) -> ResultMessage {
        ResultMessage {
            problem_id: self.problem_id.clone(),
            status: self.status,
            output: self.output(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sudoku_problem() -> Problem {
        Problem::new(
            "p-1".to_string(),
            ProblemType::Ip,
            ProblemName::Sudoku,
            ProblemData::Sudoku {
                grid: vec![vec![0; 9]; 9],
            },
        )
    }

    #[test]
    fn test_status_lattice_forward_only() {
        use ProblemStatus::*;
        assert!(Created.can_transition_to(InQueue));
        assert!(InQueue.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Solved));
        assert!(InProgress.can_transition_to(Unsolvable));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(Unsupported));

        // no backward or skipping transitions
        assert!(!InQueue.can_transition_to(Created));
        assert!(!Solved.can_transition_to(InProgress));
        assert!(!Solved.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Solved));

        // idempotent re-application
        assert!(Solved.can_transition_to(Solved));
    }

    #[test]
    fn test_terminal_statuses() {
        use ProblemStatus::*;
        for status in [Solved, Unsolvable, Unsupported, Failed] {
            assert!(status.is_terminal());
        }
        for status in [Created, InQueue, InProgress] {
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn test_apply_update_sets_solution_on_solved() {
        let mut problem = sudoku_problem();
        problem.status = ProblemStatus::InProgress;

        let data = SolutionData::Sudoku {
            grid: vec![vec![1; 9]; 9],
            statistics: SolveStatistics::default(),
            status: "optimal".to_string(),
        };
        let update = ResultUpdate {
            status: ProblemStatus::Solved,
            output: Some(serde_json::to_string(&data).unwrap()),
            solution_time: Some(0.42),
            error_message: None,
        };

        assert!(problem.apply_update(&update));
        assert_eq!(problem.status, ProblemStatus::Solved);
        assert_eq!(problem.solution, Some(data));
        assert_eq!(problem.solution_time, Some(0.42));
    }

    #[test]
    fn test_apply_update_is_idempotent() {
        let mut problem = sudoku_problem();
        problem.status = ProblemStatus::InProgress;
        let update = ResultUpdate {
            status: ProblemStatus::Failed,
            output: None,
            solution_time: None,
            error_message: Some("encoder rejected input".to_string()),
        };

        assert!(problem.apply_update(&update));
        let snapshot = problem.clone();
        assert!(problem.apply_update(&update));
        assert_eq!(problem, snapshot);
    }

    #[test]
    fn test_apply_update_rejects_backward_transition() {
        let mut problem = sudoku_problem();
        problem.status = ProblemStatus::Solved;
        let update = ResultUpdate::status_only(ProblemStatus::Failed);
        assert!(!problem.apply_update(&update));
        assert_eq!(problem.status, ProblemStatus::Solved);
    }

    #[test]
    fn test_unsolvable_leaves_solution_null() {
        let mut problem = sudoku_problem();
        problem.status = ProblemStatus::InProgress;
        let update = ResultUpdate {
            status: ProblemStatus::Unsolvable,
            output: None,
            solution_time: Some(0.1),
            error_message: Some("infeasible".to_string()),
        };
        assert!(problem.apply_update(&update));
        assert!(problem.solution.is_none());
        assert_eq!(problem.error_message.as_deref(), Some("infeasible"));
    }

    #[test]
    fn test_result_message_accepts_both_id_fields() {
        let legacy: ResultMessage =
            serde_json::from_str(r#"{"puzzle_id":"a","status":"SOLVED"}"#).unwrap();
        let migrated: ResultMessage =
            serde_json::from_str(r#"{"problem_id":"a","status":"SOLVED"}"#).unwrap();
        assert_eq!(legacy, migrated);

        // wire format keeps the historical field name
        let encoded = serde_json::to_string(&legacy).unwrap();
        assert!(encoded.contains("puzzle_id"));
    }

    #[test]
    fn test_display_text_renders_boxes() {
        let mut problem = sudoku_problem();
        if let ProblemData::Sudoku { grid } = &mut problem.problem_data {
            grid[0][0] = 5;
            grid[0][1] = 3;
        }
        let text = problem.display_text();
        assert!(text.starts_with("Problem ID: p-1, Type: ip"));
        assert!(text.contains("5 3 _ | "));
        assert!(text.contains("------|-------|------"));
    }
}
