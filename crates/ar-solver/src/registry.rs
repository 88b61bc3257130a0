//! Read-only registry mapping `(problem_type, problem_name)` to a domain
//! model and solver adapter. A lookup miss is not an error here; the worker
//! reports `UNSUPPORTED` for unknown pairs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ar_common::{ProblemName, ProblemType};

use crate::adapters::{IpSolverAdapter, SatSolverAdapter, SolverAdapter};
use crate::models::{DomainModel, SudokuModel};

#[derive(Clone)]
pub struct RegistryEntry {
    pub model: Arc<dyn DomainModel>,
    pub adapter: Arc<dyn SolverAdapter>,
}

pub struct SolverRegistry {
    entries: HashMap<(ProblemType, ProblemName), RegistryEntry>,
}

impl SolverRegistry {
    /// Registry with the built-in model/adapter pairs, populated at startup.
    pub fn builtin(time_limit: Duration) -> Self {
        let sudoku: Arc<dyn DomainModel> = Arc::new(SudokuModel);
        let ip_adapter: Arc<dyn SolverAdapter> = Arc::new(IpSolverAdapter::new(time_limit));
        let sat_adapter: Arc<dyn SolverAdapter> = Arc::new(SatSolverAdapter::new(time_limit));

        let mut entries = HashMap::new();
        entries.insert(
            (ProblemType::Ip, ProblemName::Sudoku),
            RegistryEntry {
                model: sudoku.clone(),
                adapter: ip_adapter,
            },
        );
        entries.insert(
            (ProblemType::Sat, ProblemName::Sudoku),
            RegistryEntry {
                model: sudoku,
                adapter: sat_adapter,
            },
        );

        Self { entries }
    }

    pub fn lookup(
        &self,
        problem_type: ProblemType,
        problem_name: ProblemName,
    ) -> Option<RegistryEntry> {
        self.entries.get(&(problem_type, problem_name)).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_pairs() {
        let registry = SolverRegistry::builtin(Duration::from_secs(1));
        assert_eq!(registry.len(), 2);
        assert!(registry
            .lookup(ProblemType::Ip, ProblemName::Sudoku)
            .is_some());
        assert!(registry
            .lookup(ProblemType::Sat, ProblemName::Sudoku)
            .is_some());
    }

    #[test]
    fn test_lookup_miss_returns_none() {
        let registry = SolverRegistry::builtin(Duration::from_secs(1));
        assert!(registry
            .lookup(ProblemType::Ip, ProblemName::Knapsack)
            .is_none());
        assert!(registry
            .lookup(ProblemType::Csp, ProblemName::Sudoku)
            .is_none());
    }
}
