//! Solver adapters: thin wrappers over third-party solver kernels
//! implementing the IR contract.
//!
//! Adapters never panic on bad input; every failure mode is reported as a
//! [`SolverOutcome`] with `status = error` and `is_solved = false`. Each
//! adapter enforces a wall-clock time limit (default 300 s).

use std::time::Duration;

use crate::ir::{Ir, SolverOutcome};

pub mod ip;
pub mod sat;

pub use ip::IpSolverAdapter;
pub use sat::SatSolverAdapter;

pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(300);

/// Invoke a back-end solver on an IR; report status, statistics, and the
/// variable assignment.
pub trait SolverAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, ir: &Ir) -> SolverOutcome;
}

/// Run a solve on its own thread with a wall-clock deadline. Returns `None`
/// on timeout; the kernel thread is left to finish in the background since
/// neither kernel supports cooperative interruption.
pub(crate) fn solve_with_deadline<T, F>(limit: Duration, task: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(task());
    });
    rx.recv_timeout(limit).ok()
}
