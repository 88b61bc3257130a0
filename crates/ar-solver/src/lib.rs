use thiserror::Error;

pub mod adapters;
pub mod ir;
pub mod models;
pub mod registry;
pub mod supervisor;
pub mod worker;

pub use adapters::{IpSolverAdapter, SatSolverAdapter, SolverAdapter};
pub use ir::{Assignment, Ir, SolveStatus, SolverOutcome};
pub use models::{DomainModel, ModelError};
pub use registry::{RegistryEntry, SolverRegistry};
pub use worker::{Disposition, WorkerContext};

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("store error: {0}")]
    Store(#[from] ar_store::StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] ar_queue::QueueError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
