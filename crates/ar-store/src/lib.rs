use async_trait::async_trait;
use thiserror::Error;

use ar_common::{CodecError, Problem, ResultUpdate};

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("kv error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Persistence seam for problem records.
///
/// Problem records live as msgpack blobs under `key = problem_id` (hex UUID,
/// no prefix). Field-level result updates are merge-writes guarded by the
/// status lattice, so re-applying a terminal result is idempotent.
#[async_trait]
pub trait ProblemStore: Send + Sync {
    /// Persist a full problem record (create or overwrite).
    async fn save(&self, problem: &Problem) -> Result<()>;

    /// Load a problem record; `None` when absent.
    async fn load(&self, problem_id: &str) -> Result<Option<Problem>>;

    /// Whether a record exists under this id.
    async fn exists(&self, problem_id: &str) -> Result<bool>;

    /// Apply a result update onto a record. Returns `false` when the record
    /// is missing or the status transition is not allowed (the record is
    /// left untouched in both cases).
    async fn apply_result(&self, problem_id: &str, update: &ResultUpdate) -> Result<bool>;

    /// All problem ids currently stored; used by the reconciliation sweep.
    async fn scan_ids(&self) -> Result<Vec<String>>;

    /// Publish a result event on the shared fan-out channel.
    async fn publish_event(&self, payload: &[u8]) -> Result<()>;
}
