use async_trait::async_trait;

pub mod amqp;
pub mod error;
pub mod mock;
pub mod pool;

pub use amqp::{AmqpConsumer, AmqpQueue, AmqpSettings};
pub use error::QueueError;
pub use pool::ConnectionPool;

pub type Result<T> = std::result::Result<T, QueueError>;

/// Publisher seam between the coordinator/workers and the broker.
///
/// Implemented by [`AmqpQueue`] in production and by [`mock::MemoryQueue`]
/// in tests.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish a msgpack-encoded problem to the durable work queue.
    async fn publish_work(&self, payload: Vec<u8>) -> Result<()>;

    /// Publish a JSON result message to the durable result queue.
    async fn publish_result(&self, payload: Vec<u8>) -> Result<()>;
}
