use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("queue is stopped")]
    Stopped,
}
