//! In-memory queue for tests and embedded development.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{JobQueue, Result};

/// Captures published payloads instead of talking to a broker.
#[derive(Default)]
pub struct MemoryQueue {
    work: Mutex<Vec<Vec<u8>>>,
    results: Mutex<Vec<Vec<u8>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work_messages(&self) -> Vec<Vec<u8>> {
        self.work.lock().clone()
    }

    pub fn result_messages(&self) -> Vec<Vec<u8>> {
        self.results.lock().clone()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn publish_work(&self, payload: Vec<u8>) -> Result<()> {
        self.work.lock().push(payload);
        Ok(())
    }

    async fn publish_result(&self, payload: Vec<u8>) -> Result<()> {
        self.results.lock().push(payload);
        Ok(())
    }
}
