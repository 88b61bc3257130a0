//! In-memory problem store for tests and embedded development.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use ar_common::{codec, Problem, ResultUpdate};

use crate::{ProblemStore, Result};

/// Stores encoded records in a map; events go to a broadcast channel so
/// tests can observe fan-out.
pub struct MemoryStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
    events: broadcast::Sender<Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            records: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Vec<u8>> {
        self.events.subscribe()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProblemStore for MemoryStore {
    async fn save(&self, problem: &Problem) -> Result<()> {
        let payload = codec::encode_problem(problem)?;
        self.records
            .lock()
            .insert(problem.problem_id.clone(), payload);
        Ok(())
    }

    async fn load(&self, problem_id: &str) -> Result<Option<Problem>> {
        let blob = self.records.lock().get(problem_id).cloned();
        match blob {
            Some(bytes) => Ok(Some(codec::decode_problem(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, problem_id: &str) -> Result<bool> {
        Ok(self.records.lock().contains_key(problem_id))
    }

    async fn apply_result(&self, problem_id: &str, update: &ResultUpdate) -> Result<bool> {
        let Some(mut problem) = self.load(problem_id).await? else {
            return Ok(false);
        };
        if !problem.apply_update(update) {
            return Ok(false);
        }
        self.save(&problem).await?;
        Ok(true)
    }

    async fn scan_ids(&self) -> Result<Vec<String>> {
        Ok(self.records.lock().keys().cloned().collect())
    }

    async fn publish_event(&self, payload: &[u8]) -> Result<()> {
        // no receivers is fine; fan-out is best-effort
        let _ = self.events.send(payload.to_vec());
        Ok(())
    }
}
