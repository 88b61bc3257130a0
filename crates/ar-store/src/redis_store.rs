//! Redis-backed problem store.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use ar_common::{codec, Problem, ResultUpdate};

use crate::{ProblemStore, Result};

/// Connection settings for the KV store.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// `redis://host:port/db`
    pub url: String,
    /// Shared channel carrying result events across API instances.
    pub results_channel: String,
}

/// Problem store over a multiplexed redis connection.
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    results_channel: String,
}

impl RedisStore {
    pub async fn connect(settings: RedisSettings) -> Result<Self> {
        let client = redis::Client::open(settings.url.as_str())?;
        let conn = ConnectionManager::new(client.clone()).await?;

        let mut store = Self {
            client,
            conn,
            results_channel: settings.results_channel,
        };
        store.ping().await?;
        info!("redis store connected");
        Ok(store)
    }

    async fn ping(&mut self) -> Result<()> {
        let pong: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        debug!(response = %pong, "redis ping");
        Ok(())
    }

    /// Subscribe to the shared result-event channel. Each item is the raw
    /// payload published by a result listener on some instance.
    pub async fn subscribe_events(&self) -> Result<impl Stream<Item = Vec<u8>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.results_channel).await?;
        info!(channel = %self.results_channel, "subscribed to result events");
        Ok(pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec()))
    }
}

#[async_trait]
impl ProblemStore for RedisStore {
    async fn save(&self, problem: &Problem) -> Result<()> {
        let payload = codec::encode_problem(problem)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(&problem.problem_id, payload).await?;
        debug!(problem_id = %problem.problem_id, status = %problem.status, "problem saved");
        Ok(())
    }

    async fn load(&self, problem_id: &str) -> Result<Option<Problem>> {
        let mut conn = self.conn.clone();
        let blob: Option<Vec<u8>> = conn.get(problem_id).await?;
        match blob {
            Some(bytes) => Ok(Some(codec::decode_problem(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, problem_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(problem_id).await?)
    }

    async fn apply_result(&self, problem_id: &str, update: &ResultUpdate) -> Result<bool> {
        let Some(mut problem) = self.load(problem_id).await? else {
            warn!(problem_id = %problem_id, "result update for unknown problem");
            return Ok(false);
        };
        if !problem.apply_update(update) {
            warn!(
                problem_id = %problem_id,
                current = %problem.status,
                requested = %update.status,
                "rejected status transition"
            );
            return Ok(false);
        }
        self.save(&problem).await?;
        Ok(true)
    }

    async fn scan_ids(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut ids = Vec::new();
        let mut iter: redis::AsyncIter<String> = conn.scan().await?;
        while let Some(key) = iter.next_item().await {
            ids.push(key);
        }
        Ok(ids)
    }

    async fn publish_event(&self, payload: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(&self.results_channel, payload).await?;
        Ok(())
    }
}
