//! Problem lifecycle coordination.
//!
//! The ingress path assigns an id, persists the record, and enqueues it:
//! the KV write always precedes the broker publish, so a crash in between
//! leaves at worst an orphaned `IN_QUEUE` record that the reconciliation
//! sweep republishes. The result listener applies each result to the KV
//! store before fanning it out, so any SSE event a client sees is visible
//! in a subsequent read.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use ar_common::{
    codec, Problem, ProblemData, ProblemName, ProblemStatus, ProblemType, ResultMessage,
    ResultUpdate,
};
use ar_config::SweepConfig;
use ar_queue::{AmqpConsumer, JobQueue};
use ar_store::{ProblemStore, RedisStore};

use crate::error::ApiError;
use crate::streamer::ResultStreamer;

pub struct LifecycleCoordinator {
    store: Arc<dyn ProblemStore>,
    queue: Arc<dyn JobQueue>,
}

impl LifecycleCoordinator {
    pub fn new(store: Arc<dyn ProblemStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Submission: assign a fresh id, persist with `CREATED`, flip to
    /// `IN_QUEUE`, persist again, then publish to the work queue.
    pub async fn submit(
        &self,
        problem_type: ProblemType,
        problem_name: ProblemName,
        problem_data: ProblemData,
    ) -> Result<String, ApiError> {
        let problem_id = self.fresh_id().await?;
        let mut problem = Problem::new(
            problem_id.clone(),
            problem_type,
            problem_name,
            problem_data,
        );

        self.store.save(&problem).await?;

        problem.status = ProblemStatus::InQueue;
        self.store.save(&problem).await?;

        let payload = codec::encode_problem(&problem)?;
        self.queue.publish_work(payload).await?;

        info!(
            problem_id = %problem_id,
            problem_type = %problem_type,
            problem_name = %problem_name,
            "problem submitted"
        );
        Ok(problem_id)
    }

    /// Fresh hex UUID; re-rolled on the (unlikely) KV collision.
    async fn fresh_id(&self) -> Result<String, ApiError> {
        loop {
            let candidate = uuid::Uuid::new_v4().simple().to_string();
            if !self.store.exists(&candidate).await? {
                return Ok(candidate);
            }
            debug!(candidate = %candidate, "problem id collision, re-rolling");
        }
    }
}

// ============================================================================
// Result listener
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerDisposition {
    Ack,
    Requeue,
}

/// Consumer settings for the result-queue listener.
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub amqp_uri: String,
    pub result_queue: String,
    pub connect_retry: Duration,
}

/// Background task: applies each result-queue message to the KV store, then
/// fans it out to subscribers (directly, or through the shared pub/sub
/// channel when multiple API instances are deployed).
pub struct ResultListener {
    pub store: Arc<dyn ProblemStore>,
    pub streamer: ResultStreamer,
    /// Publish to the shared KV channel instead of the local streamer; the
    /// fan-out bridge on each instance feeds its local subscribers.
    pub shared_fanout: bool,
}

impl ResultListener {
    /// Handle one result message body.
    pub async fn process(&self, body: &[u8]) -> ListenerDisposition {
        let message: ResultMessage = match serde_json::from_slice(body) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed result message");
                return ListenerDisposition::Ack;
            }
        };

        let update = ResultUpdate {
            status: message.status,
            output: message.output.clone(),
            solution_time: None,
            error_message: None,
        };
        // KV write precedes fan-out
        match self.store.apply_result(&message.problem_id, &update).await {
            Ok(applied) => {
                if !applied {
                    warn!(problem_id = %message.problem_id, "result update not applied");
                }
            }
            Err(e) => {
                error!(problem_id = %message.problem_id, error = %e, "failed to apply result");
                return ListenerDisposition::Requeue;
            }
        }

        if self.shared_fanout {
            if let Err(e) = self.store.publish_event(body).await {
                error!(problem_id = %message.problem_id, error = %e, "failed to publish result event");
                return ListenerDisposition::Requeue;
            }
        } else {
            let payload = match serde_json::to_value(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "failed to re-encode result message");
                    return ListenerDisposition::Ack;
                }
            };
            let delivered = self.streamer.publish(&message.problem_id, &payload);
            debug!(
                problem_id = %message.problem_id,
                delivered,
                "result fanned out"
            );
        }

        ListenerDisposition::Ack
    }

    /// Consume the result queue until shutdown.
    pub async fn run(self, settings: ListenerSettings, mut shutdown: watch::Receiver<bool>) {
        let mut consumer = tokio::select! {
            consumer = AmqpConsumer::connect_with_retry(
                &settings.amqp_uri,
                &settings.result_queue,
                "ar-result-listener",
                settings.connect_retry,
            ) => consumer,
            _ = wait_for_shutdown(&mut shutdown) => return,
        };

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("result listener shutting down");
                    break;
                }
                delivery = consumer.next() => {
                    let delivery = match delivery {
                        Some(Ok(delivery)) => delivery,
                        Some(Err(e)) => {
                            error!(error = %e, "result consume error");
                            tokio::time::sleep(settings.connect_retry).await;
                            continue;
                        }
                        None => {
                            warn!("result consumer stream ended");
                            break;
                        }
                    };

                    let ack_result = match self.process(&delivery.data).await {
                        ListenerDisposition::Ack => {
                            delivery.acker.ack(BasicAckOptions::default()).await
                        }
                        ListenerDisposition::Requeue => {
                            delivery
                                .acker
                                .nack(BasicNackOptions { requeue: true, ..Default::default() })
                                .await
                        }
                    };
                    if let Err(e) = ack_result {
                        error!(error = %e, "result ack failed");
                    }
                }
            }
        }

        consumer.shutdown().await;
    }
}

/// Bridge task for multi-instance deployments: feeds events from the shared
/// KV pub/sub channel into this instance's streamer.
pub async fn run_fanout_bridge(
    store: Arc<RedisStore>,
    streamer: ResultStreamer,
    retry: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let events = tokio::select! {
            result = store.subscribe_events() => match result {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "event subscription failed, retrying");
                    tokio::time::sleep(retry).await;
                    continue;
                }
            },
            _ = wait_for_shutdown(&mut shutdown) => return,
        };
        let mut events = Box::pin(events);

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => return,
                event = events.next() => {
                    let Some(body) = event else {
                        warn!("event stream ended, resubscribing");
                        break;
                    };
                    match serde_json::from_slice::<ResultMessage>(&body) {
                        Ok(message) => {
                            if let Ok(payload) = serde_json::to_value(&message) {
                                streamer.publish(&message.problem_id, &payload);
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping malformed result event"),
                    }
                }
            }
        }
    }
}

// ============================================================================
// Reconciliation sweep
// ============================================================================

/// One sweep: republish non-terminal records that appear stuck before the
/// broker (crash between KV write and publish). Returns how many records
/// were republished.
pub async fn sweep_once(
    store: &dyn ProblemStore,
    queue: &dyn JobQueue,
    stale_after: chrono::Duration,
) -> Result<usize, ApiError> {
    let mut republished = 0;
    for problem_id in store.scan_ids().await? {
        let problem = match store.load(&problem_id).await {
            Ok(Some(problem)) => problem,
            Ok(None) => continue,
            Err(e) => {
                warn!(problem_id = %problem_id, error = %e, "sweep skipping unreadable record");
                continue;
            }
        };

        // IN_PROGRESS records belong to a worker; terminal records are done
        if !matches!(
            problem.status,
            ProblemStatus::Created | ProblemStatus::InQueue
        ) {
            continue;
        }
        let age = chrono::Utc::now().signed_duration_since(problem.created_at);
        if age < stale_after {
            continue;
        }

        let mut problem = problem;
        if problem.status == ProblemStatus::Created {
            problem.status = ProblemStatus::InQueue;
            store.save(&problem).await?;
        }
        queue.publish_work(codec::encode_problem(&problem)?).await?;
        warn!(
            problem_id = %problem.problem_id,
            age_secs = age.num_seconds(),
            "republished orphaned problem"
        );
        republished += 1;
    }
    Ok(republished)
}

/// Periodic reconciliation sweep until shutdown.
pub async fn run_reconciliation_sweep(
    store: Arc<dyn ProblemStore>,
    queue: Arc<dyn JobQueue>,
    config: SweepConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let stale_after = chrono::Duration::seconds(config.stale_after_secs as i64);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_once(store.as_ref(), queue.as_ref(), stale_after).await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "reconciliation sweep republished records"),
                    Err(e) => warn!(error = %e, "reconciliation sweep failed"),
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("reconciliation sweep shutting down");
                break;
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
