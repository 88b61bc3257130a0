//! Worker: consumes one job at a time from the work queue and pipes it
//! through registry -> model -> adapter -> model, persisting and publishing
//! the result before acknowledging.
//!
//! Failure policy: broker and KV I/O errors are retryable (negative-ack with
//! requeue); decode, encoder, and decoder failures are deterministic and
//! produce a terminal `FAILED`/`UNSUPPORTED` result instead of a retry.
//! Malformed messages are poison: logged, acked, dropped.

use std::sync::Arc;
use std::time::Duration;

use lapin::options::{BasicAckOptions, BasicNackOptions};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use ar_common::{codec, Problem, ProblemStatus, ResultUpdate, Solution};
use ar_queue::{AmqpConsumer, JobQueue};
use ar_store::ProblemStore;

use crate::registry::SolverRegistry;

/// What to do with the delivery after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge: the message is done (including poison drops).
    Ack,
    /// Negative-ack with requeue: a retryable I/O failure occurred.
    Requeue,
}

/// Consumer settings for one worker process.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub amqp_uri: String,
    pub work_queue: String,
    pub connect_retry: Duration,
}

/// Shared handles a worker needs to process messages.
pub struct WorkerContext {
    pub worker_id: usize,
    pub registry: Arc<SolverRegistry>,
    pub store: Arc<dyn ProblemStore>,
    pub queue: Arc<dyn JobQueue>,
}

impl WorkerContext {
    /// Process one message body through the full pipeline.
    pub async fn handle_message(&self, body: &[u8]) -> Disposition {
        // 1. decode; malformed messages are poison
        let problem = match codec::decode_problem(body) {
            Ok(problem) => problem,
            Err(e) => {
                warn!(
                    worker_id = self.worker_id,
                    error = %e,
                    "dropping malformed work message"
                );
                return Disposition::Ack;
            }
        };
        let problem_id = problem.problem_id.clone();
        info!(
            worker_id = self.worker_id,
            problem_id = %problem_id,
            problem_type = %problem.problem_type,
            problem_name = %problem.problem_name,
            "processing problem"
        );

        // 2. claim: the worker is the only writer of IN_PROGRESS
        match self
            .store
            .apply_result(&problem_id, &ResultUpdate::status_only(ProblemStatus::InProgress))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                // missing record or already terminal (duplicate delivery)
                warn!(
                    worker_id = self.worker_id,
                    problem_id = %problem_id,
                    "problem not claimable, dropping delivery"
                );
                return Disposition::Ack;
            }
            Err(e) => {
                error!(worker_id = self.worker_id, problem_id = %problem_id, error = %e, "claim failed");
                return Disposition::Requeue;
            }
        }

        let solution = self.solve(&problem).await;
        self.finish(&problem_id, solution).await
    }

    async fn solve(&self, problem: &Problem) -> Solution {
        // 3. registry lookup; a miss means the pair is unsupported
        let Some(entry) = self
            .registry
            .lookup(problem.problem_type, problem.problem_name)
        else {
            return Solution::unsupported(
                &problem.problem_id,
                format!(
                    "no model registered for ({}, {})",
                    problem.problem_type, problem.problem_name
                ),
            );
        };

        // 4. encode into the back-end IR
        let ir = match entry.model.encode(problem) {
            Ok(ir) => ir,
            Err(e) => return Solution::failed(&problem.problem_id, e.to_string()),
        };

        // 5. solve off the async runtime; adapters enforce the time limit
        let adapter = entry.adapter.clone();
        let outcome = match tokio::task::spawn_blocking(move || adapter.solve(&ir)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Solution::failed(
                    &problem.problem_id,
                    format!("solver task failed: {}", e),
                )
            }
        };
        debug!(
            problem_id = %problem.problem_id,
            status = %outcome.status,
            wall_time_ms = outcome.statistics.wall_time_ms,
            "solver finished"
        );

        // 6. decode the raw result into the domain answer
        match entry.model.decode(problem, outcome) {
            Ok(solution) => solution,
            Err(e) => Solution::failed(&problem.problem_id, e.to_string()),
        }
    }

    /// Persist the solution, publish the result message, and decide the ack.
    async fn finish(&self, problem_id: &str, solution: Solution) -> Disposition {
        match self.store.apply_result(problem_id, &solution.to_update()).await {
            Ok(applied) => {
                if !applied {
                    warn!(problem_id = %problem_id, "result not applied (terminal record)");
                }
            }
            Err(e) => {
                error!(problem_id = %problem_id, error = %e, "failed to persist solution");
                return Disposition::Requeue;
            }
        }

        let message = solution.to_result_message();
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                // deterministic, so retrying cannot help
                error!(problem_id = %problem_id, error = %e, "failed to serialize result message");
                return Disposition::Ack;
            }
        };
        match self.queue.publish_result(payload).await {
            Ok(()) => {
                info!(
                    worker_id = self.worker_id,
                    problem_id = %problem_id,
                    status = %solution.status,
                    "result published"
                );
                Disposition::Ack
            }
            Err(e) => {
                error!(problem_id = %problem_id, error = %e, "failed to publish result");
                Disposition::Requeue
            }
        }
    }
}

/// Consume the work queue until the shutdown signal fires. In-flight
/// messages seen after the signal are requeued without solving.
pub async fn run(
    ctx: WorkerContext,
    settings: WorkerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let tag = format!("ar-worker-{}", ctx.worker_id);
    let mut consumer = tokio::select! {
        consumer = AmqpConsumer::connect_with_retry(
            &settings.amqp_uri,
            &settings.work_queue,
            &tag,
            settings.connect_retry,
        ) => consumer,
        _ = wait_for_shutdown(&mut shutdown) => {
            info!(worker_id = ctx.worker_id, "shutdown before broker connect");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => {
                info!(worker_id = ctx.worker_id, "shutdown signal received");
                break;
            }
            delivery = consumer.next() => {
                let delivery = match delivery {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        error!(worker_id = ctx.worker_id, error = %e, "consume error");
                        tokio::time::sleep(settings.connect_retry).await;
                        continue;
                    }
                    None => {
                        warn!(worker_id = ctx.worker_id, "consumer stream ended");
                        break;
                    }
                };

                if *shutdown.borrow() {
                    // requeue without solving; another worker picks it up
                    let _ = delivery
                        .acker
                        .nack(BasicNackOptions { requeue: true, ..Default::default() })
                        .await;
                    break;
                }

                let disposition = ctx.handle_message(&delivery.data).await;
                let ack_result = match disposition {
                    Disposition::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
                    Disposition::Requeue => {
                        delivery
                            .acker
                            .nack(BasicNackOptions { requeue: true, ..Default::default() })
                            .await
                    }
                };
                if let Err(e) = ack_result {
                    error!(worker_id = ctx.worker_id, error = %e, "ack failed");
                }
            }
        }
    }

    consumer.shutdown().await;
    info!(worker_id = ctx.worker_id, "worker stopped");
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
