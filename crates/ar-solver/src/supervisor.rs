//! Solver service process model.
//!
//! The supervisor spawns N copies of its own executable with
//! `AR_SOLVER_WORKER_ID` set; each child is a fresh address space that opens
//! its own broker and KV connections (nothing is inherited). On
//! `SIGINT`/`SIGTERM` the supervisor forwards `SIGTERM` to the fleet, waits
//! out a grace period, and forcibly kills stragglers. A crashed worker is
//! logged and not restarted; the rest of the fleet keeps running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{error, info, warn};

use ar_config::AppConfig;
use ar_queue::{AmqpQueue, AmqpSettings};
use ar_store::{redis_store::RedisSettings, RedisStore};

use crate::registry::SolverRegistry;
use crate::worker::{self, WorkerContext, WorkerSettings};
use crate::SolverError;

/// Environment variable marking a process as a worker child.
pub const WORKER_ENV: &str = "AR_SOLVER_WORKER_ID";

fn amqp_settings(config: &AppConfig) -> AmqpSettings {
    AmqpSettings {
        uri: config.amqp.uri(),
        work_queue: config.amqp.work_queue.clone(),
        result_queue: config.amqp.result_queue.clone(),
        pool_size: config.amqp.pool_size,
    }
}

/// Spawn and babysit the worker fleet.
pub async fn run_supervisor(config: &AppConfig) -> Result<(), SolverError> {
    let exe = std::env::current_exe()?;
    let mut children: Vec<(usize, Child)> = Vec::new();

    for worker_id in 0..config.solver.num_workers.max(1) {
        let child = Command::new(&exe)
            .env(WORKER_ENV, worker_id.to_string())
            .spawn()?;
        info!(worker_id, pid = child.id(), "started worker process");
        children.push((worker_id, child));
    }

    let mut reap_interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("termination signal received, stopping workers");
                break;
            }
            _ = reap_interval.tick() => {
                reap_exited(&mut children);
                if children.is_empty() {
                    warn!("all workers have stopped, supervisor exiting");
                    return Ok(());
                }
            }
        }
    }

    terminate_fleet(children, Duration::from_secs(config.solver.shutdown_grace_secs)).await;
    info!("solver service shutdown complete");
    Ok(())
}

/// Remove children that already exited. Crashes are logged, not restarted.
fn reap_exited(children: &mut Vec<(usize, Child)>) {
    children.retain_mut(|(worker_id, child)| match child.try_wait() {
        Ok(Some(status)) => {
            if status.success() {
                info!(worker_id = *worker_id, "worker exited cleanly");
            } else {
                error!(worker_id = *worker_id, %status, "worker crashed; not restarting");
            }
            false
        }
        Ok(None) => true,
        Err(e) => {
            error!(worker_id = *worker_id, error = %e, "failed to poll worker");
            false
        }
    });
}

/// Forward SIGTERM to every worker, then join with a shared grace deadline.
async fn terminate_fleet(children: Vec<(usize, Child)>, grace: Duration) {
    for (_, child) in &children {
        signal_terminate(child);
    }

    let deadline = Instant::now() + grace;
    for (worker_id, mut child) in children {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, child.wait()).await {
            Ok(Ok(status)) => {
                if status.success() {
                    info!(worker_id, "worker stopped");
                } else {
                    error!(worker_id, %status, "worker exited abnormally during shutdown");
                }
            }
            Ok(Err(e)) => error!(worker_id, error = %e, "failed to join worker"),
            Err(_) => {
                warn!(worker_id, "grace period expired, killing worker");
                let _ = child.kill().await;
            }
        }
    }
}

#[cfg(unix)]
fn signal_terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // forward SIGTERM so the worker can requeue its in-flight message
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn signal_terminate(_child: &Child) {}

/// Entry point for one worker child process.
///
/// All connections are constructed here, inside the child: workers never
/// share broker or KV handles with the supervisor.
pub async fn run_worker_process(worker_id: usize, config: &AppConfig) -> Result<(), SolverError> {
    info!(worker_id, "worker process starting");
    let retry = Duration::from_secs(config.solver.connect_retry_secs.max(1));

    let store = connect_store_with_retry(config, retry).await;
    let queue = connect_queue_with_retry(config, retry).await;
    let registry = Arc::new(SolverRegistry::builtin(Duration::from_secs(
        config.solver.time_limit_secs,
    )));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let ctx = WorkerContext {
        worker_id,
        registry,
        store,
        queue,
    };
    let settings = WorkerSettings {
        amqp_uri: config.amqp.uri(),
        work_queue: config.amqp.work_queue.clone(),
        connect_retry: retry,
    };

    worker::run(ctx, settings, shutdown_rx).await;
    Ok(())
}

async fn connect_store_with_retry(
    config: &AppConfig,
    retry: Duration,
) -> Arc<dyn ar_store::ProblemStore> {
    let settings = RedisSettings {
        url: config.redis.url(),
        results_channel: config.redis.results_channel.clone(),
    };
    loop {
        match RedisStore::connect(settings.clone()).await {
            Ok(store) => return Arc::new(store),
            Err(e) => {
                warn!(error = %e, "KV store unavailable, retrying");
                tokio::time::sleep(retry).await;
            }
        }
    }
}

async fn connect_queue_with_retry(
    config: &AppConfig,
    retry: Duration,
) -> Arc<dyn ar_queue::JobQueue> {
    let settings = amqp_settings(config);
    loop {
        match AmqpQueue::connect(settings.clone()).await {
            Ok(queue) => return Arc::new(queue),
            Err(e) => {
                warn!(error = %e, "broker unavailable, retrying");
                tokio::time::sleep(retry).await;
            }
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = term.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
