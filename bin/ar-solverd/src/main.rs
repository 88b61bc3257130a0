//! Solver service.
//!
//! Without `AR_SOLVER_WORKER_ID` set, this process is the supervisor: it
//! spawns N copies of itself as worker children, forwards termination
//! signals, and reaps the fleet. With the variable set (by the supervisor),
//! it runs a single worker that consumes one job at a time.
//!
//! Workers are single-threaded: the runtime is current-thread, and solver
//! kernels run on the blocking pool so broker heartbeats stay alive during
//! long solves.

use anyhow::{Context, Result};
use tracing::info;

use ar_config::AppConfig;
use ar_solver::supervisor::{self, WORKER_ENV};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let worker_id = std::env::var(WORKER_ENV)
        .ok()
        .and_then(|value| value.parse::<usize>().ok());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(async move {
        let config = AppConfig::load().context("failed to load configuration")?;

        match worker_id {
            Some(worker_id) => {
                let _log_guard =
                    ar_common::logging::init_logging(&format!("ar-solver-worker-{}", worker_id));
                supervisor::run_worker_process(worker_id, &config)
                    .await
                    .context("worker failed")
            }
            None => {
                let _log_guard = ar_common::logging::init_logging("ar-solverd");
                info!(
                    workers = config.solver.num_workers,
                    environment = %config.environment,
                    "starting solver service"
                );
                supervisor::run_supervisor(&config)
                    .await
                    .context("supervisor failed")
            }
        }
    })
}
