//! Automated Reasoning API server.
//!
//! Constructs the KV store, broker publisher, result streamer, and lifecycle
//! coordinator, then serves the HTTP surface. Background tasks on the same
//! runtime: the result-queue listener, the reconciliation sweep, and (when
//! shared fan-out is enabled) the pub/sub bridge.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use ar_api::{AppState, ListenerSettings, ResultListener, ResultStreamer};
use ar_config::AppConfig;
use ar_queue::{AmqpQueue, AmqpSettings};
use ar_store::{redis_store::RedisSettings, ProblemStore, RedisStore};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let _log_guard = ar_common::logging::init_logging("ar-server");

    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);
    info!(environment = %config.environment, "starting automated reasoning API");

    // adapters are constructed once and injected; no global singletons
    let redis_store = Arc::new(
        RedisStore::connect(RedisSettings {
            url: config.redis.url(),
            results_channel: config.redis.results_channel.clone(),
        })
        .await
        .context("failed to connect to the KV store")?,
    );
    let store: Arc<dyn ProblemStore> = redis_store.clone();

    let queue = Arc::new(
        AmqpQueue::connect(AmqpSettings {
            uri: config.amqp.uri(),
            work_queue: config.amqp.work_queue.clone(),
            result_queue: config.amqp.result_queue.clone(),
            pool_size: config.amqp.pool_size,
        })
        .await
        .context("failed to connect to the message broker")?,
    );

    let streamer = ResultStreamer::new(config.stream.channel_capacity);
    let state = AppState::new(store.clone(), queue.clone(), streamer.clone(), config.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let retry = Duration::from_secs(config.solver.connect_retry_secs.max(1));

    // result-queue listener
    let listener = ResultListener {
        store: store.clone(),
        streamer: streamer.clone(),
        shared_fanout: config.redis.shared_fanout,
    };
    let listener_settings = ListenerSettings {
        amqp_uri: config.amqp.uri(),
        result_queue: config.amqp.result_queue.clone(),
        connect_retry: retry,
    };
    tokio::spawn(listener.run(listener_settings, shutdown_rx.clone()));

    // pub/sub bridge for multi-instance fan-out
    if config.redis.shared_fanout {
        info!("shared fan-out enabled, starting pub/sub bridge");
        tokio::spawn(ar_api::run_fanout_bridge(
            redis_store,
            streamer.clone(),
            retry,
            shutdown_rx.clone(),
        ));
    }

    // reconciliation sweep over orphaned records
    if config.sweep.enabled {
        tokio::spawn(ar_api::run_reconciliation_sweep(
            store,
            queue,
            config.sweep.clone(),
            shutdown_rx.clone(),
        ));
    }

    let app = ar_api::build_router(state);
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let tcp_listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "listening");

    axum::serve(tcp_listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server error")?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
