//! Service entrypoint: store connection, controller loop, HTTP API.

use anyhow::Context;
use log::info;
use proxy_pool::api::{self, AppState};
use proxy_pool::{
    default_collectors, HttpProbe, PoolConfig, PoolController, RedisStore, ScoredStore, Validator,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the background-command queue feeding the controller.
const COMMAND_QUEUE_DEPTH: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = PoolConfig::from_env()?;

    // An unreachable store at startup is fatal; at steady state the
    // controller retries through the connection manager instead.
    let store: Arc<dyn ScoredStore> = Arc::new(
        RedisStore::connect(&config.redis_url, &config.proxy_key)
            .await
            .context("could not connect to the backing store")?,
    );

    let probe = Arc::new(HttpProbe::new(
        config.probe_url.clone(),
        config.probe_fallback_url.clone(),
        config.proxy_timeout,
    ));
    let validator = Validator::new(probe, config.validate_concurrency);
    let controller = PoolController::new(
        Arc::clone(&store),
        validator,
        default_collectors(),
        config.clone(),
    );

    let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let token = CancellationToken::new();
    let controller_task = tokio::spawn(controller.run(command_rx, token.clone()));

    let state = AppState {
        store,
        config: Arc::new(config.clone()),
        commands,
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("could not bind {}", config.bind_addr))?;
    info!("serving proxy pool API on {}", config.bind_addr);

    let shutdown = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    token.cancel();
    let _ = controller_task.await;
    Ok(())
}
