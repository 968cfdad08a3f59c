use std::{net::SocketAddr, sync::Arc};

use tokio::{net::TcpListener, signal};

use docshare::{
    config::AppConfig, db, default_handlers, routes::create_router, state::AppState, telemetry,
    Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing("info,tower_http=info");

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        ipfs_api = %config.ipfs_api_url,
        ledger_enabled = config.ledger_enabled(),
        mail_relay = config.mail_relay_url.is_some(),
        "loaded docshare configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let applied = db::run_migrations(&pool)?;
    if applied > 0 {
        tracing::info!(applied, "database migrations applied");
    }

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    let embedded_worker = config.embedded_worker;
    let poll_interval = config.worker_poll_interval();
    let state = AppState::from_config(pool, config)?;

    if embedded_worker {
        let worker = Worker::new(Arc::new(state.clone()), default_handlers(), poll_interval);
        tokio::spawn(async move { worker.run().await });
    } else {
        tracing::info!("embedded worker disabled; run the worker binary separately");
    }

    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "docshare listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("server received shutdown signal");
}
