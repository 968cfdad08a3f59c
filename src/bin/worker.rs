use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::info;

use docshare::{config::AppConfig, db, default_handlers, state::AppState, telemetry, Worker};

/// Standalone notification worker for deployments that set `EMBEDDED_WORKER=false`.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing("info");

    let config = AppConfig::from_env()?;
    let poll_interval = config.worker_poll_interval();
    info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        poll_interval_ms = poll_interval.as_millis() as u64,
        mail_relay = config.mail_relay_url.is_some(),
        "starting notification worker"
    );

    // A single connection is enough: jobs are processed one at a time.
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let state = AppState::from_config(pool, config)?;
    let worker = Worker::new(Arc::new(state), default_handlers(), poll_interval);

    tokio::select! {
        _ = worker.run() => {}
        result = signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            info!("worker shutting down");
        }
    }

    Ok(())
}
