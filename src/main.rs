use std::sync::Arc;

use chrono::TimeDelta;
use ride_match_core::api;
use ride_match_core::clock::{Clock, SystemClock};
use ride_match_core::config::{Config, LogFormat};
use ride_match_core::engine::{acceptance, sweeper};
use ride_match_core::error::AppError;
use ride_match_core::state::{AppState, Backends, StateOptions};
use ride_match_core::store::postgres::{init_pool, PgMatchStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut backends = Backends::in_memory(clock.clone());
    match &config.database_url {
        Some(url) => {
            let pool = init_pool(url).await?;
            backends.store = Arc::new(PgMatchStore::new(pool, clock.clone()));
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set; matches are kept in memory and will not survive restarts"
            );
        }
    }

    let (app_state, accepted_rx) = AppState::new(backends, StateOptions::from(&config));
    let shared_state = Arc::new(app_state);

    tokio::spawn(acceptance::run_acceptance_worker(
        shared_state.clone(),
        accepted_rx,
    ));

    if !config.availability_stale_after.is_zero() {
        let stale_after = TimeDelta::from_std(config.availability_stale_after)
            .map_err(|err| AppError::Internal(format!("invalid AVAILABILITY_STALE_SECS: {err}")))?;
        tokio::spawn(sweeper::run_availability_sweeper(
            shared_state.clone(),
            stale_after,
            config.availability_sweep_interval,
        ));
    }

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
