use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::models::actor::ActorRole;
use crate::state::AppState;

pub async fn run_availability_sweeper(state: Arc<AppState>, stale_after: TimeDelta, every: Duration) {
    info!(stale_after_secs = stale_after.num_seconds(), "availability sweeper started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        sweep_once(&state, stale_after).await;
    }
}

pub async fn sweep_once(state: &AppState, stale_after: TimeDelta) {
    for pool in ActorRole::ALL {
        if let Err(err) = state.geo.prune_stale(pool, stale_after).await {
            warn!(%pool, error = %err, "availability sweep failed");
        }
        state.refresh_pool_gauge(pool).await;
    }
}
