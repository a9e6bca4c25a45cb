use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::actor::ActorRole;
use crate::models::ride::ActiveRide;
use crate::registry::UnbindOutcome;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides/active", put(set_active_ride).delete(remove_active_ride))
        .route("/rides/active/drivers/:id", get(active_ride_by_driver))
        .route("/rides/active/passengers/:id", get(active_ride_by_passenger))
}

#[derive(Deserialize)]
pub struct SetActiveRideRequest {
    pub driver_id: String,
    pub passenger_id: String,
    pub ride_id: String,
    pub ttl_secs: Option<u64>,
}

#[derive(Deserialize)]
pub struct RemoveActiveRideRequest {
    pub driver_id: String,
    pub passenger_id: String,
}

async fn set_active_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetActiveRideRequest>,
) -> Result<StatusCode, AppError> {
    if payload.ttl_secs == Some(0) {
        return Err(AppError::BadRequest("ttl_secs must be > 0".to_string()));
    }

    state
        .rides
        .bind(
            &payload.driver_id,
            &payload.passenger_id,
            &payload.ride_id,
            payload.ttl_secs.map(Duration::from_secs),
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn remove_active_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RemoveActiveRideRequest>,
) -> Json<UnbindOutcome> {
    Json(
        state
            .rides
            .unbind(&payload.driver_id, &payload.passenger_id)
            .await,
    )
}

async fn active_ride(
    state: &AppState,
    role: ActorRole,
    actor_id: String,
) -> Result<Json<ActiveRide>, AppError> {
    let ride_id = state.rides.lookup(role, &actor_id).await?;
    Ok(Json(ActiveRide { actor_id, ride_id }))
}

async fn active_ride_by_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ActiveRide>, AppError> {
    active_ride(&state, ActorRole::Driver, id).await
}

async fn active_ride_by_passenger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ActiveRide>, AppError> {
    active_ride(&state, ActorRole::Passenger, id).await
}
