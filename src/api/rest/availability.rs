use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geo::index::NearbyActor;
use crate::models::actor::ActorRole;
use crate::models::location::Location;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/drivers/:id/availability",
            put(add_available_driver).delete(remove_available_driver),
        )
        .route(
            "/passengers/:id/availability",
            put(add_available_passenger).delete(remove_available_passenger),
        )
        .route("/drivers/:id/location", get(driver_location))
        .route("/passengers/:id/location", get(passenger_location))
        .route("/drivers/nearby", get(find_nearby_drivers))
        .route("/passengers/nearby", get(find_nearby_passengers))
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
}

#[derive(Serialize)]
pub struct NearbyResponse {
    pub radius_km: f64,
    pub actors: Vec<NearbyActor>,
}

async fn add_available(
    state: &AppState,
    pool: ActorRole,
    id: &str,
    location: Location,
) -> Result<StatusCode, AppError> {
    state.geo.add_available(pool, id, location).await?;
    state.refresh_pool_gauge(pool).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_available(
    state: &AppState,
    pool: ActorRole,
    id: &str,
) -> Result<StatusCode, AppError> {
    state.geo.remove_available(pool, id).await?;
    state.refresh_pool_gauge(pool).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn find_nearby(
    state: &AppState,
    pool: ActorRole,
    query: NearbyQuery,
) -> Result<Json<NearbyResponse>, AppError> {
    let radius_km = query.radius_km.unwrap_or(state.default_search_radius_km);
    let center = Location::new(query.lat, query.lng);
    let actors = state.geo.find_nearby(pool, &center, radius_km).await?;
    Ok(Json(NearbyResponse { radius_km, actors }))
}

async fn add_available_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(location): Json<Location>,
) -> Result<StatusCode, AppError> {
    add_available(&state, ActorRole::Driver, &id, location).await
}

async fn remove_available_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    remove_available(&state, ActorRole::Driver, &id).await
}

async fn add_available_passenger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(location): Json<Location>,
) -> Result<StatusCode, AppError> {
    add_available(&state, ActorRole::Passenger, &id, location).await
}

async fn remove_available_passenger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    remove_available(&state, ActorRole::Passenger, &id).await
}

async fn driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Location>, AppError> {
    Ok(Json(
        state.geo.last_known_location(ActorRole::Driver, &id).await?,
    ))
}

async fn passenger_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Location>, AppError> {
    Ok(Json(
        state
            .geo
            .last_known_location(ActorRole::Passenger, &id)
            .await?,
    ))
}

async fn find_nearby_drivers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyResponse>, AppError> {
    find_nearby(&state, ActorRole::Driver, query).await
}

async fn find_nearby_passengers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyResponse>, AppError> {
    find_nearby(&state, ActorRole::Passenger, query).await
}
