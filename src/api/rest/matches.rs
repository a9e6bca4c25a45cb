use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::acceptance::publish_accepted;
use crate::error::AppError;
use crate::models::actor::ActorRole;
use crate::models::location::Location;
use crate::models::proposal::{MatchProposal, MatchStatus, NewMatchProposal};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/matches", post(create_match))
        .route("/matches/:id", get(get_match))
        .route("/matches/:id/confirm", post(confirm_match))
        .route("/actors/:id/matches", get(list_actor_matches))
}

#[derive(Deserialize)]
pub struct CreateMatchRequest {
    pub driver_id: String,
    pub passenger_id: String,
    pub driver_location: Location,
    pub passenger_location: Location,
    pub target_location: Option<Location>,
}

#[derive(Deserialize)]
pub struct ConfirmMatchRequest {
    pub user_id: String,
    pub is_driver: bool,
}

#[derive(Deserialize)]
pub struct ActorMatchesQuery {
    pub role: ActorRole,
}

async fn create_match(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateMatchRequest>,
) -> Result<Json<MatchProposal>, AppError> {
    let proposal = state
        .coordinator
        .create_match(NewMatchProposal {
            driver_id: payload.driver_id,
            passenger_id: payload.passenger_id,
            driver_location: payload.driver_location,
            passenger_location: payload.passenger_location,
            target_location: payload.target_location,
        })
        .await?;

    Ok(Json(proposal))
}

async fn get_match(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchProposal>, AppError> {
    Ok(Json(state.coordinator.get_match(id).await?))
}

async fn confirm_match(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmMatchRequest>,
) -> Result<Json<MatchProposal>, AppError> {
    let proposal = state
        .coordinator
        .confirm_match_by_user(id, &payload.user_id, payload.is_driver)
        .await?;

    if proposal.status == MatchStatus::Accepted {
        // Detached so a dropped request cannot lose the event after commit.
        let state = state.clone();
        let accepted = proposal.clone();
        tokio::spawn(async move { publish_accepted(&state, &accepted).await });
    }

    Ok(Json(proposal))
}

async fn list_actor_matches(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ActorMatchesQuery>,
) -> Result<Json<Vec<MatchProposal>>, AppError> {
    Ok(Json(state.coordinator.list_by_actor(&id, query.role).await?))
}
