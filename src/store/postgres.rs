use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::actor::ActorRole;
use crate::models::location::Location;
use crate::models::proposal::{MatchProposal, MatchStatus, NewMatchProposal};
use crate::store::{MatchStore, MatchTx, StoreError};

const COLUMNS: &str = "id, driver_id, passenger_id, driver_lat, driver_lng, passenger_lat, \
     passenger_lng, target_lat, target_lng, status, driver_confirmed, passenger_confirmed, \
     created_at, updated_at";

pub async fn init_pool(url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await
        .map_err(map_sqlx)?;

    info!("connected to postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|err| StoreError::Unavailable(format!("migration failed: {err}")))?;
    info!("database migrations applied");

    Ok(pool)
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("open match already exists for pair: {db}"))
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn status_names(statuses: &[MatchStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: Uuid,
    driver_id: String,
    passenger_id: String,
    driver_lat: f64,
    driver_lng: f64,
    passenger_lat: f64,
    passenger_lng: f64,
    target_lat: Option<f64>,
    target_lng: Option<f64>,
    status: String,
    driver_confirmed: bool,
    passenger_confirmed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MatchRow> for MatchProposal {
    type Error = StoreError;

    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<MatchStatus>()
            .map_err(|err| StoreError::Corrupt(format!("match {}: {err}", row.id)))?;

        let target_location = match (row.target_lat, row.target_lng) {
            (Some(lat), Some(lng)) => Some(Location::new(lat, lng)),
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "match {}: target has only one coordinate",
                    row.id
                )));
            }
        };

        Ok(MatchProposal {
            id: row.id,
            driver_id: row.driver_id,
            passenger_id: row.passenger_id,
            driver_location: Location::new(row.driver_lat, row.driver_lng),
            passenger_location: Location::new(row.passenger_lat, row.passenger_lng),
            target_location,
            status,
            driver_confirmed: row.driver_confirmed,
            passenger_confirmed: row.passenger_confirmed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_proposals(rows: Vec<MatchRow>) -> Result<Vec<MatchProposal>, StoreError> {
    rows.into_iter().map(MatchProposal::try_from).collect()
}

#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgMatchStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn begin(&self) -> Result<Box<dyn MatchTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(map_sqlx)?;
        Ok(Box::new(PgTx {
            tx,
            clock: self.clock.clone(),
        }))
    }

    async fn find_pending_between(
        &self,
        driver_id: &str,
        passenger_id: &str,
    ) -> Result<Option<MatchProposal>, StoreError> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {COLUMNS} FROM matches
             WHERE driver_id = $1 AND passenger_id = $2 AND status = ANY($3)
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(driver_id)
        .bind(passenger_id)
        .bind(status_names(&MatchStatus::OPEN))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(MatchProposal::try_from).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<MatchProposal, StoreError> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {COLUMNS} FROM matches WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.ok_or(StoreError::NotFound(id))?.try_into()
    }

    async fn batch_update_status(
        &self,
        ids: &[Uuid],
        new_status: MatchStatus,
        allowed_from: &[MatchStatus],
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE matches SET status = $1, updated_at = $2
             WHERE id = ANY($3) AND status = ANY($4)",
        )
        .bind(new_status.as_str())
        .bind(self.clock.now())
        .bind(ids.to_vec())
        .bind(status_names(allowed_from))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn list_by_actor(
        &self,
        actor_id: &str,
        role: ActorRole,
    ) -> Result<Vec<MatchProposal>, StoreError> {
        let column = match role {
            ActorRole::Driver => "driver_id",
            ActorRole::Passenger => "passenger_id",
        };

        let rows = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {COLUMNS} FROM matches WHERE {column} = $1 ORDER BY created_at DESC"
        ))
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        into_proposals(rows)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl MatchTx for PgTx {
    async fn insert(&mut self, proposal: NewMatchProposal) -> Result<MatchProposal, StoreError> {
        let proposal = proposal.into_proposal(Uuid::new_v4(), self.clock.now());
        let target = proposal.target_location;

        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "INSERT INTO matches ({COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING {COLUMNS}"
        ))
        .bind(proposal.id)
        .bind(&proposal.driver_id)
        .bind(&proposal.passenger_id)
        .bind(proposal.driver_location.lat)
        .bind(proposal.driver_location.lng)
        .bind(proposal.passenger_location.lat)
        .bind(proposal.passenger_location.lng)
        .bind(target.map(|t| t.lat))
        .bind(target.map(|t| t.lng))
        .bind(proposal.status.as_str())
        .bind(proposal.driver_confirmed)
        .bind(proposal.passenger_confirmed)
        .bind(proposal.created_at)
        .bind(proposal.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        row.try_into()
    }

    async fn get_by_id_for_update(&mut self, id: Uuid) -> Result<MatchProposal, StoreError> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {COLUMNS} FROM matches WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        row.ok_or(StoreError::NotFound(id))?.try_into()
    }

    async fn update_status_and_flags(
        &mut self,
        id: Uuid,
        status: MatchStatus,
        driver_confirmed: bool,
        passenger_confirmed: bool,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE matches
             SET status = $2, driver_confirmed = $3, passenger_confirmed = $4, updated_at = $5
             WHERE id = $1 AND status = ANY($6)",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(driver_confirmed)
        .bind(passenger_confirmed)
        .bind(self.clock.now())
        .bind(status_names(&MatchStatus::OPEN))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::MatchRow;
    use crate::models::location::Location;
    use crate::models::proposal::{MatchProposal, MatchStatus};
    use crate::store::StoreError;

    fn row() -> MatchRow {
        let now = Utc::now();
        MatchRow {
            id: Uuid::new_v4(),
            driver_id: "d1".to_string(),
            passenger_id: "p1".to_string(),
            driver_lat: 52.52,
            driver_lng: 13.405,
            passenger_lat: 52.523,
            passenger_lng: 13.41,
            target_lat: Some(52.55),
            target_lng: Some(13.45),
            status: "DRIVER_CONFIRMED".to_string(),
            driver_confirmed: true,
            passenger_confirmed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_maps_onto_proposal() {
        let proposal = MatchProposal::try_from(row()).unwrap();
        assert_eq!(proposal.status, MatchStatus::DriverConfirmed);
        assert_eq!(proposal.target_location, Some(Location::new(52.55, 13.45)));
        assert_eq!(proposal.driver_location, Location::new(52.52, 13.405));
        assert!(proposal.driver_confirmed && !proposal.passenger_confirmed);
    }

    #[test]
    fn missing_target_maps_to_none() {
        let mut row = row();
        row.target_lat = None;
        row.target_lng = None;
        let proposal = MatchProposal::try_from(row).unwrap();
        assert_eq!(proposal.target_location, None);
    }

    #[test]
    fn half_set_target_is_corrupt() {
        let mut row = row();
        row.target_lng = None;
        assert!(matches!(
            MatchProposal::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let mut row = row();
        row.status = "CANCELLED".to_string();
        assert!(matches!(
            MatchProposal::try_from(row),
            Err(StoreError::Corrupt(msg)) if msg.contains("CANCELLED")
        ));
    }
}
