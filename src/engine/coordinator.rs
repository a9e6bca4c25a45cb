use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::ActorRole;
use crate::models::proposal::{MatchProposal, MatchStatus, NewMatchProposal};
use crate::observability::metrics::Metrics;
use crate::store::{MatchStore, StoreError};

pub struct MatchCoordinator {
    store: Arc<dyn MatchStore>,
    metrics: Metrics,
}

impl MatchCoordinator {
    pub fn new(store: Arc<dyn MatchStore>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    pub async fn create_match(&self, new: NewMatchProposal) -> Result<MatchProposal, AppError> {
        validate_new(&new)?;

        if let Some(existing) = self
            .store
            .find_pending_between(&new.driver_id, &new.passenger_id)
            .await?
        {
            debug!(match_id = %existing.id, "returning existing open match");
            self.metrics
                .matches_created_total
                .with_label_values(&["existing"])
                .inc();
            return Ok(existing);
        }

        let driver_id = new.driver_id.clone();
        let passenger_id = new.passenger_id.clone();

        match self.insert_pending(new).await {
            Ok(created) => {
                info!(
                    match_id = %created.id,
                    driver_id = %created.driver_id,
                    passenger_id = %created.passenger_id,
                    "match proposed"
                );
                self.metrics
                    .matches_created_total
                    .with_label_values(&["created"])
                    .inc();
                Ok(created)
            }
            Err(StoreError::Conflict(reason)) => {
                warn!(%driver_id, %passenger_id, %reason, "concurrent match insert; re-reading");
                match self
                    .store
                    .find_pending_between(&driver_id, &passenger_id)
                    .await?
                {
                    Some(existing) => {
                        self.metrics
                            .matches_created_total
                            .with_label_values(&["existing"])
                            .inc();
                        Ok(existing)
                    }
                    None => Err(AppError::Conflict(reason)),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn insert_pending(&self, new: NewMatchProposal) -> Result<MatchProposal, StoreError> {
        let mut tx = self.store.begin().await?;
        let created = tx.insert(new).await?;
        tx.commit().await?;
        Ok(created)
    }

    pub async fn confirm_match_by_user(
        &self,
        match_id: Uuid,
        user_id: &str,
        is_driver: bool,
    ) -> Result<MatchProposal, AppError> {
        let role = ActorRole::from_is_driver(is_driver);
        let start = Instant::now();

        let result = self.confirm_locked(match_id, user_id, role).await;

        let outcome = match &result {
            Ok(proposal) if proposal.status == MatchStatus::Accepted => "accepted",
            Ok(_) => "confirmed",
            Err(err) => err.kind(),
        };
        self.metrics
            .confirmation_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .confirmations_total
            .with_label_values(&[outcome])
            .inc();

        result
    }

    async fn confirm_locked(
        &self,
        match_id: Uuid,
        user_id: &str,
        role: ActorRole,
    ) -> Result<MatchProposal, AppError> {
        // Early returns drop `tx`, which rolls back and releases the lock.
        let mut tx = self.store.begin().await?;
        let current = tx.get_by_id_for_update(match_id).await?;

        if current.party(role) != user_id {
            return Err(AppError::Forbidden(format!(
                "{user_id} is not the {role} of match {match_id}"
            )));
        }

        if current.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "match {match_id} is already {}",
                current.status
            )));
        }

        if current.has_confirmed(role) {
            return Err(AppError::AlreadyConfirmed(format!(
                "{role} {user_id} already confirmed match {match_id}"
            )));
        }

        let (driver_confirmed, passenger_confirmed) = current.flags_after_confirming(role);
        let status = MatchStatus::from_flags(driver_confirmed, passenger_confirmed);

        let affected = tx
            .update_status_and_flags(match_id, status, driver_confirmed, passenger_confirmed)
            .await?;
        if affected != 1 {
            return Err(AppError::Conflict(format!(
                "match {match_id} was modified concurrently"
            )));
        }

        let updated = tx.get_by_id_for_update(match_id).await?;
        tx.commit().await?;

        info!(
            match_id = %match_id,
            %role,
            user_id,
            status = %updated.status,
            "match confirmed"
        );
        Ok(updated)
    }

    pub async fn reject_competing_proposals(
        &self,
        accepted_match_id: Uuid,
        driver_id: &str,
        passenger_id: &str,
    ) -> Result<u64, AppError> {
        let accepted = self.store.get_by_id(accepted_match_id).await?;
        if accepted.status != MatchStatus::Accepted {
            return Err(AppError::InvalidState(format!(
                "match {accepted_match_id} is {}, not ACCEPTED",
                accepted.status
            )));
        }

        let mut competing: Vec<Uuid> = Vec::new();
        for (actor_id, role) in [
            (driver_id, ActorRole::Driver),
            (passenger_id, ActorRole::Passenger),
        ] {
            let proposals = self.store.list_by_actor(actor_id, role).await?;
            competing.extend(
                proposals
                    .into_iter()
                    .filter(|p| p.id != accepted_match_id && !p.status.is_terminal())
                    .map(|p| p.id),
            );
        }
        competing.sort();
        competing.dedup();

        if competing.is_empty() {
            return Ok(0);
        }

        let rejected = self
            .store
            .batch_update_status(&competing, MatchStatus::Rejected, &MatchStatus::OPEN)
            .await?;

        self.metrics.competing_rejected_total.inc_by(rejected);
        info!(
            match_id = %accepted_match_id,
            driver_id,
            passenger_id,
            rejected,
            "competing matches rejected"
        );
        Ok(rejected)
    }

    pub async fn get_match(&self, match_id: Uuid) -> Result<MatchProposal, AppError> {
        Ok(self.store.get_by_id(match_id).await?)
    }

    pub async fn list_by_actor(
        &self,
        actor_id: &str,
        role: ActorRole,
    ) -> Result<Vec<MatchProposal>, AppError> {
        Ok(self.store.list_by_actor(actor_id, role).await?)
    }
}

fn validate_new(new: &NewMatchProposal) -> Result<(), AppError> {
    if new.driver_id.trim().is_empty() || new.passenger_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "driver_id and passenger_id are required".to_string(),
        ));
    }
    if new.driver_id == new.passenger_id {
        return Err(AppError::BadRequest(
            "driver and passenger must be different actors".to_string(),
        ));
    }

    let locations = [
        Some(&new.driver_location),
        Some(&new.passenger_location),
        new.target_location.as_ref(),
    ];
    if locations.into_iter().flatten().any(|l| !l.is_finite()) {
        return Err(AppError::BadRequest(
            "location coordinates must be finite".to_string(),
        ));
    }
    Ok(())
}
