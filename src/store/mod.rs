pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::actor::ActorRole;
use crate::models::proposal::{MatchProposal, MatchStatus, NewMatchProposal};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("match {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt match row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn MatchTx>, StoreError>;

    async fn find_pending_between(
        &self,
        driver_id: &str,
        passenger_id: &str,
    ) -> Result<Option<MatchProposal>, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<MatchProposal, StoreError>;

    async fn batch_update_status(
        &self,
        ids: &[Uuid],
        new_status: MatchStatus,
        allowed_from: &[MatchStatus],
    ) -> Result<u64, StoreError>;

    async fn list_by_actor(
        &self,
        actor_id: &str,
        role: ActorRole,
    ) -> Result<Vec<MatchProposal>, StoreError>;
}

#[async_trait]
pub trait MatchTx: Send {
    /// Fails with `Conflict` when the pair already has an open proposal.
    async fn insert(&mut self, proposal: NewMatchProposal) -> Result<MatchProposal, StoreError>;

    /// Reads the row and holds an exclusive lock on it until the
    /// transaction ends.
    async fn get_by_id_for_update(&mut self, id: Uuid) -> Result<MatchProposal, StoreError>;

    /// Conditional write: only applies while the row is still open.
    /// Returns rows affected.
    async fn update_status_and_flags(
        &mut self,
        id: Uuid,
        status: MatchStatus,
        driver_confirmed: bool,
        passenger_confirmed: bool,
    ) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
