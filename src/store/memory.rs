use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::actor::ActorRole;
use crate::models::proposal::{MatchProposal, MatchStatus, NewMatchProposal};
use crate::store::{MatchStore, MatchTx, StoreError};

type Pair = (String, String);

struct Inner {
    rows: DashMap<Uuid, MatchProposal>,
    row_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    // Open proposal per (driver, passenger); stands in for the partial unique index.
    open_pairs: DashMap<Pair, Uuid>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
}

impl Inner {
    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("match store offline".to_string()));
        }
        Ok(())
    }

    fn row_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.row_locks.entry(id).or_default().clone()
    }

    fn forget_lock_if_absent(&self, id: Uuid) {
        self.row_locks
            .remove_if(&id, |_, _| !self.rows.contains_key(&id));
    }

    fn release_pair_if_closed(&self, proposal: &MatchProposal) {
        if proposal.status.is_terminal() {
            self.open_pairs
                .remove_if(&pair_of(proposal), |_, open_id| *open_id == proposal.id);
        }
    }
}

fn pair_of(proposal: &MatchProposal) -> Pair {
    (proposal.driver_id.clone(), proposal.passenger_id.clone())
}

#[derive(Clone)]
pub struct MemoryMatchStore {
    inner: Arc<Inner>,
}

impl MemoryMatchStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                rows: DashMap::new(),
                row_locks: DashMap::new(),
                open_pairs: DashMap::new(),
                clock,
                offline: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rows.is_empty()
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn begin(&self) -> Result<Box<dyn MatchTx>, StoreError> {
        self.inner.check()?;
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            locks: HashMap::new(),
            staged: Vec::new(),
        }))
    }

    async fn find_pending_between(
        &self,
        driver_id: &str,
        passenger_id: &str,
    ) -> Result<Option<MatchProposal>, StoreError> {
        self.inner.check()?;
        let pair = (driver_id.to_string(), passenger_id.to_string());
        let open_id = self.inner.open_pairs.get(&pair).map(|id| *id);

        Ok(open_id
            .and_then(|id| self.inner.rows.get(&id).map(|row| row.clone()))
            .filter(|row| !row.status.is_terminal()))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<MatchProposal, StoreError> {
        self.inner.check()?;
        self.inner
            .rows
            .get(&id)
            .map(|row| row.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn batch_update_status(
        &self,
        ids: &[Uuid],
        new_status: MatchStatus,
        allowed_from: &[MatchStatus],
    ) -> Result<u64, StoreError> {
        self.inner.check()?;

        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut changed = 0;
        for id in ids {
            let lock = self.inner.row_lock(id);
            let guard = lock.lock().await;

            let Some(mut row) = self.inner.rows.get(&id).map(|row| row.clone()) else {
                drop(guard);
                self.inner.forget_lock_if_absent(id);
                continue;
            };
            if !allowed_from.contains(&row.status) {
                continue;
            }

            row.status = new_status;
            row.updated_at = self.inner.clock.now();
            self.inner.release_pair_if_closed(&row);
            self.inner.rows.insert(id, row);
            changed += 1;
        }

        Ok(changed)
    }

    async fn list_by_actor(
        &self,
        actor_id: &str,
        role: ActorRole,
    ) -> Result<Vec<MatchProposal>, StoreError> {
        self.inner.check()?;
        let mut proposals: Vec<MatchProposal> = self
            .inner
            .rows
            .iter()
            .filter(|row| row.party(role) == actor_id)
            .map(|row| row.value().clone())
            .collect();

        proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(proposals)
    }
}

enum Staged {
    Insert(MatchProposal),
    Update(MatchProposal),
}

impl Staged {
    fn row(&self) -> &MatchProposal {
        match self {
            Staged::Insert(row) | Staged::Update(row) => row,
        }
    }
}

pub struct MemoryTx {
    inner: Arc<Inner>,
    locks: HashMap<Uuid, OwnedMutexGuard<()>>,
    staged: Vec<Staged>,
}

impl MemoryTx {
    async fn lock_row(&mut self, id: Uuid) {
        if self.locks.contains_key(&id) {
            return;
        }
        let lock = self.inner.row_lock(id);
        let guard = lock.lock_owned().await;
        self.locks.insert(id, guard);
    }

    fn current(&self, id: Uuid) -> Option<MatchProposal> {
        self.staged
            .iter()
            .rev()
            .map(Staged::row)
            .find(|row| row.id == id)
            .cloned()
            .or_else(|| self.inner.rows.get(&id).map(|row| row.clone()))
    }

    fn claim_pairs(&self) -> Result<(), StoreError> {
        let mut claimed: Vec<(Pair, Uuid)> = Vec::new();
        let mut conflict = None;

        for staged in &self.staged {
            let Staged::Insert(row) = staged else {
                continue;
            };
            let pair = pair_of(row);
            let taken = match self.inner.open_pairs.entry(pair.clone()) {
                Entry::Occupied(_) => true,
                Entry::Vacant(slot) => {
                    // Publish the row while the pair slot is still held so lookups
                    // through the pair never miss it.
                    self.inner.rows.insert(row.id, row.clone());
                    slot.insert(row.id);
                    false
                }
            };
            if taken {
                conflict = Some(pair);
                break;
            }
            claimed.push((pair, row.id));
        }

        match conflict {
            None => Ok(()),
            Some((driver_id, passenger_id)) => {
                for (pair, id) in claimed {
                    self.inner.open_pairs.remove_if(&pair, |_, open_id| *open_id == id);
                    self.inner.rows.remove(&id);
                }
                Err(StoreError::Conflict(format!(
                    "open match already exists for driver {driver_id} and passenger {passenger_id}"
                )))
            }
        }
    }
}

#[async_trait]
impl MatchTx for MemoryTx {
    async fn insert(&mut self, proposal: NewMatchProposal) -> Result<MatchProposal, StoreError> {
        self.inner.check()?;

        let pair = (proposal.driver_id.clone(), proposal.passenger_id.clone());
        let staged_dup = self
            .staged
            .iter()
            .any(|staged| matches!(staged, Staged::Insert(row) if pair_of(row) == pair));
        if staged_dup || self.inner.open_pairs.contains_key(&pair) {
            return Err(StoreError::Conflict(format!(
                "open match already exists for driver {} and passenger {}",
                pair.0, pair.1
            )));
        }

        let row = proposal.into_proposal(Uuid::new_v4(), self.inner.clock.now());
        self.staged.push(Staged::Insert(row.clone()));
        Ok(row)
    }

    async fn get_by_id_for_update(&mut self, id: Uuid) -> Result<MatchProposal, StoreError> {
        self.inner.check()?;
        self.lock_row(id).await;

        match self.current(id) {
            Some(row) => Ok(row),
            None => {
                self.locks.remove(&id);
                self.inner.forget_lock_if_absent(id);
                Err(StoreError::NotFound(id))
            }
        }
    }

    async fn update_status_and_flags(
        &mut self,
        id: Uuid,
        status: MatchStatus,
        driver_confirmed: bool,
        passenger_confirmed: bool,
    ) -> Result<u64, StoreError> {
        self.inner.check()?;
        self.lock_row(id).await;

        let Some(mut row) = self.current(id) else {
            return Ok(0);
        };
        if row.status.is_terminal() {
            return Ok(0);
        }

        row.status = status;
        row.driver_confirmed = driver_confirmed;
        row.passenger_confirmed = passenger_confirmed;
        row.updated_at = self.inner.clock.now();
        self.staged.push(Staged::Update(row));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.check()?;
        self.claim_pairs()?;

        let MemoryTx {
            inner,
            locks,
            staged,
        } = *self;

        for staged in staged {
            let row = match staged {
                Staged::Insert(row) | Staged::Update(row) => row,
            };
            inner.release_pair_if_closed(&row);
            inner.rows.insert(row.id, row);
        }

        drop(locks);
        Ok(())
    }
}
