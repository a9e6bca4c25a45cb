// Runs against a live database only when DATABASE_URL is set:
//   DATABASE_URL=postgres://... cargo test --test postgres_store

use std::sync::Arc;

use ride_match_core::clock::SystemClock;
use ride_match_core::engine::coordinator::MatchCoordinator;
use ride_match_core::models::location::Location;
use ride_match_core::models::proposal::{MatchStatus, NewMatchProposal};
use ride_match_core::observability::metrics::Metrics;
use ride_match_core::store::postgres::{init_pool, PgMatchStore};
use ride_match_core::store::{MatchStore, StoreError};
use uuid::Uuid;

async fn pg_store() -> Option<PgMatchStore> {
    let url = std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())?;
    let pool = init_pool(&url).await.unwrap();
    Some(PgMatchStore::new(pool, Arc::new(SystemClock)))
}

// Fresh ids per run so repeated runs against the same database never collide.
fn pair() -> (String, String) {
    let run = Uuid::new_v4();
    (format!("d-{run}"), format!("p-{run}"))
}

fn proposal(driver: &str, passenger: &str) -> NewMatchProposal {
    NewMatchProposal {
        driver_id: driver.to_string(),
        passenger_id: passenger.to_string(),
        driver_location: Location::new(52.52, 13.405),
        passenger_location: Location::new(52.523, 13.41),
        target_location: Some(Location::new(52.55, 13.45)),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pg_concurrent_confirmations_both_land() {
    let Some(store) = pg_store().await else {
        return;
    };
    let store = Arc::new(store);
    let coordinator = Arc::new(MatchCoordinator::new(store.clone(), Metrics::new()));

    for _ in 0..10 {
        let (driver, passenger) = pair();
        let created = coordinator
            .create_match(proposal(&driver, &passenger))
            .await
            .unwrap();
        let match_id = created.id;

        let by_driver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .confirm_match_by_user(match_id, &driver, true)
                    .await
            })
        };
        let by_passenger = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .confirm_match_by_user(match_id, &passenger, false)
                    .await
            })
        };
        by_driver.await.unwrap().unwrap();
        by_passenger.await.unwrap().unwrap();

        let stored = store.get_by_id(created.id).await.unwrap();
        assert_eq!(stored.status, MatchStatus::Accepted);
        assert!(stored.driver_confirmed && stored.passenger_confirmed);
    }
}

#[tokio::test]
async fn pg_duplicate_open_pair_conflicts_then_resolves_by_lookup() {
    let Some(store) = pg_store().await else {
        return;
    };
    let (driver, passenger) = pair();

    let mut first = store.begin().await.unwrap();
    let created = first.insert(proposal(&driver, &passenger)).await.unwrap();
    first.commit().await.unwrap();

    let mut second = store.begin().await.unwrap();
    let result = second.insert(proposal(&driver, &passenger)).await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));
    drop(second);

    let existing = store
        .find_pending_between(&driver, &passenger)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(existing.id, created.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pg_concurrent_creation_yields_one_proposal() {
    let Some(store) = pg_store().await else {
        return;
    };
    let coordinator = Arc::new(MatchCoordinator::new(Arc::new(store), Metrics::new()));
    let (driver, passenger) = pair();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let coordinator = coordinator.clone();
            let new = proposal(&driver, &passenger);
            tokio::spawn(async move { coordinator.create_match(new).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn pg_terminal_row_is_not_updated() {
    let Some(store) = pg_store().await else {
        return;
    };
    let (driver, passenger) = pair();

    let mut tx = store.begin().await.unwrap();
    let created = tx.insert(proposal(&driver, &passenger)).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.get_by_id_for_update(created.id).await.unwrap();
    let affected = tx
        .update_status_and_flags(created.id, MatchStatus::Accepted, true, true)
        .await
        .unwrap();
    assert_eq!(affected, 1);
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let affected = tx
        .update_status_and_flags(created.id, MatchStatus::DriverConfirmed, true, false)
        .await
        .unwrap();
    assert_eq!(affected, 0);
    tx.commit().await.unwrap();

    let stored = store.get_by_id(created.id).await.unwrap();
    assert_eq!(stored.status, MatchStatus::Accepted);
    assert!(stored.passenger_confirmed);
}

#[tokio::test]
async fn pg_missing_match_is_not_found() {
    let Some(store) = pg_store().await else {
        return;
    };
    let mut tx = store.begin().await.unwrap();
    let result = tx.get_by_id_for_update(Uuid::new_v4()).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}
