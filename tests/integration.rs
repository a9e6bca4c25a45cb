use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ride_match_core::api::rest::router;
use ride_match_core::clock::ManualClock;
use ride_match_core::engine::acceptance::run_acceptance_worker;
use ride_match_core::geo::offset_north_km;
use ride_match_core::models::location::Location;
use ride_match_core::models::ride::MatchAccepted;
use ride_match_core::state::{AppState, Backends, StateOptions};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

fn setup() -> (axum::Router, Arc<AppState>, mpsc::Receiver<MatchAccepted>) {
    let backends = Backends::in_memory(Arc::new(ManualClock::default()));
    let (state, rx) = AppState::new(backends, StateOptions::default());
    let shared = Arc::new(state);
    (router(shared.clone()), shared, rx)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn center() -> Location {
    Location::new(52.52, 13.405)
}

fn location_json(location: Location) -> Value {
    json!({ "lat": location.lat, "lng": location.lng })
}

async fn make_available(app: &axum::Router, pool: &str, id: &str, location: Location) {
    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/{pool}/{id}/availability"),
            location_json(location),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

async fn create_match(app: &axum::Router, driver: &str, passenger: &str) -> Value {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/matches",
            json!({
                "driver_id": driver,
                "passenger_id": passenger,
                "driver_location": location_json(center()),
                "passenger_location": location_json(offset_north_km(&center(), 0.4)),
                "target_location": { "lat": 52.55, "lng": 13.45 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

async fn confirm(
    app: &axum::Router,
    match_id: &str,
    user_id: &str,
    is_driver: bool,
) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/matches/{match_id}/confirm"),
            json!({ "user_id": user_id, "is_driver": is_driver }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["available_drivers"], 0);
    assert_eq!(body["available_passengers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state, _rx) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("competing_rejected_total"));
}

#[tokio::test]
async fn nearby_drivers_are_ordered_and_filtered() {
    let (app, _state, _rx) = setup();
    make_available(&app, "drivers", "d-far", offset_north_km(&center(), 1.2)).await;
    make_available(&app, "drivers", "d-mid", offset_north_km(&center(), 0.8)).await;
    make_available(&app, "drivers", "d-near", offset_north_km(&center(), 0.5)).await;

    let res = app
        .oneshot(get_request(&format!(
            "/drivers/nearby?lat={}&lng={}&radius_km=1.0",
            center().lat,
            center().lng
        )))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    let actors = body["actors"].as_array().unwrap();
    assert_eq!(actors.len(), 2);
    assert_eq!(actors[0]["id"], "d-near");
    assert_eq!(actors[1]["id"], "d-mid");
    assert!(actors[0]["distance_km"].as_f64().unwrap() < actors[1]["distance_km"].as_f64().unwrap());
}

#[tokio::test]
async fn nearby_uses_default_radius_when_omitted() {
    let (app, _state, _rx) = setup();
    make_available(&app, "passengers", "p-1", offset_north_km(&center(), 4.0)).await;

    let res = app
        .oneshot(get_request(&format!(
            "/passengers/nearby?lat={}&lng={}",
            center().lat,
            center().lng
        )))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["radius_km"], 5.0);
    assert_eq!(body["actors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn removing_unavailable_driver_succeeds() {
    let (app, _state, _rx) = setup();
    let res = app
        .clone()
        .oneshot(delete_request("/drivers/ghost/availability"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    make_available(&app, "drivers", "d-1", center()).await;
    let res = app
        .clone()
        .oneshot(delete_request("/drivers/d-1/availability"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .clone()
        .oneshot(get_request("/drivers/d-1/location"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app.oneshot(get_request("/health")).await.unwrap();
    let body = body_json(res).await;
    assert_eq!(body["available_drivers"], 0);
}

#[tokio::test]
async fn create_match_is_idempotent() {
    let (app, _state, _rx) = setup();
    let first = create_match(&app, "d-1", "p-1").await;
    let second = create_match(&app, "d-1", "p-1").await;

    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["status"], "PENDING");
    assert_eq!(first["driver_confirmed"], false);
    assert_eq!(first["passenger_confirmed"], false);
}

#[tokio::test]
async fn create_match_with_same_actor_returns_400() {
    let (app, _state, _rx) = setup();
    let res = app
        .oneshot(json_request(
            "POST",
            "/matches",
            json!({
                "driver_id": "x",
                "passenger_id": "x",
                "driver_location": location_json(center()),
                "passenger_location": location_json(center())
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_nonexistent_match_returns_404() {
    let (app, _state, _rx) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/matches/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "not_found");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn confirmation_errors_map_to_client_statuses() {
    let (app, _state, _rx) = setup();
    let created = create_match(&app, "d-1", "p-1").await;
    let id = created["id"].as_str().unwrap().to_string();

    let res = confirm(&app, &id, "intruder", true).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = body_json(res).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("can no longer be confirmed"));

    let res = confirm(&app, &id, "d-1", true).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = confirm(&app, &id, "d-1", true).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = body_json(res).await;
    assert_eq!(body["kind"], "already_confirmed");

    let res = confirm(&app, &id, "p-1", false).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = confirm(&app, &id, "p-1", false).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = body_json(res).await;
    assert_eq!(body["kind"], "invalid_state");
}

#[tokio::test]
async fn full_match_flow() {
    let (app, state, rx) = setup();
    let mut events = state.match_events_tx.subscribe();
    tokio::spawn(run_acceptance_worker(state.clone(), rx));

    make_available(&app, "drivers", "d-1", center()).await;
    make_available(&app, "passengers", "p-1", offset_north_km(&center(), 0.4)).await;

    let res = app
        .clone()
        .oneshot(get_request(&format!(
            "/drivers/nearby?lat={}&lng={}&radius_km=1.0",
            center().lat,
            center().lng
        )))
        .await
        .unwrap();
    let nearby = body_json(res).await;
    assert_eq!(nearby["actors"][0]["id"], "d-1");

    let created = create_match(&app, "d-1", "p-1").await;
    let match_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "PENDING");

    let competing = create_match(&app, "d-1", "p-2").await;
    let competing_id = competing["id"].as_str().unwrap().to_string();

    let res = confirm(&app, &match_id, "d-1", true).await;
    let body = body_json(res).await;
    assert_eq!(body["status"], "DRIVER_CONFIRMED");

    let res = confirm(&app, &match_id, "p-1", false).await;
    let body = body_json(res).await;
    assert_eq!(body["status"], "ACCEPTED");
    assert_eq!(body["driver_confirmed"], true);
    assert_eq!(body["passenger_confirmed"], true);

    let event = events.recv().await.unwrap();
    assert_eq!(event.match_id.to_string(), match_id);
    assert_eq!(event.driver_id, "d-1");
    assert_eq!(event.passenger_id, "p-1");

    let mut competing_status = Value::Null;
    for _ in 0..50 {
        let res = app
            .clone()
            .oneshot(get_request(&format!("/matches/{competing_id}")))
            .await
            .unwrap();
        competing_status = body_json(res).await["status"].clone();
        if competing_status == "REJECTED" {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }
    assert_eq!(competing_status, "REJECTED");

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/rides/active",
            json!({ "driver_id": "d-1", "passenger_id": "p-1", "ride_id": "ride-42" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .clone()
        .oneshot(get_request("/rides/active/passengers/p-1"))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["ride_id"], "ride-42");

    let res = app
        .clone()
        .oneshot(get_request("/actors/d-1/matches?role=driver"))
        .await
        .unwrap();
    let listed = body_json(res).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn active_ride_lifecycle() {
    let (app, _state, _rx) = setup();

    let res = app
        .clone()
        .oneshot(get_request("/rides/active/drivers/d-1"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert!(body["ride_id"].is_null());

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/rides/active",
            json!({ "driver_id": "d-1", "passenger_id": "p-1", "ride_id": "ride-1", "ttl_secs": 60 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .clone()
        .oneshot(get_request("/rides/active/drivers/d-1"))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["ride_id"], "ride-1");

    let res = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            "/rides/active",
            json!({ "driver_id": "d-1", "passenger_id": "p-1" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["driver_cleared"], true);
    assert_eq!(body["passenger_cleared"], true);

    let res = app
        .oneshot(get_request("/rides/active/passengers/p-1"))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert!(body["ride_id"].is_null());
}

#[tokio::test]
async fn acceptance_survives_dropped_confirm_request() {
    let options = StateOptions {
        event_buffer_size: 1,
        ..StateOptions::default()
    };
    let (state, rx) = AppState::new(
        Backends::in_memory(Arc::new(ManualClock::default())),
        options,
    );
    let state = Arc::new(state);
    let app = router(state.clone());

    // First acceptance fills the queue while no worker is draining it.
    let first = create_match(&app, "d-1", "p-1").await;
    let first_id = first["id"].as_str().unwrap().to_string();
    confirm(&app, &first_id, "d-1", true).await;
    confirm(&app, &first_id, "p-1", false).await;

    let second = create_match(&app, "d-2", "p-2").await;
    let second_id = second["id"].as_str().unwrap().to_string();
    let rival = create_match(&app, "d-2", "p-3").await;
    let rival_id = rival["id"].as_str().unwrap().to_string();
    confirm(&app, &second_id, "d-2", true).await;

    // The caller gives up on the request; whether it finished is irrelevant.
    let _ = tokio::time::timeout(
        tokio::time::Duration::from_millis(100),
        confirm(&app, &second_id, "p-2", false),
    )
    .await;

    tokio::spawn(run_acceptance_worker(state.clone(), rx));

    let mut rival_status = Value::Null;
    for _ in 0..100 {
        let res = app
            .clone()
            .oneshot(get_request(&format!("/matches/{rival_id}")))
            .await
            .unwrap();
        rival_status = body_json(res).await["status"].clone();
        if rival_status == "REJECTED" {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    let res = app
        .oneshot(get_request(&format!("/matches/{second_id}")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "ACCEPTED");
    assert_eq!(rival_status, "REJECTED");
}
