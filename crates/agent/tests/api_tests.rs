//! Agent RPC surface, end to end through the router

mod common;

use accel_adapters::InMemoryCatalog;
use accel_agent::{router, AgentManager, ProgramAccepted};
use accel_domain::{Availability, Deployable, Uuid};
use accel_drivers::DriverError;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct Fixture {
    app: Router,
    manager: Arc<AgentManager>,
    catalog: InMemoryCatalog,
    drivers: Drivers,
    _cache: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let cache = tempfile::tempdir().unwrap();
    let catalog = InMemoryCatalog::new();
    let drivers = drivers(default_probe());
    let manager = Arc::new(manager(test_config(cache.path()), &catalog, &drivers));

    Fixture {
        app: router(manager.clone()),
        manager,
        catalog,
        drivers,
        _cache: cache,
    }
}

async fn seeded_region(catalog: &InMemoryCatalog) -> Deployable {
    let deployable = record(&fpga_region("af:00.1"));
    catalog.insert(deployable.clone()).await;
    deployable
}

fn program_request(uuid: Uuid, firmware_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/v1/deployables/{}/program", uuid))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "firmware_id": firmware_id }).to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_reports_host() {
    let f = fixture();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(&f.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["host"], HOST);
}

#[tokio::test]
async fn test_program_request_is_accepted() {
    let f = fixture();
    let dep = seeded_region(&f.catalog).await;

    let (status, body) = send(&f.app, program_request(dep.uuid, "gzip-v2.bin")).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let accepted: ProgramAccepted = serde_json::from_value(body).unwrap();
    assert_eq!(accepted.deployable_uuid, dep.uuid);
    assert_eq!(accepted.firmware_id, "gzip-v2.bin");
    assert_eq!(accepted.status, "accepted");

    let stored = f.catalog.record(&dep.uuid).await.unwrap();
    assert_eq!(stored.availability, Availability::InPrograming);
    assert!(!stored.assignable);
    assert_eq!(f.drivers.fpga.programmed_images().len(), 1);
    assert!(f.manager.controller().is_in_flight(&dep.uuid));
}

#[tokio::test]
async fn test_second_request_for_same_deployable_conflicts() {
    let f = fixture();
    let dep = seeded_region(&f.catalog).await;

    let (first, _) = send(&f.app, program_request(dep.uuid, "gzip-v2.bin")).await;
    let (second, body) = send(&f.app, program_request(dep.uuid, "gzip-v3.bin")).await;

    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains(&dep.uuid.to_string()));
}

#[tokio::test]
async fn test_unknown_deployable_is_not_found() {
    let f = fixture();

    let (status, _) = send(&f.app, program_request(Uuid::new_v4(), "gzip-v2.bin")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deployable_of_another_host_is_not_found() {
    let f = fixture();
    let mut dep = record(&fpga_region("af:00.1"));
    dep.host = "compute-2".to_string();
    f.catalog.insert(dep.clone()).await;

    let (status, _) = send(&f.app, program_request(dep.uuid, "gzip-v2.bin")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(f.drivers.fpga.programmed_images().is_empty());
}

#[tokio::test]
async fn test_firmware_id_with_path_is_rejected() {
    let f = fixture();
    let dep = seeded_region(&f.catalog).await;

    let (status, _) = send(&f.app, program_request(dep.uuid, "../etc/passwd")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let stored = f.catalog.record(&dep.uuid).await.unwrap();
    assert_eq!(stored.availability, Availability::Free);
}

#[tokio::test]
async fn test_unsupported_programming_rolls_back() {
    let f = fixture();
    let dep = seeded_region(&f.catalog).await;
    f.drivers
        .fpga
        .fail_program_with(DriverError::not_implemented("scripted", "program"));

    let (status, _) = send(&f.app, program_request(dep.uuid, "gzip-v2.bin")).await;

    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    let stored = f.catalog.record(&dep.uuid).await.unwrap();
    assert_eq!(stored.availability, Availability::Free);
    assert!(stored.assignable);
}

#[tokio::test]
async fn test_missing_firmware_is_bad_gateway() {
    let f = fixture();
    let dep = seeded_region(&f.catalog).await;

    let (status, _) = send(&f.app, program_request(dep.uuid, "missing")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(f.drivers.fpga.programmed_images().is_empty());
}

#[tokio::test]
async fn test_requests_after_shutdown_are_unavailable() {
    let f = fixture();
    let dep = seeded_region(&f.catalog).await;
    f.manager.shutdown().await;

    let (status, _) = send(&f.app, program_request(dep.uuid, "gzip-v2.bin")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_events_and_stats_reflect_requests() {
    let f = fixture();
    let dep = seeded_region(&f.catalog).await;
    send(&f.app, program_request(dep.uuid, "gzip-v2.bin")).await;

    let request = Request::builder()
        .uri("/api/v1/programming/events?limit=10")
        .body(Body::empty())
        .unwrap();
    let (status, events) = send(&f.app, request).await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["stage"], "accepted");
    assert_eq!(events[0]["firmware_id"], "gzip-v2.bin");

    let request = Request::builder()
        .uri("/api/v1/programming/stats")
        .body(Body::empty())
        .unwrap();
    let (status, stats) = send(&f.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["accepted"], 1);
}

#[tokio::test]
async fn test_agent_client_reaches_served_router() {
    let f = fixture();
    let dep = seeded_region(&f.catalog).await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = f.app.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = accel_agent::AgentClient::new(port, std::time::Duration::from_secs(5));
    let accepted = client
        .program_device(Some("127.0.0.1"), &dep, "gzip-v2.bin")
        .await
        .unwrap();
    assert_eq!(accepted.deployable_uuid, dep.uuid);

    let refused = client
        .program_device(Some("127.0.0.1"), &dep, "gzip-v2.bin")
        .await;
    assert!(matches!(refused, Err(accel_agent::AgentError::Rpc(msg)) if msg.contains("409")));
}
