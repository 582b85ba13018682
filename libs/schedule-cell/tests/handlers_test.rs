// libs/schedule-cell/tests/handlers_test.rs
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use schedule_cell::router::schedule_routes;
use schedule_cell::{DayOfWeek, ScheduleCatalog};
use shared_utils::test_utils::TestSchedules;

fn app() -> Router {
    let raw = TestSchedules::single_hospital_json(3).to_string();
    let catalog = ScheduleCatalog::from_json_str(&raw, Some(DayOfWeek::Friday)).unwrap();
    schedule_routes(Arc::new(catalog))
}

async fn get(uri: &str) -> (StatusCode, Value) {
    let response = app()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn lists_all_schedules() {
    let (status, body) = get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["weekly_closure_day"], "Friday");
    assert_eq!(body["schedules"][0]["hospital_id"], "testcare");
    assert_eq!(body["schedules"][0]["operating_days"], serde_json::json!([1, 3]));
}

#[tokio::test]
async fn schedule_lookup_uses_hospital_aliases() {
    let (status, body) = get("/TestCare%20Clinic").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedule"]["hospital_name"], "TestCare Hospital");
    assert_eq!(body["schedule"]["max_appointments_per_slot"], 3);

    let (status, _) = get("/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn operating_days_lists_configured_days() {
    let (status, body) = get("/testcare/days").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_days"], 2);
    assert_eq!(body["available_days"][0]["day_name"], "Monday");
    assert_eq!(body["available_days"][1]["slot_count"], 2);
}

#[tokio::test]
async fn day_slots_by_number() {
    let (status, body) = get("/testcare/day/1/slots").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slots"][0]["id"], "testcare-mon-1700");
    assert_eq!(body["slots"][0]["start_time"], "17:00");

    let (status, body) = get("/testcare/day/5/slots").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "TestCare Hospital is closed on Fridays");
    assert_eq!(body["success"], false);

    let (status, _) = get("/testcare/day/9/slots").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn preview_marks_closed_dates() {
    let (status, body) = get("/testcare/preview/2025-01-06").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_closed"], false);
    assert_eq!(body["slots"].as_array().unwrap().len(), 2);
    assert_eq!(body["authoritative"], false);

    let (status, body) = get("/testcare/preview/2025-01-10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_closed"], true);

    let (status, _) = get("/testcare/preview/not-a-date").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
