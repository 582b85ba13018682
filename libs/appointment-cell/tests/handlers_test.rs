// libs/appointment-cell/tests/handlers_test.rs
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tower::ServiceExt;

use appointment_cell::router::{appointment_routes, availability_routes, calendar_routes};
use appointment_cell::{AppointmentState, InMemoryLedger};
use schedule_cell::{DayOfWeek, FixedClock, ScheduleCatalog};
use shared_utils::test_utils::{TestConfig, TestPatients, TestSchedules};

const EVENING_PATH: &str = "05:00%20PM%20-%2006:00%20PM";

fn app(capacity: u32) -> Router {
    let raw = TestSchedules::single_hospital_json(capacity).to_string();
    let catalog = ScheduleCatalog::from_json_str(&raw, Some(DayOfWeek::Friday)).unwrap();
    let state = Arc::new(AppointmentState::new(
        TestConfig::default().to_arc(),
        Arc::new(catalog),
        Arc::new(InMemoryLedger::new()),
        Arc::new(FixedClock(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap())),
    ));

    Router::new()
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/availability", availability_routes(state.clone()))
        .nest("/calendar", calendar_routes(state))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

async fn book(app: &Router, date: &str, time: &str) -> (StatusCode, Value) {
    send(app, Method::POST, "/appointments", Some(TestPatients::booking_request("testcare", date, time))).await
}

#[tokio::test]
async fn booking_returns_created_with_slot_info() {
    let app = app(2);

    let (status, body) = book(&app, "2025-09-08", "05:00 PM - 06:00 PM").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["appointment"]["hospital_id"], "testcare");
    assert_eq!(body["appointment"]["appointment_date"], "2025-09-08");
    assert_eq!(body["appointment"]["status"], "pending");
    assert_eq!(body["slot_info"]["remaining_slots"], 1);
}

#[tokio::test]
async fn booking_accepts_appointment_date_and_timestamps() {
    let app = app(2);
    let mut request = TestPatients::booking_request("TestCare Hospital", "2025-09-08", "17:00");
    let fields = request.as_object_mut().unwrap();
    fields.remove("date");
    fields.insert("appointment_date".to_string(), json!("2025-09-08T00:00:00.000Z"));

    let (status, body) = send(&app, Method::POST, "/appointments", Some(request)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointment"]["appointment_date"], "2025-09-08");
}

#[tokio::test]
async fn full_slot_is_a_conflict_with_counts() {
    let app = app(1);
    assert_eq!(book(&app, "2025-09-08", "17:00").await.0, StatusCode::CREATED);

    let (status, body) = book(&app, "2025-09-08", "17:00").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"]["current_bookings"], 1);
    assert_eq!(body["details"]["max_capacity"], 1);
    assert_eq!(body["details"]["available_slots"], 0);
    assert_eq!(body["details"]["reason"], "capacity_exceeded");
}

#[tokio::test]
async fn closed_and_invalid_bookings_are_bad_requests() {
    let app = app(2);

    let (status, body) = book(&app, "2025-09-05", "17:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "TestCare Hospital is closed on Fridays");
    assert_eq!(body["success"], false);

    assert_eq!(book(&app, "2025-08-25", "17:00").await.0, StatusCode::BAD_REQUEST);
    assert_eq!(book(&app, "2025-09-08", "21:00").await.0, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/appointments",
        Some(TestPatients::booking_request("nowhere", "2025-09-08", "17:00")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn single_slot_availability() {
    let app = app(3);
    book(&app, "2025-09-08", "17:00").await;

    let (status, body) = send(&app, Method::GET, &format!("/availability/testcare/2025-09-08/{}", EVENING_PATH), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["max_capacity"], 3);
    assert_eq!(body["current_bookings"], 1);
    assert_eq!(body["available_slots"], 2);
    assert_eq!(body["is_available"], true);
    assert_eq!(body["status"], "available");
    assert_eq!(body["slot_id"], "testcare-mon-1700");
    assert!(body["last_updated"].is_string());

    let (status, body) = send(&app, Method::GET, "/availability/testcare/2025-09-05/17:00", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closed");
    assert_eq!(body["is_available"], false);

    let (status, _) = send(&app, Method::GET, "/availability/nowhere/2025-09-08/17:00", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/availability/testcare/09-08-2025/17:00", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn day_and_bulk_availability() {
    let app = app(3);
    book(&app, "2025-09-08", "18:00").await;

    let (status, body) = send(&app, Method::GET, "/availability/testcare/2025-09-08", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["day"]["total_slots"], 2);
    assert_eq!(body["day"]["used_capacity"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/availability/bulk",
        Some(json!({
            "hospitalId": "testcare",
            "dateTimeSlots": [
                { "date": "2025-09-08", "time": "06:00 PM - 07:00 PM" },
                { "date": "2025-09-15", "time": "06:00 PM - 07:00 PM" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hospital_id"], "testcare");
    assert_eq!(body["slots"][0]["current_bookings"], 1);
    assert_eq!(body["slots"][1]["current_bookings"], 0);
    assert_eq!(body["slots"][1]["available_slots"], 3);
}

#[tokio::test]
async fn bulk_limits_are_enforced() {
    let app = app(3);

    let many_dates: Vec<Value> = (0..32)
        .map(|offset| {
            let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap() + chrono::Days::new(offset);
            json!({ "date": date.to_string(), "time": "17:00" })
        })
        .collect();

    let (status, _) = send(
        &app,
        Method::POST,
        "/availability/bulk",
        Some(json!({ "hospital_id": "testcare", "date_time_slots": many_dates })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/availability/bulk",
        Some(json!({ "hospital_id": "testcare", "date_time_slots": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn appointment_lifecycle_over_http() {
    let app = app(2);
    let (_, created) = book(&app, "2025-09-08", "17:00").await;
    let id = created["appointment"]["id"].as_str().unwrap().to_string();
    let reference = created["appointment"]["reference_number"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, &format!("/appointments/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());

    let (status, body) = send(&app, Method::GET, &format!("/appointments/track/{}", reference), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["hospital_name"], "TestCare Hospital");
    assert!(body["appointment"].get("patient_email").is_none());

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/appointments/{}/status", id),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "confirmed");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/appointments/{}/status", id),
        Some(json!({ "status": "no-show" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "no-show");

    let (status, _) = send(&app, Method::POST, &format!("/appointments/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancel_frees_the_slot_over_http() {
    let app = app(1);
    let (_, created) = book(&app, "2025-09-08", "17:00").await;
    let id = created["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::POST, &format!("/appointments/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "cancelled");

    assert_eq!(book(&app, "2025-09-08", "17:00").await.0, StatusCode::CREATED);
}

#[tokio::test]
async fn listing_and_lookup_errors() {
    let app = app(2);
    book(&app, "2025-09-08", "17:00").await;
    book(&app, "2025-09-10", "09:00").await;

    let (status, body) = send(&app, Method::GET, "/appointments?date=2025-09-08&hospital=TestCare%20Clinic", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = send(&app, Method::GET, "/appointments?status=pending&limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (status, _) = send(&app, Method::GET, "/appointments?status=teleported", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/appointments/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, &format!("/appointments/{}", uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn calendar_route() {
    let app = app(2);
    book(&app, "2025-09-08", "17:00").await;

    let (status, body) = send(&app, Method::GET, "/calendar/testcare?days=14&start=2025-09-01", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hospital_id"], "testcare");
    let days = body["calendar"].as_array().unwrap();
    assert_eq!(days.len(), 14);
    assert_eq!(days[7]["date"], "2025-09-08");
    assert_eq!(days[7]["used_capacity"], 1);
    assert_eq!(days[4]["is_closed"], true);

    let (status, body) = send(&app, Method::GET, "/calendar/testcare", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["calendar"].as_array().unwrap().len(), 30);
    assert_eq!(body["start_date"], "2025-09-01");

    let (status, body) = send(&app, Method::GET, "/calendar/testcare?days=500", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["days"], 62);

    let (status, _) = send(&app, Method::GET, "/calendar/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn doctor_notes_update_over_http() {
    let app = app(2);
    let (_, booked) = book(&app, "2025-09-08", "17:00").await;
    let id = booked["appointment"]["id"].as_str().unwrap().to_string();
    let uri = format!("/appointments/{}", id);

    let (status, body) = send(&app, Method::PUT, &uri, Some(json!({ "doctor_notes": "Bring X-ray" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "pending");
    assert_eq!(body["appointment"]["doctor_notes"], "Bring X-ray");

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "status": "confirmed", "doctorNotes": "X-ray reviewed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "confirmed");
    assert_eq!(body["appointment"]["doctor_notes"], "X-ray reviewed");

    let (status, body) = send(&app, Method::PUT, &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn stats_overview_route() {
    let app = app(2);
    book(&app, "2025-09-01", "17:00").await;
    book(&app, "2025-09-08", "17:00").await;
    let (_, booked) = book(&app, "2025-09-08", "18:00").await;
    let id = booked["appointment"]["id"].as_str().unwrap().to_string();
    send(&app, Method::POST, &format!("/appointments/{}/cancel", id), None).await;

    let (status, body) = send(&app, Method::GET, "/appointments/stats/overview", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["total_appointments"], 3);
    assert_eq!(body["stats"]["pending_appointments"], 2);
    assert_eq!(body["stats"]["cancelled_appointments"], 1);
    assert_eq!(body["stats"]["today_appointments"], 1);
    assert_eq!(body["stats"]["upcoming_appointments"], 2);
    assert_eq!(body["as_of"], "2025-09-01");

    let (status, body) = send(&app, Method::GET, "/appointments/stats/overview?hospital=testcare", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["total_appointments"], 3);

    let (status, body) = send(&app, Method::GET, "/appointments/stats/overview?hospital=nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}
