// libs/appointment-cell/tests/calendar_test.rs
use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;

use appointment_cell::{AppointmentState, BookingError, BookingService, CalendarService, InMemoryLedger, PatientDetails};
use schedule_cell::{DayOfWeek, FixedClock, ScheduleCatalog};
use shared_config::AppConfig;
use shared_utils::test_utils::{TestConfig, TestPatients, TestSchedules};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn state_with(config: AppConfig) -> Arc<AppointmentState> {
    state_with_capacity(config, 2)
}

fn state_with_capacity(config: AppConfig, capacity: u32) -> Arc<AppointmentState> {
    let raw = TestSchedules::single_hospital_json(capacity).to_string();
    let catalog = ScheduleCatalog::from_json_str(&raw, Some(DayOfWeek::Friday)).unwrap();
    Arc::new(AppointmentState::new(
        Arc::new(config),
        Arc::new(catalog),
        Arc::new(InMemoryLedger::new()),
        // Monday
        Arc::new(FixedClock(date(2025, 9, 1))),
    ))
}

fn state() -> Arc<AppointmentState> {
    state_with(TestConfig::default().to_app_config())
}

fn patient() -> PatientDetails {
    serde_json::from_value(TestPatients::patient_json("Test Patient")).unwrap()
}

#[tokio::test]
async fn week_summary_reflects_schedule_and_bookings() {
    let state = state();
    BookingService::new(&state)
        .attempt_booking("testcare", date(2025, 9, 1), "17:00", patient())
        .await
        .unwrap();

    let calendar = CalendarService::new(&state)
        .build_calendar("testcare", date(2025, 9, 1), 7)
        .await
        .unwrap();

    assert_eq!(calendar.len(), 7);
    let names: Vec<&str> = calendar.iter().map(|d| d.day_name.as_str()).collect();
    assert_eq!(names, vec!["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"]);

    let monday = &calendar[0];
    assert!(!monday.is_past && !monday.is_closed && monday.is_bookable);
    assert_eq!(monday.total_slots, 2);
    assert_eq!(monday.total_capacity, 4);
    assert_eq!(monday.used_capacity, 1);
    assert_eq!(monday.available_capacity, 3);

    let wednesday = &calendar[2];
    assert_eq!(wednesday.total_slots, 2);
    assert_eq!(wednesday.used_capacity, 0);

    let friday = &calendar[4];
    assert!(friday.is_closed && !friday.is_bookable);
    assert_eq!(friday.closed_reason.as_deref(), Some("TestCare Hospital is closed on Fridays"));

    assert!(calendar[1].is_closed);
    assert_eq!(calendar[1].total_capacity, 0);
}

#[tokio::test]
async fn past_days_and_window_edge() {
    let state = state();
    let calendar = CalendarService::new(&state)
        .build_calendar("testcare", date(2025, 8, 31), 2)
        .await
        .unwrap();

    assert!(calendar[0].is_past);
    assert!(!calendar[1].is_past, "today is not past");

    // The advance window is 30 days: 2025-09-29 (Monday) is inside, 2025-10-06 is not.
    let later = CalendarService::new(&state)
        .build_calendar("testcare", date(2025, 9, 29), 8)
        .await
        .unwrap();
    assert!(later[0].is_bookable);
    assert!(!later[7].is_bookable);
    assert!(!later[7].is_closed);
}

#[tokio::test]
async fn zero_days_and_unknown_hospital() {
    let state = state();
    let service = CalendarService::new(&state);

    assert!(service.build_calendar("testcare", date(2025, 9, 1), 0).await.unwrap().is_empty());
    assert_matches!(
        service.build_calendar("nowhere", date(2025, 9, 1), 7).await,
        Err(BookingError::HospitalNotFound(_))
    );
}

#[tokio::test]
async fn cached_calendar_is_invalidated_by_bookings_and_cancellations() {
    let state = state_with(AppConfig {
        availability_cache_ttl_secs: 300,
        ..TestConfig::default().to_app_config()
    });
    let calendar = CalendarService::new(&state);
    let booking = BookingService::new(&state);

    let before = calendar.build_calendar("testcare", date(2025, 9, 1), 3).await.unwrap();
    assert_eq!(before[0].used_capacity, 0);

    let receipt = booking
        .attempt_booking("testcare", date(2025, 9, 1), "18:00", patient())
        .await
        .unwrap();

    let after = calendar.build_calendar("testcare", date(2025, 9, 1), 3).await.unwrap();
    assert_eq!(after[0].used_capacity, 1);

    booking.cancel_appointment(receipt.booking.id).await.unwrap();
    let released = calendar.build_calendar("testcare", date(2025, 9, 1), 3).await.unwrap();
    assert_eq!(released[0].used_capacity, 0);
}

#[tokio::test]
async fn huge_capacity_saturates_day_totals() {
    let state = state_with_capacity(TestConfig::default().to_app_config(), u32::MAX);
    BookingService::new(&state)
        .attempt_booking("testcare", date(2025, 9, 1), "17:00", patient())
        .await
        .unwrap();

    let calendar = CalendarService::new(&state)
        .build_calendar("testcare", date(2025, 9, 1), 1)
        .await
        .unwrap();

    let monday = &calendar[0];
    assert_eq!(monday.total_slots, 2);
    assert_eq!(monday.total_capacity, u32::MAX);
    assert_eq!(monday.used_capacity, 1);
    assert_eq!(monday.available_capacity, u32::MAX - 1);
}

#[tokio::test]
async fn unreachable_shared_cache_falls_back_to_live_counts() {
    let state = state_with(AppConfig {
        availability_cache_ttl_secs: 300,
        redis_url: Some("redis://127.0.0.1:1".to_string()),
        ..TestConfig::default().to_app_config()
    });
    assert!(state.cache.is_shared());

    let calendar = CalendarService::new(&state);
    let before = calendar.build_calendar("testcare", date(2025, 9, 1), 1).await.unwrap();
    assert_eq!(before[0].used_capacity, 0);

    BookingService::new(&state)
        .attempt_booking("testcare", date(2025, 9, 1), "18:00", patient())
        .await
        .unwrap();

    let after = calendar.build_calendar("testcare", date(2025, 9, 1), 1).await.unwrap();
    assert_eq!(after[0].used_capacity, 1);
}
