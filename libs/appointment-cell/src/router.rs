// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::handlers;
use crate::state::AppointmentState;

pub fn availability_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/bulk", post(handlers::bulk_availability))
        .route("/{hospital_id}/{date}", get(handlers::day_availability))
        .route("/{hospital_id}/{date}/{time_slot}", get(handlers::check_slot_availability))
        .with_state(state)
}

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", post(handlers::book_appointment).get(handlers::list_appointments))
        .route("/stats/overview", get(handlers::appointment_stats))
        .route("/track/{reference}", get(handlers::track_appointment))
        .route("/{appointment_id}", get(handlers::get_appointment).put(handlers::update_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .with_state(state)
}

pub fn calendar_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/{hospital_id}", get(handlers::get_calendar))
        .with_state(state)
}
