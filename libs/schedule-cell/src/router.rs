// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers;
use crate::services::catalog::ScheduleCatalog;

pub fn schedule_routes(catalog: Arc<ScheduleCatalog>) -> Router {
    Router::new()
        .route("/", get(handlers::list_schedules))
        .route("/{hospital_id}", get(handlers::get_schedule))
        .route("/{hospital_id}/days", get(handlers::get_operating_days))
        .route("/{hospital_id}/day/{day_number}/slots", get(handlers::get_day_slots))
        .route("/{hospital_id}/preview/{date}", get(handlers::preview_slots))
        .with_state(catalog)
}
