use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, availability_routes, calendar_routes};
use appointment_cell::AppointmentState;
use schedule_cell::router::schedule_routes;

pub fn create_router(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/schedules", schedule_routes(state.catalog.clone()))
        .nest("/availability", availability_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/calendar", calendar_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use schedule_cell::{DayOfWeek, ScheduleCatalog};
    use shared_utils::test_utils::TestConfig;
    use tower::ServiceExt;

    fn app() -> Router {
        let catalog = ScheduleCatalog::builtin(Some(DayOfWeek::Friday)).unwrap();
        let state = AppointmentState::from_config(TestConfig::default().to_arc(), Arc::new(catalog));
        create_router(Arc::new(state))
    }

    async fn status_of(uri: &str) -> StatusCode {
        app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn root_reports_running() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Clinic booking API is running!");
    }

    #[tokio::test]
    async fn every_cell_is_mounted() {
        assert_eq!(status_of("/schedules").await, StatusCode::OK);
        assert_eq!(status_of("/schedules/gomoti/days").await, StatusCode::OK);
        assert_eq!(status_of("/availability/gomoti/2030-01-07/17:00").await, StatusCode::OK);
        assert_eq!(status_of("/appointments").await, StatusCode::OK);
        assert_eq!(status_of("/calendar/moon?days=3").await, StatusCode::OK);
    }
}
