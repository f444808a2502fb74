use axum::{routing::get, Router};

use appointment_cell::handlers::AppointmentState;
use appointment_cell::router::appointment_routes;
use schedule_cell::handlers::ScheduleState;
use schedule_cell::router::schedule_routes;

pub fn create_router(schedule_state: ScheduleState, appointment_state: AppointmentState) -> Router {
    Router::new()
        .route("/", get(|| async { "Meridian Clinic API is running!" }))
        .nest("/schedules", schedule_routes(schedule_state))
        .nest("/appointments", appointment_routes(appointment_state))
}
