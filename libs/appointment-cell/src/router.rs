// libs/appointment-cell/src/router.rs
use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: AppointmentState) -> Router {
    // All appointment operations require authentication.
    let protected_routes = Router::new()
        .route("/", post(handlers::reserve_slot))
        .route("/block", post(handlers::reserve_block))
        .route("/search", get(handlers::search_appointments))
        .route("/availability/{doctor_id}/{date}", get(handlers::available_slots))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}", put(handlers::edit_appointment))
        .route("/{appointment_id}", delete(handlers::delete_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_status))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
