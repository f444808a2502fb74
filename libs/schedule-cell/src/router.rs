// libs/schedule-cell/src/router.rs
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, ScheduleState};

pub fn schedule_routes(state: ScheduleState) -> Router {
    // All schedule operations require authentication; writes are admin-only
    // (enforced in the handlers).
    let protected_routes = Router::new()
        .route("/", post(handlers::create_schedule))
        .route("/doctors/{doctor_id}", get(handlers::list_schedules))
        .route("/doctors/{doctor_id}/{date}", get(handlers::get_schedule))
        .route("/{schedule_id}", patch(handlers::update_shift))
        .route("/{schedule_id}", delete(handlers::delete_schedule))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
