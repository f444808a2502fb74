// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::clock::ClinicClock;

use crate::models::{CreateScheduleRequest, ScheduleError, ScheduleListQuery, UpdateShiftRequest};
use crate::services::registry::ScheduleRegistryService;
use crate::store::ScheduleStore;

/// Shared state for the schedule cell: configuration plus the store and
/// clock the registry service runs against.
#[derive(Clone)]
pub struct ScheduleState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ScheduleStore>,
    pub clock: ClinicClock,
}

impl ScheduleState {
    pub fn registry(&self) -> ScheduleRegistryService {
        ScheduleRegistryService::new(Arc::clone(&self.store), self.clock.clone())
    }
}

fn map_schedule_error(e: ScheduleError) -> AppError {
    match e {
        ScheduleError::NotFound => AppError::NotFound("Schedule not found".to_string()),
        ScheduleError::DuplicateSchedule(date) => {
            AppError::Conflict(format!("Doctor already has a shift on {}", date))
        }
        ScheduleError::PastDate(date) => {
            AppError::BadRequest(format!("Cannot assign a shift on a past date: {}", date))
        }
        ScheduleError::Database(msg) => AppError::Database(msg),
    }
}

fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only admins can manage schedules".to_string()))
    }
}

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<ScheduleState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let schedule = state
        .registry()
        .create_schedule(request)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule,
        "message": "Schedule created successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<ScheduleState>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let schedule = state
        .registry()
        .get_schedule(doctor_id, date)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

#[axum::debug_handler]
pub async fn list_schedules(
    State(state): State<ScheduleState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ScheduleListQuery>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let schedules = state
        .registry()
        .list_schedules(doctor_id, query.from_date, query.to_date)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedules": schedules
    })))
}

#[axum::debug_handler]
pub async fn update_shift(
    State(state): State<ScheduleState>,
    Path(schedule_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateShiftRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let schedule = state
        .registry()
        .update_shift(schedule_id, request.shift)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule,
        "message": "Shift updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    State(state): State<ScheduleState>,
    Path(schedule_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    state
        .registry()
        .delete_schedule(schedule_id)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Schedule deleted"
    })))
}
