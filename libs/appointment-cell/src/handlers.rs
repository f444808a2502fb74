// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use uuid::Uuid;

use schedule_cell::store::ScheduleStore;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::clock::ClinicClock;

use crate::models::{
    AppointmentError, AppointmentSearchQuery, EditAppointmentRequest, ReserveBlockRequest,
    ReserveSlotRequest, UpdateStatusRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::booking::BookingService;
use crate::services::lifecycle::LifecycleService;
use crate::store::{AppointmentStore, Directory};

/// Shared state for the appointment cell. The booking engine reads the
/// schedule registry through the same store seam the schedule cell writes.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub directory: Arc<dyn Directory>,
    pub clock: ClinicClock,
}

impl AppointmentState {
    pub fn booking(&self) -> BookingService {
        BookingService::new(
            Arc::clone(&self.schedules),
            Arc::clone(&self.appointments),
            Arc::clone(&self.directory),
            self.clock.clone(),
        )
    }

    pub fn availability(&self) -> AvailabilityService {
        AvailabilityService::new(
            Arc::clone(&self.schedules),
            Arc::clone(&self.appointments),
            self.clock.clone(),
        )
    }

    pub fn lifecycle(&self) -> LifecycleService {
        LifecycleService::new(Arc::clone(&self.appointments), self.clock.clone())
    }
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match &e {
        AppointmentError::NotFound
        | AppointmentError::DoctorNotFound
        | AppointmentError::PatientNotFound => AppError::NotFound(e.to_string()),

        AppointmentError::NotLinked | AppointmentError::Unauthorized => {
            AppError::Forbidden(e.to_string())
        }

        AppointmentError::InvalidTime(_)
        | AppointmentError::NoSchedule(_)
        | AppointmentError::OutsideShift { .. }
        | AppointmentError::InvalidTransition { .. }
        | AppointmentError::NotEditable(_)
        | AppointmentError::NotDeletable(_) => AppError::BadRequest(e.to_string()),

        AppointmentError::Occupied(_) | AppointmentError::StaleUpdate => {
            AppError::Conflict(e.to_string())
        }

        AppointmentError::Database(msg) => AppError::Database(msg.clone()),
    }
}

#[axum::debug_handler]
pub async fn reserve_slot(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<ReserveSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking()
        .reserve_slot(&user, request)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn reserve_block(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<ReserveBlockRequest>,
) -> Result<Json<Value>, AppError> {
    let appointments = state
        .booking()
        .reserve_block(&user, request)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointments": appointments,
        "message": "Block reserved successfully"
    })))
}

#[axum::debug_handler]
pub async fn available_slots(
    State(state): State<AppointmentState>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .availability()
        .available_slots(doctor_id, date)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "doctor_id": doctor_id,
        "date": date,
        "available_slots": slots
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking()
        .get_appointment(&user, appointment_id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<AppointmentState>,
    Query(query): Query<AppointmentSearchQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointments = state
        .booking()
        .search_appointments(&user, query)
        .await
        .map_err(map_appointment_error)?;

    let count = appointments.len();
    Ok(Json(json!({
        "success": true,
        "appointments": appointments,
        "count": count
    })))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .lifecycle()
        .update_status(&user, appointment_id, request.status)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Status updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn edit_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<EditAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking()
        .edit_appointment(&user, appointment_id, request)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    state
        .booking()
        .delete_appointment(&user, appointment_id)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted"
    })))
}
