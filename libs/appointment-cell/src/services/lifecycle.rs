// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chrono::Timelike;
use shared_models::auth::{Role, User};
use shared_utils::clock::ClinicClock;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::store::AppointmentStore;

/// Enforces the appointment status state machine per actor role and commits
/// transitions under an optimistic guard, so two actors racing on the same
/// appointment cannot silently overwrite each other.
pub struct LifecycleService {
    appointments: Arc<dyn AppointmentStore>,
    clock: ClinicClock,
}

impl LifecycleService {
    pub fn new(appointments: Arc<dyn AppointmentStore>, clock: ClinicClock) -> Self {
        Self { appointments, clock }
    }

    /// The statuses `role` may move an appointment to from `current`.
    /// Terminal statuses admit nothing; admins transition nothing (their
    /// surface is administrative deletion, not the state machine).
    pub fn valid_transitions(role: Role, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match (role, current) {
            (Role::Doctor, AppointmentStatus::Pending) => {
                vec![AppointmentStatus::Approved, AppointmentStatus::Rejected]
            }
            (Role::Doctor, AppointmentStatus::Approved) => {
                vec![AppointmentStatus::Completed, AppointmentStatus::Cancelled]
            }
            (Role::Patient, AppointmentStatus::Pending) => vec![AppointmentStatus::Cancelled],
            _ => vec![],
        }
    }

    pub async fn update_status(
        &self,
        requester: &User,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {} to {}", appointment_id, new_status);

        let current = self
            .appointments
            .find(appointment_id)
            .await
            .map_err(AppointmentError::from)?
            .ok_or(AppointmentError::NotFound)?;

        match requester.role {
            Some(Role::Patient) => {
                if !requester.is_same_account(current.patient_id) {
                    return Err(AppointmentError::Unauthorized);
                }
                // Patients may only cancel; anything else is an
                // authorization failure, not a transition error.
                if new_status != AppointmentStatus::Cancelled {
                    return Err(AppointmentError::Unauthorized);
                }
                if !Self::valid_transitions(Role::Patient, current.status).contains(&new_status) {
                    return Err(AppointmentError::InvalidTransition {
                        from: current.status,
                        to: new_status,
                    });
                }
            }
            Some(Role::Doctor) => {
                if !requester.is_same_account(current.doctor_id) {
                    return Err(AppointmentError::Unauthorized);
                }
                if !Self::valid_transitions(Role::Doctor, current.status).contains(&new_status) {
                    warn!("Invalid status transition attempted: {} -> {}", current.status, new_status);
                    return Err(AppointmentError::InvalidTransition {
                        from: current.status,
                        to: new_status,
                    });
                }
            }
            _ => return Err(AppointmentError::Unauthorized),
        }

        let now = self.clock.now_utc();
        let now = now.with_nanosecond(0).unwrap_or(now);

        let updated = self
            .appointments
            .update_status(appointment_id, current.updated_at, new_status, now)
            .await
            .map_err(AppointmentError::from)?;

        info!("Appointment {} moved from {} to {}", appointment_id, current.status, updated.status);
        Ok(updated)
    }
}
