// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use schedule_cell::models::{TimeSlot, SLOTS_PER_SHIFT};
use schedule_cell::store::ScheduleStore;
use shared_models::auth::{Role, User};
use shared_utils::clock::ClinicClock;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    EditAppointmentRequest, ReserveBlockRequest, ReserveSlotRequest, BOOKING_LEAD_TIME_MINUTES,
};
use crate::store::{AppointmentChanges, AppointmentStore, Directory};

/// Validates booking requests and commits reservations. Every path ends in
/// a single atomic store write, so a request that raced another caller for
/// the same slot loses with `Occupied` instead of double-booking.
pub struct BookingService {
    schedules: Arc<dyn ScheduleStore>,
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn Directory>,
    clock: ClinicClock,
}

impl BookingService {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        appointments: Arc<dyn AppointmentStore>,
        directory: Arc<dyn Directory>,
        clock: ClinicClock,
    ) -> Self {
        Self { schedules, appointments, directory, clock }
    }

    /// Reserve one slot. A patient books for themself (initial status
    /// `Pending`); a doctor books one of their own slots for a patient,
    /// which is self-authorizing and starts `Approved`.
    pub async fn reserve_slot(
        &self,
        requester: &User,
        request: ReserveSlotRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!("Reserving {} on {} for patient {} with doctor {}",
              request.time_slot, request.date, request.patient_id, request.doctor_id);

        let initial_status = self.authorize_single_booking(requester, &request)?;

        self.verify_participants(request.doctor_id, request.patient_id).await?;
        self.validate_calendar_position(request.doctor_id, request.date, request.time_slot)
            .await?;

        let now = self.rounded_now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            date: request.date,
            time_slot: request.time_slot,
            status: initial_status,
            reason: request.reason,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .appointments
            .insert_if_vacant(appointment)
            .await
            .map_err(AppointmentError::from)?;

        info!("Appointment {} reserved with status {}", created.id, created.status);
        Ok(created)
    }

    /// Reserve a run of consecutive slots as one logical procedure booking.
    /// Doctor- or admin-initiated, always `Approved`; either every slot
    /// commits or none do.
    pub async fn reserve_block(
        &self,
        requester: &User,
        request: ReserveBlockRequest,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        info!("Reserving block of {} slots from {} on {} for patient {} with doctor {}",
              request.slot_count, request.start_slot, request.date,
              request.patient_id, request.doctor_id);

        match requester.role {
            Some(Role::Admin) => {}
            Some(Role::Doctor) if requester.is_same_account(request.doctor_id) => {}
            _ => return Err(AppointmentError::Unauthorized),
        }

        if request.slot_count == 0 || request.slot_count > SLOTS_PER_SHIFT {
            return Err(AppointmentError::InvalidTime(format!(
                "Block must cover between 1 and {} slots",
                SLOTS_PER_SHIFT
            )));
        }

        let slots = derive_block_slots(request.start_slot, request.slot_count)?;

        self.verify_participants(request.doctor_id, request.patient_id).await?;

        // Lead-time and past-date checks against the earliest slot; the
        // rest of the block only starts later.
        self.validate_booking_window(request.date, slots[0])?;

        let schedule = self
            .schedules
            .find(request.doctor_id, request.date)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?
            .ok_or(AppointmentError::NoSchedule(request.date))?;

        let outside: Vec<TimeSlot> = slots
            .iter()
            .copied()
            .filter(|slot| !schedule.shift.contains(*slot))
            .collect();
        if !outside.is_empty() {
            warn!("Block request has {} slots outside the {} shift", outside.len(), schedule.shift);
            return Err(AppointmentError::OutsideShift { shift: schedule.shift, slots: outside });
        }

        let now = self.rounded_now();
        let rows: Vec<Appointment> = slots
            .iter()
            .map(|slot| Appointment {
                id: Uuid::new_v4(),
                doctor_id: request.doctor_id,
                patient_id: request.patient_id,
                date: request.date,
                time_slot: *slot,
                status: AppointmentStatus::Approved,
                reason: Some(request.reason.clone()),
                notes: request.notes.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        let created = self
            .appointments
            .insert_block_if_vacant(rows)
            .await
            .map_err(AppointmentError::from)?;

        info!("Block of {} appointments reserved for patient {}", created.len(), request.patient_id);
        Ok(created)
    }

    /// Edit details of a pending appointment. A changed calendar position
    /// goes through the same validation as a fresh reservation and commits
    /// under the optimistic guard.
    pub async fn edit_appointment(
        &self,
        requester: &User,
        appointment_id: Uuid,
        request: EditAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Editing appointment {}", appointment_id);

        let current = self.fetch(appointment_id).await?;
        self.authorize_owner_or_admin(requester, &current)?;

        if current.status != AppointmentStatus::Pending {
            return Err(AppointmentError::NotEditable(current.status));
        }

        let new_date = request.date.unwrap_or(current.date);
        let new_slot = request.time_slot.unwrap_or(current.time_slot);
        let position_changed = new_date != current.date || new_slot != current.time_slot;

        if position_changed {
            self.validate_calendar_position(current.doctor_id, new_date, new_slot).await?;
        }

        let changes = AppointmentChanges {
            date: new_date,
            time_slot: new_slot,
            reason: request.reason.or(current.reason),
            notes: request.notes.or(current.notes),
        };

        let updated = self
            .appointments
            .reschedule_if_vacant(appointment_id, current.updated_at, changes, self.rounded_now())
            .await
            .map_err(AppointmentError::from)?;

        info!("Appointment {} updated", appointment_id);
        Ok(updated)
    }

    /// Remove a pending appointment entirely. Own patient or admin only.
    pub async fn delete_appointment(
        &self,
        requester: &User,
        appointment_id: Uuid,
    ) -> Result<(), AppointmentError> {
        debug!("Deleting appointment {}", appointment_id);

        let current = self.fetch(appointment_id).await?;
        self.authorize_owner_or_admin(requester, &current)?;

        if current.status != AppointmentStatus::Pending {
            return Err(AppointmentError::NotDeletable(current.status));
        }

        let deleted = self
            .appointments
            .delete_if_pending(appointment_id)
            .await
            .map_err(AppointmentError::from)?;

        if !deleted {
            // Lost a race: the row was approved or removed since we read it.
            return match self.appointments.find(appointment_id).await.map_err(AppointmentError::from)? {
                Some(row) => Err(AppointmentError::NotDeletable(row.status)),
                None => Err(AppointmentError::NotFound),
            };
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    pub async fn get_appointment(
        &self,
        requester: &User,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch(appointment_id).await?;

        let involved = requester.is_same_account(appointment.patient_id)
            || requester.is_same_account(appointment.doctor_id);
        if !requester.is_admin() && !involved {
            return Err(AppointmentError::Unauthorized);
        }

        Ok(appointment)
    }

    /// Filtered listing. Non-admin callers are scoped to their own records
    /// regardless of the filters they pass.
    pub async fn search_appointments(
        &self,
        requester: &User,
        mut query: AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        match requester.role {
            Some(Role::Admin) => {}
            Some(Role::Doctor) => {
                query.doctor_id = Some(requester.uuid().ok_or(AppointmentError::Unauthorized)?);
            }
            Some(Role::Patient) => {
                query.patient_id = Some(requester.uuid().ok_or(AppointmentError::Unauthorized)?);
            }
            None => return Err(AppointmentError::Unauthorized),
        }

        self.appointments.search(&query).await.map_err(AppointmentError::from)
    }

    // ==============================================================================
    // PRIVATE HELPERS
    // ==============================================================================

    async fn fetch(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .find(appointment_id)
            .await
            .map_err(AppointmentError::from)?
            .ok_or(AppointmentError::NotFound)
    }

    fn authorize_single_booking(
        &self,
        requester: &User,
        request: &ReserveSlotRequest,
    ) -> Result<AppointmentStatus, AppointmentError> {
        match requester.role {
            Some(Role::Patient) if requester.is_same_account(request.patient_id) => {
                Ok(AppointmentStatus::Pending)
            }
            Some(Role::Doctor) if requester.is_same_account(request.doctor_id) => {
                Ok(AppointmentStatus::Approved)
            }
            _ => Err(AppointmentError::Unauthorized),
        }
    }

    fn authorize_owner_or_admin(
        &self,
        requester: &User,
        appointment: &Appointment,
    ) -> Result<(), AppointmentError> {
        if requester.is_admin() || requester.is_same_account(appointment.patient_id) {
            Ok(())
        } else {
            Err(AppointmentError::Unauthorized)
        }
    }

    async fn verify_participants(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
    ) -> Result<(), AppointmentError> {
        if !self
            .directory
            .is_active_user(doctor_id, Role::Doctor)
            .await
            .map_err(AppointmentError::from)?
        {
            return Err(AppointmentError::DoctorNotFound);
        }

        if !self
            .directory
            .is_active_user(patient_id, Role::Patient)
            .await
            .map_err(AppointmentError::from)?
        {
            return Err(AppointmentError::PatientNotFound);
        }

        if !self
            .directory
            .link_exists(doctor_id, patient_id)
            .await
            .map_err(AppointmentError::from)?
        {
            warn!("Patient {} is not assigned to doctor {}", patient_id, doctor_id);
            return Err(AppointmentError::NotLinked);
        }

        Ok(())
    }

    /// Date-level and lead-time checks in the clinic's zone.
    fn validate_booking_window(
        &self,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> Result<(), AppointmentError> {
        let today = self.clock.today();

        if date < today {
            return Err(AppointmentError::InvalidTime(format!(
                "Cannot book an appointment on a past date: {}",
                date
            )));
        }

        if date == today {
            let now = self.clock.now_local().time();
            let cutoff = (now.hour() * 60 + now.minute()) as i64 + BOOKING_LEAD_TIME_MINUTES;
            if slot.minutes_from_midnight() as i64 <= cutoff {
                return Err(AppointmentError::InvalidTime(format!(
                    "Slot {} starts within the {}-minute booking lead time",
                    slot, BOOKING_LEAD_TIME_MINUTES
                )));
            }
        }

        Ok(())
    }

    /// Full calendar validation for one slot: booking window, schedule
    /// existence, shift membership. Occupancy is left to the atomic write.
    async fn validate_calendar_position(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> Result<(), AppointmentError> {
        self.validate_booking_window(date, slot)?;

        let schedule = self
            .schedules
            .find(doctor_id, date)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?
            .ok_or(AppointmentError::NoSchedule(date))?;

        if !schedule.shift.contains(slot) {
            return Err(AppointmentError::OutsideShift {
                shift: schedule.shift,
                slots: vec![slot],
            });
        }

        Ok(())
    }

    /// Second-precision timestamps; the database echoes them back without
    /// losing the value the optimistic guard compares against.
    fn rounded_now(&self) -> DateTime<Utc> {
        let now = self.clock.now_utc();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// The requested run of consecutive slots, stepping +30 minutes at a time.
/// A block that would roll past midnight is a caller error, not a truncation.
fn derive_block_slots(start: TimeSlot, count: usize) -> Result<Vec<TimeSlot>, AppointmentError> {
    let mut slots = Vec::with_capacity(count);
    let mut current = start;
    for _ in 0..count {
        slots.push(current);
        if slots.len() == count {
            break;
        }
        current = current.succ().ok_or_else(|| {
            AppointmentError::InvalidTime("Block would cross midnight".to_string())
        })?;
    }
    Ok(slots)
}
