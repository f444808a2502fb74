// libs/schedule-cell/src/services/registry.rs
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_utils::clock::ClinicClock;

use crate::models::{CreateScheduleRequest, DoctorSchedule, ScheduleError, Shift};
use crate::store::{ScheduleStore, ScheduleStoreError};

/// Admin-facing registry of shift assignments. One shift per doctor per
/// calendar date; the store's uniqueness constraint backs that invariant.
pub struct ScheduleRegistryService {
    store: Arc<dyn ScheduleStore>,
    clock: ClinicClock,
}

impl ScheduleRegistryService {
    pub fn new(store: Arc<dyn ScheduleStore>, clock: ClinicClock) -> Self {
        Self { store, clock }
    }

    pub async fn create_schedule(
        &self,
        request: CreateScheduleRequest,
    ) -> Result<DoctorSchedule, ScheduleError> {
        debug!("Creating {} schedule for doctor {} on {}",
               request.shift, request.doctor_id, request.date);

        if request.date < self.clock.today() {
            return Err(ScheduleError::PastDate(request.date));
        }

        let now = self.clock.now_utc();
        let schedule = DoctorSchedule {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            date: request.date,
            shift: request.shift,
            created_at: now,
            updated_at: now,
        };

        let created = self.store.insert(schedule).await.map_err(|e| match e {
            ScheduleStoreError::Duplicate => {
                warn!("Doctor {} already has a shift on {}", request.doctor_id, request.date);
                ScheduleError::DuplicateSchedule(request.date)
            }
            ScheduleStoreError::Backend(msg) => ScheduleError::Database(msg),
        })?;

        info!("Schedule {} created for doctor {} on {}", created.id, created.doctor_id, created.date);
        Ok(created)
    }

    pub async fn get_schedule(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<DoctorSchedule, ScheduleError> {
        self.store
            .find(doctor_id, date)
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?
            .ok_or(ScheduleError::NotFound)
    }

    /// Replaces the shift value only. Appointments already booked against
    /// the previous shift's slots are left untouched; occupancy stays
    /// derived from appointment status alone.
    pub async fn update_shift(
        &self,
        schedule_id: Uuid,
        new_shift: Shift,
    ) -> Result<DoctorSchedule, ScheduleError> {
        debug!("Updating schedule {} to {} shift", schedule_id, new_shift);

        self.store
            .set_shift(schedule_id, new_shift, self.clock.now_utc())
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?
            .ok_or(ScheduleError::NotFound)
    }

    /// Unconditional removal. Does not cascade to appointments.
    pub async fn delete_schedule(&self, schedule_id: Uuid) -> Result<(), ScheduleError> {
        debug!("Deleting schedule {}", schedule_id);

        let deleted = self
            .store
            .delete(schedule_id)
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;

        if !deleted {
            return Err(ScheduleError::NotFound);
        }

        info!("Schedule {} deleted", schedule_id);
        Ok(())
    }

    pub async fn list_schedules(
        &self,
        doctor_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DoctorSchedule>, ScheduleError> {
        self.store
            .list_for_doctor(doctor_id, from, to)
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))
    }
}
