// libs/appointment-cell/src/services/availability.rs
use chrono::{NaiveDate, Timelike};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use schedule_cell::models::TimeSlot;
use schedule_cell::store::ScheduleStore;
use shared_utils::clock::ClinicClock;

use crate::models::{AppointmentError, BOOKING_LEAD_TIME_MINUTES};
use crate::store::AppointmentStore;

/// Computes what is currently bookable for a doctor on a date. Advisory
/// only: the answer is stale the moment it is produced, and the reservation
/// engine re-validates occupancy at write time.
pub struct AvailabilityService {
    schedules: Arc<dyn ScheduleStore>,
    appointments: Arc<dyn AppointmentStore>,
    clock: ClinicClock,
}

impl AvailabilityService {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: ClinicClock,
    ) -> Self {
        Self { schedules, appointments, clock }
    }

    /// Bookable slots in ascending order. Empty when the doctor has no
    /// shift that day. Same-day queries also drop slots starting within
    /// the lead-time buffer.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, AppointmentError> {
        let schedule = match self
            .schedules
            .find(doctor_id, date)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?
        {
            Some(schedule) => schedule,
            None => {
                debug!("No schedule for doctor {} on {}", doctor_id, date);
                return Ok(vec![]);
            }
        };

        let occupied: HashSet<TimeSlot> = self
            .appointments
            .active_slots(doctor_id, date)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?
            .into_iter()
            .collect();

        let mut slots: Vec<TimeSlot> = schedule
            .shift
            .slots()
            .into_iter()
            .filter(|slot| !occupied.contains(slot))
            .collect();

        if date == self.clock.today() {
            let now = self.clock.now_local().time();
            let cutoff = (now.hour() * 60 + now.minute()) as i64 + BOOKING_LEAD_TIME_MINUTES;
            slots.retain(|slot| slot.minutes_from_midnight() as i64 > cutoff);
        }

        Ok(slots)
    }
}
