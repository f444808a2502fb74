use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use appointment_cell::services::availability::AvailabilityService;
use appointment_cell::services::booking::BookingService;
use appointment_cell::services::lifecycle::LifecycleService;
use appointment_cell::store::{MemoryAppointmentStore, MemoryDirectory};
use schedule_cell::models::{DoctorSchedule, Shift};
use schedule_cell::store::{MemoryScheduleStore, ScheduleStore};
use shared_models::auth::{Role, User};
use shared_utils::clock::{ClinicClock, FixedClock};

pub fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

pub fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn user(id: Uuid, role: Role) -> User {
    User {
        id: id.to_string(),
        email: None,
        role: Some(role),
        created_at: None,
    }
}

/// In-memory environment with one linked doctor/patient pair and a clock
/// pinned to 2025-11-10 09:00 in the clinic zone (UTC).
pub struct TestEnv {
    pub schedules: Arc<MemoryScheduleStore>,
    pub appointments: Arc<MemoryAppointmentStore>,
    pub directory: Arc<MemoryDirectory>,
    pub fixed: Arc<FixedClock>,
    pub clock: ClinicClock,
    pub doctor: Uuid,
    pub patient: Uuid,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_offset(0).await
    }

    pub async fn with_offset(clinic_utc_offset_minutes: i32) -> Self {
        let fixed = Arc::new(FixedClock::new(utc("2025-11-10T09:00:00Z")));
        let clock = ClinicClock::new(fixed.clone(), clinic_utc_offset_minutes);

        let directory = Arc::new(MemoryDirectory::new());
        let doctor = Uuid::new_v4();
        let patient = Uuid::new_v4();
        directory.add_doctor(doctor).await;
        directory.add_patient(patient).await;
        directory.link(doctor, patient).await;

        Self {
            schedules: Arc::new(MemoryScheduleStore::new()),
            appointments: Arc::new(MemoryAppointmentStore::new()),
            directory,
            fixed,
            clock,
            doctor,
            patient,
        }
    }

    pub fn booking(&self) -> BookingService {
        BookingService::new(
            self.schedules.clone(),
            self.appointments.clone(),
            self.directory.clone(),
            self.clock.clone(),
        )
    }

    pub fn availability(&self) -> AvailabilityService {
        AvailabilityService::new(self.schedules.clone(), self.appointments.clone(), self.clock.clone())
    }

    pub fn lifecycle(&self) -> LifecycleService {
        LifecycleService::new(self.appointments.clone(), self.clock.clone())
    }

    pub fn doctor_user(&self) -> User {
        user(self.doctor, Role::Doctor)
    }

    pub fn patient_user(&self) -> User {
        user(self.patient, Role::Patient)
    }

    pub fn admin_user(&self) -> User {
        user(Uuid::new_v4(), Role::Admin)
    }

    /// Registers a second patient linked to the same doctor.
    pub async fn linked_patient(&self) -> Uuid {
        let other = Uuid::new_v4();
        self.directory.add_patient(other).await;
        self.directory.link(self.doctor, other).await;
        other
    }

    pub async fn add_schedule(&self, on: &str, shift: Shift) -> DoctorSchedule {
        self.add_schedule_for(self.doctor, on, shift).await
    }

    pub async fn add_schedule_for(&self, doctor_id: Uuid, on: &str, shift: Shift) -> DoctorSchedule {
        let now = self.clock.now_utc();
        self.schedules
            .insert(DoctorSchedule {
                id: Uuid::new_v4(),
                doctor_id,
                date: date(on),
                shift,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }
}
