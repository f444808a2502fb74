// libs/appointment-cell/src/store.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use schedule_cell::models::TimeSlot;
use shared_database::postgrest::{return_representation, DbError, PostgrestClient};
use shared_models::auth::Role;

use crate::models::{Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus};

#[derive(Debug, thiserror::Error)]
pub enum AppointmentStoreError {
    /// The requested calendar positions are held by active appointments.
    #[error("slots occupied: {0:?}")]
    Occupied(Vec<TimeSlot>),

    #[error("appointment not found")]
    NotFound,

    /// The optimistic guard did not match; the row changed underneath us.
    #[error("stale write")]
    Stale,

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<AppointmentStoreError> for AppointmentError {
    fn from(e: AppointmentStoreError) -> Self {
        match e {
            AppointmentStoreError::Occupied(slots) => AppointmentError::Occupied(slots),
            AppointmentStoreError::NotFound => AppointmentError::NotFound,
            AppointmentStoreError::Stale => AppointmentError::StaleUpdate,
            AppointmentStoreError::Backend(msg) => AppointmentError::Database(msg),
        }
    }
}

/// Resolved detail changes applied to a pending appointment in one guarded
/// write.
#[derive(Debug, Clone)]
pub struct AppointmentChanges {
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Persistence seam for appointment rows. Implementations must make the
/// occupancy check and the write a single atomic step: two concurrent
/// reservations of the same `(doctor_id, date, time_slot)` can never both
/// succeed, and a block insert commits all rows or none.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert_if_vacant(
        &self,
        appointment: Appointment,
    ) -> Result<Appointment, AppointmentStoreError>;

    async fn insert_block_if_vacant(
        &self,
        appointments: Vec<Appointment>,
    ) -> Result<Vec<Appointment>, AppointmentStoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentStoreError>;

    /// Slots on `(doctor_id, date)` held by appointments in an active
    /// status, ascending.
    async fn active_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, AppointmentStoreError>;

    /// Status write guarded by the previously observed `updated_at`; a
    /// mismatch means another actor won the race.
    async fn update_status(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentStoreError>;

    /// Guarded detail update. Moving to an occupied calendar position fails
    /// with `Occupied` and leaves the row untouched.
    async fn reschedule_if_vacant(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        changes: AppointmentChanges,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentStoreError>;

    /// Deletes the row only while it is still pending. Returns whether a
    /// row was removed.
    async fn delete_if_pending(&self, id: Uuid) -> Result<bool, AppointmentStoreError>;

    async fn search(
        &self,
        query: &AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentStoreError>;
}

/// Collaborator boundary: account and assignment lookups owned by the
/// identity and admin subsystems. This core only asks yes/no questions.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn is_active_user(&self, user_id: Uuid, role: Role) -> Result<bool, AppointmentStoreError>;

    async fn link_exists(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
    ) -> Result<bool, AppointmentStoreError>;
}

fn appointment_row(appointment: &Appointment) -> Value {
    json!({
        "id": appointment.id,
        "doctor_id": appointment.doctor_id,
        "patient_id": appointment.patient_id,
        "date": appointment.date,
        "time_slot": appointment.time_slot,
        "status": appointment.status,
        "reason": appointment.reason,
        "notes": appointment.notes,
        "created_at": appointment.created_at.to_rfc3339(),
        "updated_at": appointment.updated_at.to_rfc3339(),
    })
}

// ==============================================================================
// POSTGREST STORE
// ==============================================================================

/// Store backed by the `appointments` table. The database carries a partial
/// unique index on `(doctor_id, date, time_slot)` restricted to active
/// statuses, so the vacancy check and the insert are one statement and a
/// lost race surfaces as HTTP 409. A block insert is a single multi-row
/// `POST`, which PostgREST executes in one transaction.
pub struct PostgrestAppointmentStore {
    client: Arc<PostgrestClient>,
}

impl PostgrestAppointmentStore {
    pub fn new(client: Arc<PostgrestClient>) -> Self {
        Self { client }
    }

    fn parse_rows(result: Vec<Value>) -> Result<Vec<Appointment>, AppointmentStoreError> {
        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| AppointmentStoreError::Backend(e.to_string()))
            })
            .collect()
    }

    /// After a 409 on a block insert, report which of the requested slots
    /// are held so the caller can pick a different start time in one round.
    async fn occupied_among(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        requested: &[TimeSlot],
    ) -> Result<Vec<TimeSlot>, AppointmentStoreError> {
        let active = self.active_slots(doctor_id, date).await?;
        let requested: HashSet<TimeSlot> = requested.iter().copied().collect();
        let mut occupied: Vec<TimeSlot> =
            active.into_iter().filter(|slot| requested.contains(slot)).collect();
        occupied.sort();
        Ok(occupied)
    }
}

#[async_trait]
impl AppointmentStore for PostgrestAppointmentStore {
    async fn insert_if_vacant(
        &self,
        appointment: Appointment,
    ) -> Result<Appointment, AppointmentStoreError> {
        debug!("Inserting appointment {} at {} {}",
               appointment.id, appointment.date, appointment.time_slot);

        let slot = appointment.time_slot;
        let result: Vec<Value> = self
            .client
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(appointment_row(&appointment)),
                Some(return_representation()),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => AppointmentStoreError::Occupied(vec![slot]),
                other => AppointmentStoreError::Backend(other.to_string()),
            })?;

        Self::parse_rows(result)?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentStoreError::Backend("insert returned no row".to_string()))
    }

    async fn insert_block_if_vacant(
        &self,
        appointments: Vec<Appointment>,
    ) -> Result<Vec<Appointment>, AppointmentStoreError> {
        if appointments.is_empty() {
            return Ok(vec![]);
        }

        let doctor_id = appointments[0].doctor_id;
        let date = appointments[0].date;
        let requested: Vec<TimeSlot> = appointments.iter().map(|a| a.time_slot).collect();

        debug!("Inserting block of {} appointments for doctor {} on {}",
               appointments.len(), doctor_id, date);

        let rows: Vec<Value> = appointments.iter().map(appointment_row).collect();
        let result = self
            .client
            .request_with_headers::<Vec<Value>>(
                Method::POST,
                "/rest/v1/appointments",
                Some(Value::Array(rows)),
                Some(return_representation()),
            )
            .await;

        match result {
            Ok(rows) => Self::parse_rows(rows),
            Err(DbError::Conflict(_)) => {
                let mut occupied = self.occupied_among(doctor_id, date, &requested).await?;
                if occupied.is_empty() {
                    // The conflicting rows went away between the insert and
                    // the lookup; report the requested slots as contended.
                    occupied = requested;
                }
                Err(AppointmentStoreError::Occupied(occupied))
            }
            Err(other) => Err(AppointmentStoreError::Backend(other.to_string())),
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentStoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentStoreError::Backend(e.to_string()))?;

        Ok(Self::parse_rows(result)?.into_iter().next())
    }

    async fn active_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, AppointmentStoreError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&status=in.(pending,approved,completed)&select=time_slot&order=time_slot.asc",
            doctor_id, date
        );
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentStoreError::Backend(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value::<TimeSlot>(row["time_slot"].clone())
                    .map_err(|e| AppointmentStoreError::Backend(e.to_string()))
            })
            .collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentStoreError> {
        // The updated_at filter is the optimistic guard: if another actor
        // committed first, the filter matches nothing and we report Stale.
        let guard_str = expected_updated_at.to_rfc3339();
        let guard = urlencoding::encode(&guard_str);
        let path = format!("/rest/v1/appointments?id=eq.{}&updated_at=eq.{}", id, guard);
        let body = json!({
            "status": status,
            "updated_at": updated_at.to_rfc3339(),
        });

        let result: Vec<Value> = self
            .client
            .request_with_headers(Method::PATCH, &path, Some(body), Some(return_representation()))
            .await
            .map_err(|e| AppointmentStoreError::Backend(e.to_string()))?;

        match Self::parse_rows(result)?.into_iter().next() {
            Some(updated) => Ok(updated),
            None => match self.find(id).await? {
                Some(_) => Err(AppointmentStoreError::Stale),
                None => Err(AppointmentStoreError::NotFound),
            },
        }
    }

    async fn reschedule_if_vacant(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        changes: AppointmentChanges,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentStoreError> {
        let guard_str = expected_updated_at.to_rfc3339();
        let guard = urlencoding::encode(&guard_str);
        let path = format!("/rest/v1/appointments?id=eq.{}&updated_at=eq.{}", id, guard);
        let target_slot = changes.time_slot;
        let body = json!({
            "date": changes.date,
            "time_slot": changes.time_slot,
            "reason": changes.reason,
            "notes": changes.notes,
            "updated_at": updated_at.to_rfc3339(),
        });

        let result = self
            .client
            .request_with_headers::<Vec<Value>>(
                Method::PATCH,
                &path,
                Some(body),
                Some(return_representation()),
            )
            .await;

        match result {
            Ok(rows) => match Self::parse_rows(rows)?.into_iter().next() {
                Some(updated) => Ok(updated),
                None => match self.find(id).await? {
                    Some(_) => Err(AppointmentStoreError::Stale),
                    None => Err(AppointmentStoreError::NotFound),
                },
            },
            Err(DbError::Conflict(_)) => Err(AppointmentStoreError::Occupied(vec![target_slot])),
            Err(other) => Err(AppointmentStoreError::Backend(other.to_string())),
        }
    }

    async fn delete_if_pending(&self, id: Uuid) -> Result<bool, AppointmentStoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.pending", id);
        let result: Vec<Value> = self
            .client
            .request_with_headers(Method::DELETE, &path, None, Some(return_representation()))
            .await
            .map_err(|e| AppointmentStoreError::Backend(e.to_string()))?;

        Ok(!result.is_empty())
    }

    async fn search(
        &self,
        query: &AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentStoreError> {
        let mut query_parts = Vec::new();

        if let Some(doctor_id) = query.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!("date=gte.{}", from_date));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!("date=lte.{}", to_date));
        }
        query_parts.push("order=date.asc,time_slot.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentStoreError::Backend(e.to_string()))?;

        Self::parse_rows(result)
    }
}

/// Account and link lookups against the directory tables.
pub struct PostgrestDirectory {
    client: Arc<PostgrestClient>,
}

impl PostgrestDirectory {
    pub fn new(client: Arc<PostgrestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Directory for PostgrestDirectory {
    async fn is_active_user(&self, user_id: Uuid, role: Role) -> Result<bool, AppointmentStoreError> {
        let table = match role {
            Role::Doctor => "doctors",
            Role::Patient => "patients",
            Role::Admin => "admins",
        };
        let path = format!("/rest/v1/{}?id=eq.{}&is_active=eq.true&select=id", table, user_id);
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentStoreError::Backend(e.to_string()))?;

        Ok(!result.is_empty())
    }

    async fn link_exists(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
    ) -> Result<bool, AppointmentStoreError> {
        let path = format!(
            "/rest/v1/doctor_patient_links?doctor_id=eq.{}&patient_id=eq.{}&is_active=eq.true&select=doctor_id",
            doctor_id, patient_id
        );
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentStoreError::Backend(e.to_string()))?;

        Ok(!result.is_empty())
    }
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

/// Single-process store for development and tests. The table mutex is the
/// transaction boundary: every check-then-write runs inside one lock scope,
/// which gives the same all-or-nothing behavior the database constraint
/// provides in production. Not suitable behind multiple service instances.
#[derive(Default)]
pub struct MemoryAppointmentStore {
    rows: Mutex<Vec<Appointment>>,
}

impl MemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn holds_slot(row: &Appointment, doctor_id: Uuid, date: NaiveDate, slot: TimeSlot) -> bool {
    row.doctor_id == doctor_id && row.date == date && row.time_slot == slot && row.status.is_active()
}

#[async_trait]
impl AppointmentStore for MemoryAppointmentStore {
    async fn insert_if_vacant(
        &self,
        appointment: Appointment,
    ) -> Result<Appointment, AppointmentStoreError> {
        let mut rows = self.rows.lock().await;
        if rows
            .iter()
            .any(|row| holds_slot(row, appointment.doctor_id, appointment.date, appointment.time_slot))
        {
            return Err(AppointmentStoreError::Occupied(vec![appointment.time_slot]));
        }
        rows.push(appointment.clone());
        Ok(appointment)
    }

    async fn insert_block_if_vacant(
        &self,
        appointments: Vec<Appointment>,
    ) -> Result<Vec<Appointment>, AppointmentStoreError> {
        let mut rows = self.rows.lock().await;

        let mut occupied: Vec<TimeSlot> = appointments
            .iter()
            .filter(|a| rows.iter().any(|row| holds_slot(row, a.doctor_id, a.date, a.time_slot)))
            .map(|a| a.time_slot)
            .collect();

        if !occupied.is_empty() {
            occupied.sort();
            return Err(AppointmentStoreError::Occupied(occupied));
        }

        rows.extend(appointments.iter().cloned());
        Ok(appointments)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentStoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|row| row.id == id).cloned())
    }

    async fn active_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, AppointmentStoreError> {
        let rows = self.rows.lock().await;
        let mut slots: Vec<TimeSlot> = rows
            .iter()
            .filter(|row| row.doctor_id == doctor_id && row.date == date && row.status.is_active())
            .map(|row| row.time_slot)
            .collect();
        slots.sort();
        slots.dedup();
        Ok(slots)
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentStoreError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(AppointmentStoreError::NotFound)?;

        if row.updated_at != expected_updated_at {
            return Err(AppointmentStoreError::Stale);
        }

        row.status = status;
        row.updated_at = updated_at;
        Ok(row.clone())
    }

    async fn reschedule_if_vacant(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        changes: AppointmentChanges,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentStoreError> {
        let mut rows = self.rows.lock().await;

        let current = rows
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or(AppointmentStoreError::NotFound)?;

        if current.updated_at != expected_updated_at {
            return Err(AppointmentStoreError::Stale);
        }

        // The appointment's own row never blocks its move.
        if rows.iter().any(|row| {
            row.id != id && holds_slot(row, current.doctor_id, changes.date, changes.time_slot)
        }) {
            return Err(AppointmentStoreError::Occupied(vec![changes.time_slot]));
        }

        let row = rows.iter_mut().find(|row| row.id == id).unwrap();
        row.date = changes.date;
        row.time_slot = changes.time_slot;
        row.reason = changes.reason;
        row.notes = changes.notes;
        row.updated_at = updated_at;
        Ok(row.clone())
    }

    async fn delete_if_pending(&self, id: Uuid) -> Result<bool, AppointmentStoreError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| !(row.id == id && row.status == AppointmentStatus::Pending));
        Ok(rows.len() < before)
    }

    async fn search(
        &self,
        query: &AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentStoreError> {
        let rows = self.rows.lock().await;
        let mut matches: Vec<Appointment> = rows
            .iter()
            .filter(|row| query.doctor_id.map_or(true, |id| row.doctor_id == id))
            .filter(|row| query.patient_id.map_or(true, |id| row.patient_id == id))
            .filter(|row| query.status.map_or(true, |status| row.status == status))
            .filter(|row| query.from_date.map_or(true, |from| row.date >= from))
            .filter(|row| query.to_date.map_or(true, |to| row.date <= to))
            .cloned()
            .collect();
        matches.sort_by_key(|row| (row.date, row.time_slot));
        Ok(matches)
    }
}

/// In-memory directory for development and tests.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: Mutex<DirectoryInner>,
}

#[derive(Default)]
struct DirectoryInner {
    doctors: HashSet<Uuid>,
    patients: HashSet<Uuid>,
    admins: HashSet<Uuid>,
    links: HashSet<(Uuid, Uuid)>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_doctor(&self, id: Uuid) {
        self.inner.lock().await.doctors.insert(id);
    }

    pub async fn add_patient(&self, id: Uuid) {
        self.inner.lock().await.patients.insert(id);
    }

    pub async fn add_admin(&self, id: Uuid) {
        self.inner.lock().await.admins.insert(id);
    }

    pub async fn link(&self, doctor_id: Uuid, patient_id: Uuid) {
        self.inner.lock().await.links.insert((doctor_id, patient_id));
    }

    pub async fn unlink(&self, doctor_id: Uuid, patient_id: Uuid) {
        self.inner.lock().await.links.remove(&(doctor_id, patient_id));
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn is_active_user(&self, user_id: Uuid, role: Role) -> Result<bool, AppointmentStoreError> {
        let inner = self.inner.lock().await;
        Ok(match role {
            Role::Doctor => inner.doctors.contains(&user_id),
            Role::Patient => inner.patients.contains(&user_id),
            Role::Admin => inner.admins.contains(&user_id),
        })
    }

    async fn link_exists(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
    ) -> Result<bool, AppointmentStoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.links.contains(&(doctor_id, patient_id)))
    }
}
