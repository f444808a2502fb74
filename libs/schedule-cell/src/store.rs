// libs/schedule-cell/src/store.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use shared_database::postgrest::{return_representation, DbError, PostgrestClient};

use crate::models::{DoctorSchedule, Shift};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleStoreError {
    /// The `(doctor_id, date)` pair is already assigned a shift.
    #[error("schedule already exists")]
    Duplicate,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Persistence seam for shift assignments. The backing store enforces the
/// `(doctor_id, date)` uniqueness invariant; `insert` is the only write path
/// that can observe it.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert(&self, schedule: DoctorSchedule) -> Result<DoctorSchedule, ScheduleStoreError>;

    async fn find(&self, doctor_id: Uuid, date: NaiveDate)
        -> Result<Option<DoctorSchedule>, ScheduleStoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DoctorSchedule>, ScheduleStoreError>;

    async fn set_shift(
        &self,
        id: Uuid,
        shift: Shift,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<DoctorSchedule>, ScheduleStoreError>;

    /// Returns whether a row was actually removed.
    async fn delete(&self, id: Uuid) -> Result<bool, ScheduleStoreError>;

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DoctorSchedule>, ScheduleStoreError>;
}

// ==============================================================================
// POSTGREST STORE
// ==============================================================================

/// Store backed by the `doctor_schedules` table. A unique index on
/// `(doctor_id, date)` makes the duplicate check and the insert one atomic
/// statement; a violation comes back as HTTP 409.
pub struct PostgrestScheduleStore {
    client: Arc<PostgrestClient>,
}

impl PostgrestScheduleStore {
    pub fn new(client: Arc<PostgrestClient>) -> Self {
        Self { client }
    }

    fn parse_rows(result: Vec<Value>) -> Result<Vec<DoctorSchedule>, ScheduleStoreError> {
        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| ScheduleStoreError::Backend(e.to_string())))
            .collect()
    }
}

#[async_trait]
impl ScheduleStore for PostgrestScheduleStore {
    async fn insert(&self, schedule: DoctorSchedule) -> Result<DoctorSchedule, ScheduleStoreError> {
        debug!("Inserting schedule for doctor {} on {}", schedule.doctor_id, schedule.date);

        let body = json!({
            "id": schedule.id,
            "doctor_id": schedule.doctor_id,
            "date": schedule.date,
            "shift": schedule.shift,
            "created_at": schedule.created_at.to_rfc3339(),
            "updated_at": schedule.updated_at.to_rfc3339(),
        });

        let result: Vec<Value> = self
            .client
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_schedules",
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => ScheduleStoreError::Duplicate,
                other => ScheduleStoreError::Backend(other.to_string()),
            })?;

        Self::parse_rows(result)?
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleStoreError::Backend("insert returned no row".to_string()))
    }

    async fn find(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DoctorSchedule>, ScheduleStoreError> {
        let path = format!("/rest/v1/doctor_schedules?doctor_id=eq.{}&date=eq.{}", doctor_id, date);
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| ScheduleStoreError::Backend(e.to_string()))?;

        Ok(Self::parse_rows(result)?.into_iter().next())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DoctorSchedule>, ScheduleStoreError> {
        let path = format!("/rest/v1/doctor_schedules?id=eq.{}", id);
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| ScheduleStoreError::Backend(e.to_string()))?;

        Ok(Self::parse_rows(result)?.into_iter().next())
    }

    async fn set_shift(
        &self,
        id: Uuid,
        shift: Shift,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<DoctorSchedule>, ScheduleStoreError> {
        let path = format!("/rest/v1/doctor_schedules?id=eq.{}", id);
        let body = json!({
            "shift": shift,
            "updated_at": updated_at.to_rfc3339(),
        });

        let result: Vec<Value> = self
            .client
            .request_with_headers(Method::PATCH, &path, Some(body), Some(return_representation()))
            .await
            .map_err(|e| ScheduleStoreError::Backend(e.to_string()))?;

        Ok(Self::parse_rows(result)?.into_iter().next())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ScheduleStoreError> {
        let path = format!("/rest/v1/doctor_schedules?id=eq.{}", id);
        let result: Vec<Value> = self
            .client
            .request_with_headers(Method::DELETE, &path, None, Some(return_representation()))
            .await
            .map_err(|e| ScheduleStoreError::Backend(e.to_string()))?;

        Ok(!result.is_empty())
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DoctorSchedule>, ScheduleStoreError> {
        let mut path = format!("/rest/v1/doctor_schedules?doctor_id=eq.{}", doctor_id);
        if let Some(from) = from {
            path.push_str(&format!("&date=gte.{}", from));
        }
        if let Some(to) = to {
            path.push_str(&format!("&date=lte.{}", to));
        }
        path.push_str("&order=date.asc");

        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| ScheduleStoreError::Backend(e.to_string()))?;

        Self::parse_rows(result)
    }
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

/// Single-process store for development and tests. One mutex covers the
/// whole table, so the duplicate check and insert are naturally atomic.
/// Not suitable behind more than one service instance.
#[derive(Default)]
pub struct MemoryScheduleStore {
    rows: Mutex<Vec<DoctorSchedule>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn insert(&self, schedule: DoctorSchedule) -> Result<DoctorSchedule, ScheduleStoreError> {
        let mut rows = self.rows.lock().await;
        if rows
            .iter()
            .any(|s| s.doctor_id == schedule.doctor_id && s.date == schedule.date)
        {
            return Err(ScheduleStoreError::Duplicate);
        }
        rows.push(schedule.clone());
        Ok(schedule)
    }

    async fn find(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DoctorSchedule>, ScheduleStoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|s| s.doctor_id == doctor_id && s.date == date).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DoctorSchedule>, ScheduleStoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|s| s.id == id).cloned())
    }

    async fn set_shift(
        &self,
        id: Uuid,
        shift: Shift,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<DoctorSchedule>, ScheduleStoreError> {
        let mut rows = self.rows.lock().await;
        match rows.iter_mut().find(|s| s.id == id) {
            Some(row) => {
                row.shift = shift;
                row.updated_at = updated_at;
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ScheduleStoreError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|s| s.id != id);
        Ok(rows.len() < before)
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DoctorSchedule>, ScheduleStoreError> {
        let rows = self.rows.lock().await;
        let mut matches: Vec<DoctorSchedule> = rows
            .iter()
            .filter(|s| s.doctor_id == doctor_id)
            .filter(|s| from.map_or(true, |f| s.date >= f))
            .filter(|s| to.map_or(true, |t| s.date <= t))
            .cloned()
            .collect();
        matches.sort_by_key(|s| s.date);
        Ok(matches)
    }
}
