use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use schedule_cell::models::{CreateScheduleRequest, ScheduleError, Shift};
use schedule_cell::services::registry::ScheduleRegistryService;
use schedule_cell::store::MemoryScheduleStore;
use shared_utils::clock::{ClinicClock, FixedClock};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

/// Registry pinned to 2025-11-10, clinic zone = UTC.
fn registry() -> ScheduleRegistryService {
    let clock = ClinicClock::new(Arc::new(FixedClock::new(utc("2025-11-10T09:00:00Z"))), 0);
    ScheduleRegistryService::new(Arc::new(MemoryScheduleStore::new()), clock)
}

fn create_request(doctor_id: Uuid, on: &str, shift: Shift) -> CreateScheduleRequest {
    CreateScheduleRequest { doctor_id, date: date(on), shift }
}

#[tokio::test]
async fn test_create_and_get_schedule() {
    let registry = registry();
    let doctor = Uuid::new_v4();

    let created = registry
        .create_schedule(create_request(doctor, "2025-11-20", Shift::Morning))
        .await
        .unwrap();

    assert_eq!(created.doctor_id, doctor);
    assert_eq!(created.shift, Shift::Morning);

    let fetched = registry.get_schedule(doctor, date("2025-11-20")).await.unwrap();
    assert_eq!(fetched.id, created.id);
}

#[tokio::test]
async fn test_duplicate_schedule_conflicts() {
    let registry = registry();
    let doctor = Uuid::new_v4();

    registry
        .create_schedule(create_request(doctor, "2025-11-20", Shift::Morning))
        .await
        .unwrap();

    // Same doctor, same date: rejected even with a different shift
    let err = registry
        .create_schedule(create_request(doctor, "2025-11-20", Shift::Night))
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::DuplicateSchedule(_));

    // A different doctor can take the same date
    registry
        .create_schedule(create_request(Uuid::new_v4(), "2025-11-20", Shift::Morning))
        .await
        .unwrap();

    // And the same doctor can take a different date
    registry
        .create_schedule(create_request(doctor, "2025-11-21", Shift::Afternoon))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_past_dates_are_rejected() {
    let registry = registry();

    let err = registry
        .create_schedule(create_request(Uuid::new_v4(), "2025-11-09", Shift::Morning))
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::PastDate(_));

    // Today is allowed
    registry
        .create_schedule(create_request(Uuid::new_v4(), "2025-11-10", Shift::Morning))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_schedule_is_not_found() {
    let registry = registry();

    let err = registry
        .get_schedule(Uuid::new_v4(), date("2025-12-01"))
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::NotFound);
}

#[tokio::test]
async fn test_update_shift_replaces_shift_only() {
    let registry = registry();
    let doctor = Uuid::new_v4();

    let created = registry
        .create_schedule(create_request(doctor, "2025-11-20", Shift::Morning))
        .await
        .unwrap();

    let updated = registry.update_shift(created.id, Shift::Afternoon).await.unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.shift, Shift::Afternoon);
    assert_eq!(updated.date, created.date);
    assert_eq!(updated.doctor_id, created.doctor_id);

    let err = registry.update_shift(Uuid::new_v4(), Shift::Night).await.unwrap_err();
    assert_matches!(err, ScheduleError::NotFound);
}

#[tokio::test]
async fn test_delete_schedule() {
    let registry = registry();
    let doctor = Uuid::new_v4();

    let created = registry
        .create_schedule(create_request(doctor, "2025-11-20", Shift::Morning))
        .await
        .unwrap();

    registry.delete_schedule(created.id).await.unwrap();

    let err = registry.get_schedule(doctor, date("2025-11-20")).await.unwrap_err();
    assert_matches!(err, ScheduleError::NotFound);

    // Deleting again reports the absence
    let err = registry.delete_schedule(created.id).await.unwrap_err();
    assert_matches!(err, ScheduleError::NotFound);
}

#[tokio::test]
async fn test_list_schedules_ordered_and_bounded() {
    let registry = registry();
    let doctor = Uuid::new_v4();

    for (on, shift) in [
        ("2025-11-22", Shift::Night),
        ("2025-11-20", Shift::Morning),
        ("2025-11-21", Shift::Afternoon),
    ] {
        registry.create_schedule(create_request(doctor, on, shift)).await.unwrap();
    }

    let all = registry.list_schedules(doctor, None, None).await.unwrap();
    let dates: Vec<NaiveDate> = all.iter().map(|s| s.date).collect();
    assert_eq!(dates, vec![date("2025-11-20"), date("2025-11-21"), date("2025-11-22")]);

    let bounded = registry
        .list_schedules(doctor, Some(date("2025-11-21")), Some(date("2025-11-21")))
        .await
        .unwrap();
    assert_eq!(bounded.len(), 1);
    assert_eq!(bounded[0].shift, Shift::Afternoon);
}
