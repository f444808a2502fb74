mod common;

use appointment_cell::models::{AppointmentStatus, ReserveSlotRequest};
use appointment_cell::store::AppointmentStore;
use schedule_cell::models::{Shift, TimeSlot};

use common::{date, utc, TestEnv};

fn slot(s: &str) -> TimeSlot {
    s.parse().unwrap()
}

fn reserve(env: &TestEnv, on: &str, at: &str) -> ReserveSlotRequest {
    ReserveSlotRequest {
        doctor_id: env.doctor,
        patient_id: env.patient,
        date: date(on),
        time_slot: slot(at),
        reason: None,
        notes: None,
    }
}

#[tokio::test]
async fn test_no_schedule_means_no_slots() {
    let env = TestEnv::new().await;

    let slots = env
        .availability()
        .available_slots(env.doctor, date("2025-12-01"))
        .await
        .unwrap();

    assert!(slots.is_empty());
}

#[tokio::test]
async fn test_free_day_exposes_the_whole_shift() {
    let env = TestEnv::new().await;
    env.add_schedule("2025-11-20", Shift::Morning).await;

    let slots = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();

    assert_eq!(slots, Shift::Morning.slots());
}

#[tokio::test]
async fn test_booked_slots_are_hidden() {
    let env = TestEnv::new().await;
    env.add_schedule("2025-11-20", Shift::Morning).await;

    // Pending booking (patient path)
    env.booking()
        .reserve_slot(&env.patient_user(), reserve(&env, "2025-11-20", "09:00"))
        .await
        .unwrap();

    // Approved booking (doctor path)
    env.booking()
        .reserve_slot(&env.doctor_user(), reserve(&env, "2025-11-20", "10:00"))
        .await
        .unwrap();

    let slots = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();

    assert_eq!(slots.len(), 14);
    assert!(!slots.contains(&slot("09:00")));
    assert!(!slots.contains(&slot("10:00")));
}

#[tokio::test]
async fn test_cancelled_and_rejected_free_the_slot() {
    let env = TestEnv::new().await;
    env.add_schedule("2025-11-20", Shift::Morning).await;

    let pending = env
        .booking()
        .reserve_slot(&env.patient_user(), reserve(&env, "2025-11-20", "09:00"))
        .await
        .unwrap();
    env.lifecycle()
        .update_status(&env.patient_user(), pending.id, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    let rejected = env
        .booking()
        .reserve_slot(&env.patient_user(), reserve(&env, "2025-11-20", "10:30"))
        .await
        .unwrap();
    env.lifecycle()
        .update_status(&env.doctor_user(), rejected.id, AppointmentStatus::Rejected)
        .await
        .unwrap();

    let slots = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();

    assert!(slots.contains(&slot("09:00")));
    assert!(slots.contains(&slot("10:30")));
    assert_eq!(slots, Shift::Morning.slots());
}

#[tokio::test]
async fn test_same_day_lead_time_buffer() {
    let env = TestEnv::new().await;
    env.add_schedule("2025-11-20", Shift::Afternoon).await;

    // 14:45 local: 16:00 starts well past now+30 (15:15), whole shift open
    env.fixed.set(utc("2025-11-20T14:45:00Z"));
    let slots = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();
    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0], slot("16:00"));

    // 15:50 local: 16:00 <= 15:50 + 30min, so it drops; 16:30 survives
    env.fixed.set(utc("2025-11-20T15:50:00Z"));
    let slots = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();
    assert_eq!(slots[0], slot("16:30"));
    assert_eq!(slots.len(), 15);

    // 23:10 local: every remaining slot is inside the buffer
    env.fixed.set(utc("2025-11-20T23:10:00Z"));
    let slots = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();
    assert!(slots.is_empty());
}

#[tokio::test]
async fn test_lead_time_only_applies_to_today() {
    let env = TestEnv::new().await;
    env.add_schedule("2025-11-21", Shift::Morning).await;

    // Late on the 20th: tomorrow's morning shift is fully bookable
    env.fixed.set(utc("2025-11-20T23:45:00Z"));
    let slots = env
        .availability()
        .available_slots(env.doctor, date("2025-11-21"))
        .await
        .unwrap();

    assert_eq!(slots.len(), 16);
}

#[tokio::test]
async fn test_today_is_resolved_in_the_clinic_zone() {
    // Clinic two hours ahead of UTC: at 22:30 UTC on the 19th it is already
    // 00:30 on the 20th locally, so the 20th is "today" and the buffer bites.
    let env = TestEnv::with_offset(120).await;
    env.add_schedule("2025-11-20", Shift::Night).await;

    env.fixed.set(utc("2025-11-19T22:30:00Z"));
    let slots = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();

    // Local time 00:30, cutoff 01:00: slots 00:00..01:00 are gone
    assert!(!slots.contains(&slot("00:00")));
    assert!(!slots.contains(&slot("00:30")));
    assert!(!slots.contains(&slot("01:00")));
    assert!(slots.contains(&slot("01:30")));
}

#[tokio::test]
async fn test_availability_is_idempotent() {
    let env = TestEnv::new().await;
    env.add_schedule("2025-11-20", Shift::Morning).await;

    env.booking()
        .reserve_slot(&env.patient_user(), reserve(&env, "2025-11-20", "09:00"))
        .await
        .unwrap();

    let first = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();
    let second = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_availability_never_shows_active_slots() {
    let env = TestEnv::new().await;
    env.add_schedule("2025-11-20", Shift::Morning).await;

    for at in ["08:00", "09:00", "12:30"] {
        env.booking()
            .reserve_slot(&env.patient_user(), reserve(&env, "2025-11-20", at))
            .await
            .unwrap();
    }

    let available = env
        .availability()
        .available_slots(env.doctor, date("2025-11-20"))
        .await
        .unwrap();
    let active = env.appointments.active_slots(env.doctor, date("2025-11-20")).await.unwrap();

    assert!(available.iter().all(|slot| !active.contains(slot)));
}
