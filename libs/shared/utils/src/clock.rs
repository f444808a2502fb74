use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use shared_config::AppConfig;

/// Source of "now". A seam rather than a direct `Utc::now()` call so the
/// lead-time buffer and calendar-day logic can be exercised against a pinned
/// wall clock.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock pinned to a settable instant.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Wall clock in the clinic's canonical zone. Every date comparison the
/// scheduling core makes ("is this date in the past", "is this slot within
/// the lead-time buffer") goes through here, so a deployment spanning time
/// zones still agrees on what "today" means.
#[derive(Clone)]
pub struct ClinicClock {
    source: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl ClinicClock {
    pub fn new(source: Arc<dyn Clock>, utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        Self { source, offset }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Arc::new(SystemClock), config.clinic_utc_offset_minutes)
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.source.now_utc()
    }

    /// Current wall-clock date and time in the clinic's zone.
    pub fn now_local(&self) -> NaiveDateTime {
        self.source.now_utc().with_timezone(&self.offset).naive_local()
    }

    /// Today's calendar date in the clinic's zone.
    pub fn today(&self) -> NaiveDate {
        self.now_local().date()
    }
}
