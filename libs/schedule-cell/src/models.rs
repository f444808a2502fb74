// libs/schedule-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ==============================================================================
// TIME MODEL
// ==============================================================================

pub const SLOT_MINUTES: u16 = 30;
pub const SLOTS_PER_SHIFT: usize = 16;

/// One of the 48 canonical half-hour-of-day marks ("00:00" .. "23:30"), the
/// atomic bookable unit. Ordering is chronological; the zero-padded string
/// form sorts the same way.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSlot {
    minutes: u16,
}

impl TimeSlot {
    /// Builds a slot from minutes past midnight. `None` unless the value is
    /// an exact half-hour mark inside one day.
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        if minutes < 24 * 60 && minutes % SLOT_MINUTES == 0 {
            Some(Self { minutes })
        } else {
            None
        }
    }

    pub fn minutes_from_midnight(self) -> u16 {
        self.minutes
    }

    pub fn hour(self) -> u16 {
        self.minutes / 60
    }

    pub fn minute(self) -> u16 {
        self.minutes % 60
    }

    /// The next half-hour mark. `None` at "23:30": blocks never roll over
    /// midnight, so there is no successor across the day boundary.
    pub fn succ(self) -> Option<Self> {
        Self::from_minutes(self.minutes + SLOT_MINUTES)
    }

    pub fn as_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour() as u32, self.minute() as u32, 0).unwrap()
    }

    /// All 48 marks in ascending order.
    pub fn all() -> impl Iterator<Item = TimeSlot> {
        (0..48).map(|i| TimeSlot { minutes: i * SLOT_MINUTES })
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl fmt::Debug for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time slot '{0}', expected a half-hour mark like '09:30'")]
pub struct ParseTimeSlotError(String);

impl FromStr for TimeSlot {
    type Err = ParseTimeSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the canonical "HH:MM" as well as the "HH:MM:SS" form a
        // database time column echoes back.
        let time = NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map_err(|_| ParseTimeSlotError(s.to_string()))?;

        if time.second() != 0 {
            return Err(ParseTimeSlotError(s.to_string()));
        }

        let minutes = (time.hour() * 60 + time.minute()) as u16;
        Self::from_minutes(minutes).ok_or_else(|| ParseTimeSlotError(s.to_string()))
    }
}

impl Serialize for TimeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An 8-hour block of the day assigned to a doctor for one calendar date.
/// Each shift expands to a fixed set of 16 bookable slots; the mapping is a
/// pure function and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    Morning,
    Afternoon,
    Night,
}

impl Shift {
    /// First bookable mark of the shift.
    pub fn start(&self) -> TimeSlot {
        let minutes = match self {
            Shift::Morning => 8 * 60,
            Shift::Afternoon => 16 * 60,
            Shift::Night => 0,
        };
        TimeSlot::from_minutes(minutes).unwrap()
    }

    /// The shift's 16 slots in ascending chronological order.
    pub fn slots(&self) -> Vec<TimeSlot> {
        let start = self.start().minutes_from_midnight();
        (0..SLOTS_PER_SHIFT as u16)
            .map(|i| TimeSlot::from_minutes(start + i * SLOT_MINUTES).unwrap())
            .collect()
    }

    pub fn contains(&self, slot: TimeSlot) -> bool {
        let start = self.start().minutes_from_midnight();
        let end = start + SLOTS_PER_SHIFT as u16 * SLOT_MINUTES;
        (start..end).contains(&slot.minutes_from_midnight())
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shift::Morning => write!(f, "morning"),
            Shift::Afternoon => write!(f, "afternoon"),
            Shift::Night => write!(f, "night"),
        }
    }
}

// ==============================================================================
// SCHEDULE REGISTRY MODELS
// ==============================================================================

/// One shift assignment for one doctor on one calendar date. At most one of
/// these exists per `(doctor_id, date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub shift: Shift,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub shift: Shift,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateShiftRequest {
    pub shift: Shift,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleListQuery {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule not found")]
    NotFound,

    #[error("Doctor already has a shift on {0}")]
    DuplicateSchedule(NaiveDate),

    #[error("Cannot assign a shift on a past date: {0}")]
    PastDate(NaiveDate),

    #[error("Database error: {0}")]
    Database(String),
}
