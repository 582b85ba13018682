// libs/schedule-cell/src/models.rs
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

// ==============================================================================
// DAYS
// ==============================================================================

/// Day of week ordered Sunday first, matching the day numbers clients send (0 = Sunday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Sunday,
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    pub fn of(date: NaiveDate) -> Self {
        use chrono::Datelike;
        date.weekday().into()
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.get(number as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "Sunday",
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        }
    }

    pub fn short(self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "sun",
            DayOfWeek::Monday => "mon",
            DayOfWeek::Tuesday => "tue",
            DayOfWeek::Wednesday => "wed",
            DayOfWeek::Thursday => "thu",
            DayOfWeek::Friday => "fri",
            DayOfWeek::Saturday => "sat",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sun => DayOfWeek::Sunday,
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        DayOfWeek::ALL
            .iter()
            .copied()
            .find(|day| day.name().eq_ignore_ascii_case(&lowered) || day.short() == lowered)
            .ok_or_else(|| format!("unknown day of week '{}'", value))
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ==============================================================================
// CATALOG MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDefinition {
    /// Stable join key stored on bookings, e.g. `gomoti-mon-1700`.
    pub id: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub display_label: String,
}

impl SlotDefinition {
    pub fn new(hospital_id: &str, day: DayOfWeek, start_time: NaiveTime, end_time: NaiveTime, label: Option<String>) -> Self {
        Self {
            id: slot_id(hospital_id, day, start_time),
            start_time,
            end_time,
            display_label: label.unwrap_or_else(|| display_label(start_time, end_time)),
        }
    }
}

pub fn slot_id(hospital_id: &str, day: DayOfWeek, start_time: NaiveTime) -> String {
    format!("{}-{}-{}", hospital_id, day.short(), start_time.format("%H%M"))
}

/// `05:00 PM - 06:00 PM`
pub fn display_label(start_time: NaiveTime, end_time: NaiveTime) -> String {
    format!("{} - {}", start_time.format("%I:%M %p"), end_time.format("%I:%M %p"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub hospital_id: String,
    pub hospital_name: String,
    pub aliases: Vec<String>,
    pub doctor_name: Option<String>,
    pub slots_per_day: BTreeMap<DayOfWeek, Vec<SlotDefinition>>,
    pub capacity_per_slot: u32,
    pub advance_booking_days: u32,
}

impl ScheduleEntry {
    /// Days with at least one slot; every other day is closed.
    pub fn operating_days(&self) -> BTreeSet<DayOfWeek> {
        self.slots_per_day
            .iter()
            .filter(|(_, slots)| !slots.is_empty())
            .map(|(day, _)| *day)
            .collect()
    }

    pub fn closed_reason(&self, day: DayOfWeek) -> String {
        format!("{} is closed on {}s", self.hospital_name, day.name())
    }
}

// ==============================================================================
// CONFIGURATION FILE FORMAT
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub hospitals: Vec<HospitalScheduleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HospitalScheduleConfig {
    pub hospital_id: String,
    pub hospital_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub doctor_name: Option<String>,
    pub capacity_per_slot: u32,
    #[serde(default = "default_advance_booking_days")]
    pub advance_booking_days: u32,
    pub days: BTreeMap<DayOfWeek, DayScheduleConfig>,
}

fn default_advance_booking_days() -> u32 {
    60
}

/// A day either lists its slots or describes a window cut into equal slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DayScheduleConfig {
    Explicit {
        slots: Vec<SlotConfig>,
    },
    Window {
        #[serde(with = "hhmm")]
        start: NaiveTime,
        #[serde(with = "hhmm")]
        end: NaiveTime,
        slot_minutes: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub label: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Hospital not found: {0}")]
    HospitalNotFound(String),

    #[error("{reason}")]
    Closed {
        hospital_id: String,
        day: DayOfWeek,
        reason: String,
    },

    #[error("No time slot '{slot}' at {hospital_id} on {date}")]
    UnknownSlot {
        hospital_id: String,
        date: NaiveDate,
        slot: String,
    },

    #[error("Invalid schedule configuration: {0}")]
    InvalidSchedule(String),
}

/// `HH:MM` wall-clock times; `HH:MM:SS` is also accepted on input.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveTime, String> {
        let trimmed = raw.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map_err(|_| format!("invalid time '{}', expected HH:MM", raw))
    }
}
