// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_utils::dates::deserialize_calendar_date;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// One row of the booking ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub reference_number: String,
    pub hospital_id: String,
    pub appointment_date: NaiveDate,
    /// Stable slot id from the schedule catalog; the occupancy join key.
    pub slot_id: String,
    pub time_slot_label: String,
    /// Seat held inside the slot, `1..=slot_capacity` while not cancelled.
    pub slot_ordinal: u32,
    pub slot_capacity: u32,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub doctor_notes: Option<String>,
    #[serde(flatten)]
    pub patient: PatientDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            hospital_id: self.hospital_id.clone(),
            date: self.appointment_date,
            slot_id: self.slot_id.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    #[serde(rename = "no-show", alias = "no_show", alias = "noshow")]
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
            "no-show" | "no_show" | "noshow" => Ok(AppointmentStatus::NoShow),
            other => Err(format!("unknown appointment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientDetails {
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    pub patient_age: u8,
    pub gender: Gender,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PatientDetails {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.patient_name.trim().len() < 2 {
            return Err(BookingError::Validation("Patient name must be at least 2 characters".to_string()));
        }

        let email = self.patient_email.trim();
        let valid_email = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'));
        if !valid_email {
            return Err(BookingError::Validation("Patient email is not a valid address".to_string()));
        }

        let digits = self.patient_phone.chars().filter(|c| c.is_ascii_digit()).count();
        if digits < 7 {
            return Err(BookingError::Validation("Patient phone number is too short".to_string()));
        }

        if self.patient_age > 120 {
            return Err(BookingError::Validation("Patient age must be between 0 and 120".to_string()));
        }

        Ok(())
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    #[serde(alias = "hospital_id", alias = "hospitalId")]
    pub hospital: String,
    #[serde(
        alias = "appointment_date",
        alias = "appointmentDate",
        deserialize_with = "deserialize_calendar_date"
    )]
    pub date: NaiveDate,
    #[serde(alias = "appointmentTime", alias = "time_slot", alias = "time")]
    pub appointment_time: String,
    #[serde(flatten)]
    pub patient: PatientDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotRequest {
    #[serde(deserialize_with = "deserialize_calendar_date")]
    pub date: NaiveDate,
    #[serde(alias = "time_slot", alias = "timeSlot")]
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkAvailabilityRequest {
    #[serde(alias = "hospitalId", alias = "hospital")]
    pub hospital_id: String,
    #[serde(alias = "dateTimeSlots")]
    pub date_time_slots: Vec<SlotRequest>,
}

/// Staff update: a lifecycle transition, doctor notes, or both.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    #[serde(alias = "doctorNotes")]
    pub doctor_notes: Option<String>,
}

/// Ledger totals for the staff overview. `today` and `upcoming` include every status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppointmentStats {
    pub total_appointments: u64,
    pub pending_appointments: u64,
    pub confirmed_appointments: u64,
    pub completed_appointments: u64,
    pub cancelled_appointments: u64,
    pub no_show_appointments: u64,
    pub today_appointments: u64,
    pub upcoming_appointments: u64,
}

impl AppointmentStats {
    fn status_count_mut(&mut self, status: AppointmentStatus) -> &mut u64 {
        match status {
            AppointmentStatus::Pending => &mut self.pending_appointments,
            AppointmentStatus::Confirmed => &mut self.confirmed_appointments,
            AppointmentStatus::Completed => &mut self.completed_appointments,
            AppointmentStatus::Cancelled => &mut self.cancelled_appointments,
            AppointmentStatus::NoShow => &mut self.no_show_appointments,
        }
    }

    pub fn record(&mut self, status: AppointmentStatus, date: NaiveDate, today: NaiveDate) {
        self.total_appointments += 1;
        *self.status_count_mut(status) += 1;
        if date == today {
            self.today_appointments += 1;
        } else if date > today {
            self.upcoming_appointments += 1;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub date: Option<NaiveDate>,
    pub hospital_id: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub limit: u32,
    pub offset: u32,
}

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

/// Identity of one capacity-limited slot on one date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub hospital_id: String,
    pub date: NaiveDate,
    pub slot_id: String,
}

/// Grouped ledger count for one (date, slot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBucket {
    pub date: NaiveDate,
    pub slot_id: String,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Full,
    Closed,
    UnknownSlot,
    HospitalNotFound,
}

/// Derived occupancy for one slot. Recomputed from the ledger on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityView {
    pub hospital_id: String,
    pub date: NaiveDate,
    /// The slot's display label when resolved, otherwise the caller's input.
    pub time: String,
    pub slot_id: Option<String>,
    pub max_capacity: u32,
    pub current_bookings: u32,
    pub available_slots: u32,
    pub is_available: bool,
    pub status: SlotStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub day_name: String,
    pub is_past: bool,
    pub is_closed: bool,
    pub is_bookable: bool,
    pub closed_reason: Option<String>,
    pub total_slots: u32,
    pub total_capacity: u32,
    pub used_capacity: u32,
    pub available_capacity: u32,
    pub slots: Vec<AvailabilityView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub slot_id: String,
    pub time_slot_label: String,
    pub max_capacity: u32,
    pub current_bookings: u32,
    pub remaining_slots: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingReceipt {
    pub booking: Booking,
    pub slot_info: SlotInfo,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Hospital not found: {0}")]
    HospitalNotFound(String),

    #[error("{0}")]
    HospitalClosed(String),

    #[error("{0}")]
    UnknownSlot(String),

    #[error("This time slot is fully booked ({current_bookings}/{max_capacity})")]
    CapacityExceeded { current_bookings: u32, max_capacity: u32 },

    #[error("This time slot was filled by a concurrent booking ({current_bookings}/{max_capacity})")]
    RaceConditionDetected { current_bookings: u32, max_capacity: u32 },

    #[error("Appointment not found")]
    NotFound,

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Booking timed out before it could be confirmed")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Only failures caused by contention or infrastructure are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::RaceConditionDetected { .. } | BookingError::Timeout | BookingError::Internal(_)
        )
    }
}
