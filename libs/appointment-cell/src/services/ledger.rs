// libs/appointment-cell/src/services/ledger.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    AppointmentFilter, AppointmentStats, AppointmentStatus, Booking, BookingError, SlotBucket, SlotKey,
};

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Slot ordinal {ordinal} is already held")]
    OrdinalTaken { ordinal: u32 },

    #[error("Reference number already exists")]
    DuplicateReference,

    #[error("Booking status changed concurrently")]
    StatusChanged,

    #[error("Booking not found")]
    NotFound,

    #[error("Row rejected by ledger constraint: {0}")]
    Rejected(String),

    #[error("Ledger unavailable: {0}")]
    Database(String),
}

impl From<LedgerError> for BookingError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::NotFound => BookingError::NotFound,
            other => BookingError::Internal(other.to_string()),
        }
    }
}

/// Durable appointment store and the only source of slot occupancy.
///
/// Implementations must enforce, atomically per row, that no two non-cancelled
/// bookings share `(hospital_id, appointment_date, slot_id, slot_ordinal)` and that
/// `slot_ordinal` lies in `1..=slot_capacity`. Capacity safety rests on that rule,
/// not on any isolation level.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Ordinals held by non-cancelled bookings of the slot.
    async fn occupied_ordinals(&self, key: &SlotKey) -> Result<Vec<u32>, LedgerError>;

    async fn count_active(&self, key: &SlotKey) -> Result<u32, LedgerError>;

    /// Non-cancelled counts for every (date, slot) of a hospital within `from..=to`,
    /// fetched with a single query. Empty slots are absent.
    async fn slot_counts_in_range(
        &self,
        hospital_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SlotBucket>, LedgerError>;

    async fn insert(&self, booking: &Booking) -> Result<Booking, LedgerError>;

    async fn remove(&self, id: Uuid) -> Result<(), LedgerError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, LedgerError>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, LedgerError>;

    /// Compare-and-set on status. `StatusChanged` when the row no longer has `expected`.
    /// `doctor_notes` replaces the stored notes when given and leaves them alone otherwise.
    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
        doctor_notes: Option<&str>,
    ) -> Result<Booking, LedgerError>;

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Booking>, LedgerError>;

    /// Totals over every row, optionally for one hospital, relative to `today`.
    async fn stats(&self, hospital_id: Option<&str>, today: NaiveDate) -> Result<AppointmentStats, LedgerError>;
}

pub fn effective_limit(filter: &AppointmentFilter) -> u32 {
    match filter.limit {
        0 => DEFAULT_LIST_LIMIT,
        limit => limit.min(MAX_LIST_LIMIT),
    }
}
