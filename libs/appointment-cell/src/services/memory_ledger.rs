// libs/appointment-cell/src/services/memory_ledger.rs
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::models::{AppointmentFilter, AppointmentStats, AppointmentStatus, Booking, SlotBucket, SlotKey};
use crate::services::ledger::{effective_limit, BookingLedger, LedgerError};

/// Process-local ledger for development and tests.
///
/// Every call takes the table lock once, so each insert checks the ordinal and
/// reference rules and writes the row as one step, as a unique index would.
#[derive(Default)]
pub struct InMemoryLedger {
    rows: Mutex<Vec<Booking>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

fn matches_key(row: &Booking, key: &SlotKey) -> bool {
    row.is_active()
        && row.hospital_id == key.hospital_id
        && row.appointment_date == key.date
        && row.slot_id == key.slot_id
}

#[async_trait]
impl BookingLedger for InMemoryLedger {
    async fn occupied_ordinals(&self, key: &SlotKey) -> Result<Vec<u32>, LedgerError> {
        let rows = self.rows.lock().await;
        let mut ordinals: Vec<u32> = rows
            .iter()
            .filter(|row| matches_key(row, key))
            .map(|row| row.slot_ordinal)
            .collect();
        ordinals.sort_unstable();
        Ok(ordinals)
    }

    async fn count_active(&self, key: &SlotKey) -> Result<u32, LedgerError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().filter(|row| matches_key(row, key)).count() as u32)
    }

    async fn slot_counts_in_range(
        &self,
        hospital_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SlotBucket>, LedgerError> {
        let rows = self.rows.lock().await;
        let mut buckets: BTreeMap<(NaiveDate, String), u32> = BTreeMap::new();

        for row in rows.iter().filter(|row| {
            row.is_active()
                && row.hospital_id == hospital_id
                && row.appointment_date >= from
                && row.appointment_date <= to
        }) {
            *buckets.entry((row.appointment_date, row.slot_id.clone())).or_default() += 1;
        }

        Ok(buckets
            .into_iter()
            .map(|((date, slot_id), count)| SlotBucket { date, slot_id, count })
            .collect())
    }

    async fn insert(&self, booking: &Booking) -> Result<Booking, LedgerError> {
        let mut rows = self.rows.lock().await;

        if booking.slot_ordinal == 0 || booking.slot_ordinal > booking.slot_capacity {
            return Err(LedgerError::Rejected(format!(
                "slot_ordinal {} outside 1..={}",
                booking.slot_ordinal, booking.slot_capacity
            )));
        }

        if rows.iter().any(|row| row.reference_number == booking.reference_number) {
            return Err(LedgerError::DuplicateReference);
        }

        if booking.is_active() {
            let key = booking.key();
            if rows
                .iter()
                .any(|row| matches_key(row, &key) && row.slot_ordinal == booking.slot_ordinal)
            {
                return Err(LedgerError::OrdinalTaken { ordinal: booking.slot_ordinal });
            }
        }

        debug!("In-memory ledger insert {} ordinal {}", booking.slot_id, booking.slot_ordinal);
        rows.push(booking.clone());
        Ok(booking.clone())
    }

    async fn remove(&self, id: Uuid) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        if rows.len() == before {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, LedgerError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|row| row.id == id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, LedgerError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|row| row.reference_number.eq_ignore_ascii_case(reference))
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
        doctor_notes: Option<&str>,
    ) -> Result<Booking, LedgerError> {
        let mut rows = self.rows.lock().await;
        let row = rows.iter_mut().find(|row| row.id == id).ok_or(LedgerError::NotFound)?;

        if row.status != expected {
            return Err(LedgerError::StatusChanged);
        }

        row.status = new_status;
        if let Some(notes) = doctor_notes {
            row.doctor_notes = Some(notes.to_string());
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Booking>, LedgerError> {
        let rows = self.rows.lock().await;
        let mut matching: Vec<&Booking> = rows
            .iter()
            .filter(|row| filter.date.map_or(true, |date| row.appointment_date == date))
            .filter(|row| filter.hospital_id.as_deref().map_or(true, |id| row.hospital_id == id))
            .filter(|row| filter.status.map_or(true, |status| row.status == status))
            .collect();

        matching.sort_by(|a, b| {
            a.appointment_date
                .cmp(&b.appointment_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        Ok(matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(effective_limit(filter) as usize)
            .cloned()
            .collect())
    }

    async fn stats(&self, hospital_id: Option<&str>, today: NaiveDate) -> Result<AppointmentStats, LedgerError> {
        let rows = self.rows.lock().await;
        let mut stats = AppointmentStats::default();
        for row in rows
            .iter()
            .filter(|row| hospital_id.map_or(true, |id| row.hospital_id == id))
        {
            stats.record(row.status, row.appointment_date, today);
        }
        Ok(stats)
    }
}
