// libs/appointment-cell/src/services/availability.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use schedule_cell::{CatalogError, Clock, ScheduleCatalog, ScheduleEntry, SlotDefinition};

use crate::models::{AvailabilityView, BookingError, DaySummary, SlotBucket, SlotKey, SlotRequest, SlotStatus};
use crate::services::calendar::summarize_day;
use crate::services::ledger::BookingLedger;
use crate::state::AppointmentState;

/// Occupancy lookup built from one grouped range query.
#[derive(Debug, Default, Clone)]
pub struct SlotCounts(HashMap<(NaiveDate, String), u32>);

impl SlotCounts {
    pub fn from_buckets(buckets: Vec<SlotBucket>) -> Self {
        Self(
            buckets
                .into_iter()
                .map(|bucket| ((bucket.date, bucket.slot_id), bucket.count))
                .collect(),
        )
    }

    /// Zero when the ledger had no rows for the slot.
    pub fn get(&self, date: NaiveDate, slot_id: &str) -> u32 {
        self.0.get(&(date, slot_id.to_string())).copied().unwrap_or(0)
    }
}

pub struct AvailabilityService {
    catalog: Arc<ScheduleCatalog>,
    ledger: Arc<dyn BookingLedger>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            catalog: Arc::clone(&state.catalog),
            ledger: Arc::clone(&state.ledger),
            clock: Arc::clone(&state.clock),
        }
    }

    /// Live occupancy of one slot. Unknown hospitals, closed days and unknown
    /// slots come back as unavailable views rather than errors.
    pub async fn check_availability(
        &self,
        hospital_ref: &str,
        date: NaiveDate,
        slot_ref: &str,
    ) -> Result<AvailabilityView, BookingError> {
        let Some(entry) = self.catalog.resolve_hospital(hospital_ref) else {
            return Ok(hospital_not_found_view(hospital_ref, date, slot_ref));
        };

        let slot = match resolve_slot(&self.catalog, entry, date, slot_ref) {
            Ok(slot) => slot,
            Err(view) => return Ok(view),
        };

        let key = SlotKey {
            hospital_id: entry.hospital_id.clone(),
            date,
            slot_id: slot.id.clone(),
        };
        let count = self.ledger.count_active(&key).await?;

        debug!("{} {} {}: {}/{}", entry.hospital_id, date, slot.id, count, entry.capacity_per_slot);
        Ok(slot_view(entry, date, slot, count))
    }

    /// Same answers as `check_availability` for each pair, in input order, backed
    /// by a single ledger query over the inclusive date bounds of the request.
    pub async fn check_bulk_availability(
        &self,
        hospital_ref: &str,
        requests: &[SlotRequest],
    ) -> Result<Vec<AvailabilityView>, BookingError> {
        let Some(entry) = self.catalog.resolve_hospital(hospital_ref) else {
            return Ok(requests
                .iter()
                .map(|request| hospital_not_found_view(hospital_ref, request.date, &request.time))
                .collect());
        };

        let resolved: Vec<Result<&SlotDefinition, AvailabilityView>> = requests
            .iter()
            .map(|request| resolve_slot(&self.catalog, entry, request.date, &request.time))
            .collect();

        let bounds = requests
            .iter()
            .zip(&resolved)
            .filter(|(_, slot)| slot.is_ok())
            .map(|(request, _)| request.date)
            .fold(None, |acc: Option<(NaiveDate, NaiveDate)>, date| match acc {
                None => Some((date, date)),
                Some((from, to)) => Some((from.min(date), to.max(date))),
            });

        let counts = match bounds {
            Some((from, to)) => self.range_counts(&entry.hospital_id, from, to).await?,
            None => SlotCounts::default(),
        };

        Ok(requests
            .iter()
            .zip(resolved)
            .map(|(request, slot)| match slot {
                Ok(slot) => slot_view(entry, request.date, slot, counts.get(request.date, &slot.id)),
                Err(view) => view,
            })
            .collect())
    }

    /// Every slot of one date with live counts.
    pub async fn day_availability(&self, hospital_ref: &str, date: NaiveDate) -> Result<DaySummary, BookingError> {
        let entry = self
            .catalog
            .resolve_hospital(hospital_ref)
            .ok_or_else(|| BookingError::HospitalNotFound(hospital_ref.to_string()))?;

        let counts = self.range_counts(&entry.hospital_id, date, date).await?;
        Ok(summarize_day(&self.catalog, entry, date, self.clock.today(), &counts))
    }

    /// The grouped range query behind bulk checks and the calendar.
    pub async fn range_buckets(&self, hospital_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<SlotBucket>, BookingError> {
        Ok(self.ledger.slot_counts_in_range(hospital_id, from, to).await?)
    }

    pub async fn range_counts(&self, hospital_id: &str, from: NaiveDate, to: NaiveDate) -> Result<SlotCounts, BookingError> {
        let buckets = self.range_buckets(hospital_id, from, to).await?;
        Ok(SlotCounts::from_buckets(buckets))
    }
}

pub(crate) fn resolve_slot<'a>(
    catalog: &'a ScheduleCatalog,
    entry: &ScheduleEntry,
    date: NaiveDate,
    slot_ref: &str,
) -> Result<&'a SlotDefinition, AvailabilityView> {
    match catalog.find_slot(&entry.hospital_id, date, slot_ref) {
        Ok((_, slot)) => Ok(slot),
        Err(CatalogError::Closed { reason, .. }) => Err(unavailable_view(
            &entry.hospital_id,
            date,
            slot_ref,
            SlotStatus::Closed,
            reason,
        )),
        Err(CatalogError::HospitalNotFound(_)) => Err(hospital_not_found_view(&entry.hospital_id, date, slot_ref)),
        Err(other) => Err(unavailable_view(
            &entry.hospital_id,
            date,
            slot_ref,
            SlotStatus::UnknownSlot,
            other.to_string(),
        )),
    }
}

pub(crate) fn slot_view(entry: &ScheduleEntry, date: NaiveDate, slot: &SlotDefinition, count: u32) -> AvailabilityView {
    let capacity = entry.capacity_per_slot;
    let remaining = capacity.saturating_sub(count);
    let is_available = remaining > 0;

    AvailabilityView {
        hospital_id: entry.hospital_id.clone(),
        date,
        time: slot.display_label.clone(),
        slot_id: Some(slot.id.clone()),
        max_capacity: capacity,
        current_bookings: count,
        available_slots: remaining,
        is_available,
        status: if is_available { SlotStatus::Available } else { SlotStatus::Full },
        reason: if is_available { None } else { Some("This time slot is fully booked".to_string()) },
    }
}

fn hospital_not_found_view(hospital_ref: &str, date: NaiveDate, slot_ref: &str) -> AvailabilityView {
    unavailable_view(
        hospital_ref,
        date,
        slot_ref,
        SlotStatus::HospitalNotFound,
        "hospital not found".to_string(),
    )
}

fn unavailable_view(
    hospital_id: &str,
    date: NaiveDate,
    slot_ref: &str,
    status: SlotStatus,
    reason: String,
) -> AvailabilityView {
    AvailabilityView {
        hospital_id: hospital_id.to_string(),
        date,
        time: slot_ref.to_string(),
        slot_id: None,
        max_capacity: 0,
        current_bookings: 0,
        available_slots: 0,
        is_available: false,
        status,
        reason: Some(reason),
    }
}
