// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Days, NaiveDate, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use schedule_cell::{CatalogError, Clock, ScheduleCatalog, ScheduleEntry, SlotDefinition};
use shared_utils::reference::{generate_reference_number, is_valid_reference_number};

use crate::models::{
    AppointmentFilter, AppointmentStats, AppointmentStatus, Booking, BookingError, BookingReceipt, PatientDetails,
    SlotInfo, SlotKey,
};
use crate::services::cache::AvailabilityCache;
use crate::services::ledger::{BookingLedger, LedgerError};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::state::AppointmentState;

const STATUS_UPDATE_ATTEMPTS: u32 = 3;

/// Reserves slot capacity and owns every write to the ledger.
///
/// Capacity is protected by per-slot ordinals: each live booking holds a distinct
/// ordinal in `1..=capacity`, and the ledger refuses a second live row with the
/// same ordinal. Concurrent attempts for the last seat race on one ordinal and
/// exactly one insert wins.
pub struct BookingService {
    catalog: Arc<ScheduleCatalog>,
    ledger: Arc<dyn BookingLedger>,
    cache: Arc<AvailabilityCache>,
    clock: Arc<dyn Clock>,
    lifecycle: AppointmentLifecycleService,
    timeout: Duration,
}

impl BookingService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            catalog: Arc::clone(&state.catalog),
            ledger: Arc::clone(&state.ledger),
            cache: Arc::clone(&state.cache),
            clock: Arc::clone(&state.clock),
            lifecycle: AppointmentLifecycleService::new(),
            timeout: Duration::from_millis(state.config.booking_timeout_ms),
        }
    }

    #[instrument(skip(self, patient))]
    pub async fn attempt_booking(
        &self,
        hospital_ref: &str,
        date: NaiveDate,
        slot_ref: &str,
        patient: PatientDetails,
    ) -> Result<BookingReceipt, BookingError> {
        patient.validate()?;

        let entry = self.catalog.get_schedule(hospital_ref).map_err(catalog_error)?;

        // A closed day is rejected before anything else, whatever the occupancy.
        self.catalog
            .get_slots_for_day(&entry.hospital_id, date)
            .map_err(catalog_error)?;

        let today = self.clock.today();
        validate_booking_date(entry, date, today)?;

        let (_, slot) = self
            .catalog
            .find_slot(&entry.hospital_id, date, slot_ref)
            .map_err(catalog_error)?;

        // The row id is fixed up front so an attempt cut off after its insert can be undone.
        let booking_id = Uuid::new_v4();

        match tokio::time::timeout(self.timeout, self.reserve(booking_id, entry, slot, date, today, patient)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Booking for {} {} {} did not finish within {:?}",
                    entry.hospital_id, date, slot.id, self.timeout
                );
                self.discard_unconfirmed(booking_id).await;
                Err(BookingError::Timeout)
            }
        }
    }

    /// Removes the row of a timed-out attempt, if its insert got through, so that a
    /// retry after `Timeout` cannot leave the patient holding two seats.
    async fn discard_unconfirmed(&self, booking_id: Uuid) {
        match tokio::time::timeout(self.timeout, self.ledger.remove(booking_id)).await {
            Ok(Ok(())) => warn!("Removed booking {} left behind by a timed-out attempt", booking_id),
            Ok(Err(LedgerError::NotFound)) => {}
            Ok(Err(e)) => error!("Could not remove booking {} after timeout: {}", booking_id, e),
            Err(_) => error!("Removing booking {} after timeout also timed out", booking_id),
        }
    }

    async fn reserve(
        &self,
        booking_id: Uuid,
        entry: &ScheduleEntry,
        slot: &SlotDefinition,
        date: NaiveDate,
        today: NaiveDate,
        patient: PatientDetails,
    ) -> Result<BookingReceipt, BookingError> {
        let key = SlotKey {
            hospital_id: entry.hospital_id.clone(),
            date,
            slot_id: slot.id.clone(),
        };
        let capacity = entry.capacity_per_slot;
        let mut reference = generate_reference_number(today.year());

        for attempt in 1..=capacity.saturating_add(1) {
            let occupied = self.ledger.occupied_ordinals(&key).await?;
            let current = occupied.len() as u32;

            let ordinal = match lowest_free_ordinal(&occupied, capacity) {
                Some(ordinal) if current < capacity => ordinal,
                _ => {
                    info!("Slot {} on {} is full ({}/{})", slot.id, date, current, capacity);
                    return Err(BookingError::CapacityExceeded {
                        current_bookings: current.min(capacity),
                        max_capacity: capacity,
                    });
                }
            };

            let booking = new_booking(booking_id, entry, slot, date, ordinal, reference.clone(), patient.clone());

            match self.ledger.insert(&booking).await {
                Ok(saved) => return self.confirm(saved, &key, slot, capacity).await,
                Err(LedgerError::OrdinalTaken { ordinal }) => {
                    debug!("Ordinal {} of {} taken on attempt {}, re-reading", ordinal, slot.id, attempt);
                }
                Err(LedgerError::DuplicateReference) => {
                    debug!("Reference {} already used, generating another", reference);
                    reference = generate_reference_number(today.year());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let current = self.ledger.count_active(&key).await?;
        warn!("Gave up on {} {} after repeated ordinal collisions", slot.id, date);
        Err(BookingError::RaceConditionDetected {
            current_bookings: current,
            max_capacity: capacity,
        })
    }

    /// Post-insert recount. A row that pushed the slot over capacity is removed again.
    async fn confirm(
        &self,
        saved: Booking,
        key: &SlotKey,
        slot: &SlotDefinition,
        capacity: u32,
    ) -> Result<BookingReceipt, BookingError> {
        let final_count = self.ledger.count_active(key).await?;

        if final_count > capacity {
            warn!(
                "Slot {} on {} over capacity after insert ({}/{}), rolling back {}",
                key.slot_id, key.date, final_count, capacity, saved.id
            );
            self.ledger.remove(saved.id).await?;
            return Err(BookingError::RaceConditionDetected {
                current_bookings: final_count.saturating_sub(1),
                max_capacity: capacity,
            });
        }

        self.cache.invalidate(&key.hospital_id).await;

        info!(
            "Booked {} at {} {} {} (ordinal {}, {}/{})",
            saved.reference_number, key.hospital_id, key.date, slot.id, saved.slot_ordinal, final_count, capacity
        );

        Ok(BookingReceipt {
            slot_info: SlotInfo {
                slot_id: slot.id.clone(),
                time_slot_label: slot.display_label.clone(),
                max_capacity: capacity,
                current_bookings: final_count,
                remaining_slots: capacity.saturating_sub(final_count),
            },
            booking: saved,
        })
    }

    pub async fn get_appointment(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.ledger.get(id).await?.ok_or(BookingError::NotFound)
    }

    pub async fn track_appointment(&self, reference: &str) -> Result<Booking, BookingError> {
        let reference = reference.trim().to_ascii_uppercase();
        if !is_valid_reference_number(&reference) {
            return Err(BookingError::Validation(format!("'{}' is not a valid reference number", reference)));
        }

        self.ledger
            .find_by_reference(&reference)
            .await?
            .ok_or(BookingError::NotFound)
    }

    pub async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Booking>, BookingError> {
        Ok(self.ledger.list(filter).await?)
    }

    /// Applies a lifecycle transition as a compare-and-set on the current status.
    pub async fn update_status(&self, id: Uuid, new_status: AppointmentStatus) -> Result<Booking, BookingError> {
        self.update_appointment(id, Some(new_status), None).await
    }

    /// Staff update: an optional lifecycle transition plus optional doctor notes.
    /// Without a status the current one is kept and only the notes change.
    pub async fn update_appointment(
        &self,
        id: Uuid,
        new_status: Option<AppointmentStatus>,
        doctor_notes: Option<String>,
    ) -> Result<Booking, BookingError> {
        if new_status.is_none() && doctor_notes.is_none() {
            return Err(BookingError::Validation("Provide a status or doctor notes to update".to_string()));
        }

        for attempt in 1..=STATUS_UPDATE_ATTEMPTS {
            let current = self.get_appointment(id).await?;
            let target = match new_status {
                Some(status) => {
                    self.lifecycle.validate_status_transition(current.status, status)?;
                    status
                }
                None => current.status,
            };

            match self
                .ledger
                .update_status(id, current.status, target, doctor_notes.as_deref())
                .await
            {
                Ok(updated) => {
                    if target == AppointmentStatus::Cancelled && current.status != target {
                        // Counts skip cancelled rows, so the seat is free from here on.
                        self.cache.invalidate(&updated.hospital_id).await;
                    }
                    info!("Appointment {} updated {} -> {}", id, current.status, target);
                    return Ok(updated);
                }
                Err(LedgerError::StatusChanged) => {
                    debug!("Status of {} changed underneath update (attempt {})", id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BookingError::Internal(format!(
            "Status of appointment {} kept changing during update",
            id
        )))
    }

    pub async fn cancel_appointment(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.update_status(id, AppointmentStatus::Cancelled).await
    }

    /// Overview counts, for every hospital or for the one `hospital_ref` names.
    pub async fn appointment_stats(&self, hospital_ref: Option<&str>) -> Result<AppointmentStats, BookingError> {
        let hospital_id = match hospital_ref {
            Some(reference) => Some(
                self.catalog
                    .get_schedule(reference)
                    .map_err(catalog_error)?
                    .hospital_id
                    .clone(),
            ),
            None => None,
        };

        Ok(self.ledger.stats(hospital_id.as_deref(), self.clock.today()).await?)
    }
}

fn catalog_error(error: CatalogError) -> BookingError {
    match error {
        CatalogError::HospitalNotFound(reference) => BookingError::HospitalNotFound(reference),
        CatalogError::Closed { reason, .. } => BookingError::HospitalClosed(reason),
        CatalogError::UnknownSlot { .. } => BookingError::UnknownSlot(error.to_string()),
        CatalogError::InvalidSchedule(message) => BookingError::Internal(message),
    }
}

fn validate_booking_date(entry: &ScheduleEntry, date: NaiveDate, today: NaiveDate) -> Result<(), BookingError> {
    if date < today {
        return Err(BookingError::Validation("Cannot book appointments in the past".to_string()));
    }

    let beyond_window = today
        .checked_add_days(Days::new(u64::from(entry.advance_booking_days)))
        .is_some_and(|limit| date > limit);
    if beyond_window {
        return Err(BookingError::Validation(format!(
            "Appointments can only be booked up to {} days in advance",
            entry.advance_booking_days
        )));
    }

    Ok(())
}

fn lowest_free_ordinal(occupied: &[u32], capacity: u32) -> Option<u32> {
    (1..=capacity).find(|ordinal| !occupied.contains(ordinal))
}

fn new_booking(
    id: Uuid,
    entry: &ScheduleEntry,
    slot: &SlotDefinition,
    date: NaiveDate,
    ordinal: u32,
    reference_number: String,
    patient: PatientDetails,
) -> Booking {
    let now = Utc::now();
    Booking {
        id,
        reference_number,
        hospital_id: entry.hospital_id.clone(),
        appointment_date: date,
        slot_id: slot.id.clone(),
        time_slot_label: slot.display_label.clone(),
        slot_ordinal: ordinal,
        slot_capacity: entry.capacity_per_slot,
        status: AppointmentStatus::Pending,
        doctor_notes: None,
        patient,
        created_at: now,
        updated_at: now,
    }
}
