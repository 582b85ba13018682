// libs/appointment-cell/src/services/calendar.rs
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{debug, instrument};

use schedule_cell::{Clock, DayOfWeek, ScheduleCatalog, ScheduleEntry};

use crate::models::{BookingError, DaySummary};
use crate::services::availability::{slot_view, AvailabilityService, SlotCounts};
use crate::services::cache::{AvailabilityCache, CacheLookup};
use crate::state::AppointmentState;

pub struct CalendarService {
    catalog: Arc<ScheduleCatalog>,
    cache: Arc<AvailabilityCache>,
    clock: Arc<dyn Clock>,
    availability: AvailabilityService,
}

impl CalendarService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            catalog: Arc::clone(&state.catalog),
            cache: Arc::clone(&state.cache),
            clock: Arc::clone(&state.clock),
            availability: AvailabilityService::new(state),
        }
    }

    /// One summary per day from `start`, using a single grouped ledger query for
    /// the whole range (or a fresh cached copy of it).
    #[instrument(skip(self))]
    pub async fn build_calendar(
        &self,
        hospital_ref: &str,
        start: NaiveDate,
        num_days: u32,
    ) -> Result<Vec<DaySummary>, BookingError> {
        let entry = self
            .catalog
            .resolve_hospital(hospital_ref)
            .ok_or_else(|| BookingError::HospitalNotFound(hospital_ref.to_string()))?;

        if num_days == 0 {
            return Ok(Vec::new());
        }

        let end = start
            .checked_add_days(Days::new(u64::from(num_days - 1)))
            .ok_or_else(|| BookingError::Validation("Calendar range is out of bounds".to_string()))?;

        let counts = match self.cache.lookup(&entry.hospital_id, start, end).await {
            CacheLookup::Hit(buckets) => {
                debug!("Calendar cache hit for {} {}..={}", entry.hospital_id, start, end);
                SlotCounts::from_buckets(buckets)
            }
            CacheLookup::Miss(stamp) => {
                let buckets = self
                    .availability
                    .range_buckets(&entry.hospital_id, start, end)
                    .await?;
                let counts = SlotCounts::from_buckets(buckets.clone());
                self.cache.put(&entry.hospital_id, stamp, start, end, buckets).await;
                counts
            }
            CacheLookup::Unavailable => self.availability.range_counts(&entry.hospital_id, start, end).await?,
        };

        let today = self.clock.today();
        Ok(start
            .iter_days()
            .take(num_days as usize)
            .map(|date| summarize_day(&self.catalog, entry, date, today, &counts))
            .collect())
    }
}

/// Rolls one date up from range counts. `is_past` compares calendar days only.
pub(crate) fn summarize_day(
    catalog: &ScheduleCatalog,
    entry: &ScheduleEntry,
    date: NaiveDate,
    today: NaiveDate,
    counts: &SlotCounts,
) -> DaySummary {
    let day = DayOfWeek::of(date);
    let is_past = date < today;
    let within_window = today
        .checked_add_days(Days::new(u64::from(entry.advance_booking_days)))
        .map_or(true, |limit| date <= limit);

    match catalog.get_slots_for_day(&entry.hospital_id, date) {
        Ok(slots) => {
            let views: Vec<_> = slots
                .iter()
                .map(|slot| slot_view(entry, date, slot, counts.get(date, &slot.id)))
                .collect();

            let total_slots = views.len() as u32;
            let total_capacity = total_slots.saturating_mul(entry.capacity_per_slot);
            let used_capacity = views
                .iter()
                .map(|v| v.current_bookings.min(v.max_capacity))
                .fold(0u32, u32::saturating_add);

            DaySummary {
                date,
                day_name: day.name().to_string(),
                is_past,
                is_closed: false,
                is_bookable: !is_past && within_window,
                closed_reason: None,
                total_slots,
                total_capacity,
                used_capacity,
                available_capacity: total_capacity.saturating_sub(used_capacity),
                slots: views,
            }
        }
        Err(reason) => DaySummary {
            date,
            day_name: day.name().to_string(),
            is_past,
            is_closed: true,
            is_bookable: false,
            closed_reason: Some(reason.to_string()),
            total_slots: 0,
            total_capacity: 0,
            used_capacity: 0,
            available_capacity: 0,
            slots: Vec::new(),
        },
    }
}
