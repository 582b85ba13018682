// libs/schedule-cell/src/services/catalog.rs
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::models::{
    hhmm, CatalogError, CatalogFile, DayOfWeek, DayScheduleConfig, HospitalScheduleConfig,
    ScheduleEntry, SlotDefinition,
};
use crate::services::defaults;

/// Read-only hospital schedule lookup. Built once at startup; never mutated at request time.
#[derive(Debug, Clone)]
pub struct ScheduleCatalog {
    entries: Vec<ScheduleEntry>,
    lookup: HashMap<String, usize>,
    closure_day: Option<DayOfWeek>,
}

impl ScheduleCatalog {
    pub fn from_config(file: CatalogFile, closure_day: Option<DayOfWeek>) -> Result<Self, CatalogError> {
        let mut entries = Vec::with_capacity(file.hospitals.len());
        let mut lookup = HashMap::new();

        for hospital in file.hospitals {
            let entry = build_entry(hospital, closure_day)?;
            let index = entries.len();

            for key in lookup_keys(&entry) {
                if let Some(previous) = lookup.insert(key.clone(), index) {
                    if previous != index {
                        return Err(CatalogError::InvalidSchedule(format!(
                            "hospital reference '{}' is claimed by more than one hospital",
                            key
                        )));
                    }
                }
            }

            entries.push(entry);
        }

        info!("Schedule catalog ready with {} hospitals", entries.len());
        Ok(Self { entries, lookup, closure_day })
    }

    pub fn from_json_str(raw: &str, closure_day: Option<DayOfWeek>) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw)
            .context("schedule catalog is not valid JSON")?;
        Ok(Self::from_config(file, closure_day)?)
    }

    pub fn load(path: impl AsRef<Path>, closure_day: Option<DayOfWeek>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schedule catalog {}", path.display()))?;
        Self::from_json_str(&raw, closure_day)
            .with_context(|| format!("failed to load schedule catalog {}", path.display()))
    }

    pub fn builtin(closure_day: Option<DayOfWeek>) -> Result<Self> {
        Self::from_json_str(defaults::BUILTIN_CATALOG, closure_day)
            .context("built-in schedule catalog is invalid")
    }

    /// Loads the configured catalog file, or the built-in hospitals when none is set.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let closure_day = match config.weekly_closure_day.as_deref() {
            Some(day) => Some(day.parse::<DayOfWeek>().map_err(anyhow::Error::msg)?),
            None => None,
        };

        match &config.schedule_config_path {
            Some(path) => Self::load(path, closure_day),
            None => {
                debug!("SCHEDULE_CONFIG_PATH not set, using built-in catalog");
                Self::builtin(closure_day)
            }
        }
    }

    pub fn closure_day(&self) -> Option<DayOfWeek> {
        self.closure_day
    }

    pub fn hospitals(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Matches id, display name, aliases and `<id> hospital`, ignoring case and spacing.
    pub fn resolve_hospital(&self, reference: &str) -> Option<&ScheduleEntry> {
        self.lookup
            .get(&normalize(reference))
            .and_then(|index| self.entries.get(*index))
    }

    pub fn get_schedule(&self, reference: &str) -> Result<&ScheduleEntry, CatalogError> {
        self.resolve_hospital(reference)
            .ok_or_else(|| CatalogError::HospitalNotFound(reference.to_string()))
    }

    pub fn get_slots_for_day(&self, reference: &str, date: NaiveDate) -> Result<&[SlotDefinition], CatalogError> {
        self.slots_for_weekday(reference, DayOfWeek::of(date))
    }

    pub fn slots_for_weekday(&self, reference: &str, day: DayOfWeek) -> Result<&[SlotDefinition], CatalogError> {
        let entry = self.get_schedule(reference)?;
        slots_of(entry, day, self.closure_day)
    }

    /// Resolves a slot named by stable id, display label, or `HH:MM` start time.
    pub fn find_slot(
        &self,
        reference: &str,
        date: NaiveDate,
        slot_reference: &str,
    ) -> Result<(&ScheduleEntry, &SlotDefinition), CatalogError> {
        let entry = self.get_schedule(reference)?;
        let slots = slots_of(entry, DayOfWeek::of(date), self.closure_day)?;

        match_slot(slots, slot_reference)
            .map(|slot| (entry, slot))
            .ok_or_else(|| CatalogError::UnknownSlot {
                hospital_id: entry.hospital_id.clone(),
                date,
                slot: slot_reference.to_string(),
            })
    }
}

fn slots_of(entry: &ScheduleEntry, day: DayOfWeek, closure_day: Option<DayOfWeek>) -> Result<&[SlotDefinition], CatalogError> {
    let closed = || CatalogError::Closed {
        hospital_id: entry.hospital_id.clone(),
        day,
        reason: entry.closed_reason(day),
    };

    if closure_day == Some(day) {
        return Err(closed());
    }

    match entry.slots_per_day.get(&day) {
        Some(slots) if !slots.is_empty() => Ok(slots.as_slice()),
        _ => Err(closed()),
    }
}

pub fn match_slot<'a>(slots: &'a [SlotDefinition], slot_reference: &str) -> Option<&'a SlotDefinition> {
    let trimmed = slot_reference.trim();

    if let Some(slot) = slots.iter().find(|s| s.id.eq_ignore_ascii_case(trimmed) || s.display_label == trimmed) {
        return Some(slot);
    }

    let wanted = normalize_label(trimmed);
    if let Some(slot) = slots.iter().find(|s| normalize_label(&s.display_label) == wanted) {
        return Some(slot);
    }

    hhmm::parse(trimmed)
        .ok()
        .and_then(|start| slots.iter().find(|s| s.start_time == start))
}

fn build_entry(config: HospitalScheduleConfig, closure_day: Option<DayOfWeek>) -> Result<ScheduleEntry, CatalogError> {
    let hospital_id = config.hospital_id.trim().to_ascii_lowercase();
    if hospital_id.is_empty() {
        return Err(CatalogError::InvalidSchedule("hospital_id must not be empty".to_string()));
    }
    if config.capacity_per_slot == 0 {
        return Err(CatalogError::InvalidSchedule(format!(
            "{}: capacity_per_slot must be greater than zero",
            hospital_id
        )));
    }

    let mut slots_per_day = BTreeMap::new();
    for (day, day_config) in config.days {
        if closure_day == Some(day) {
            return Err(CatalogError::InvalidSchedule(format!(
                "{}: {} is the weekly closure day and cannot have slots",
                hospital_id, day
            )));
        }

        let slots = build_day(&hospital_id, day, day_config)?;
        if !slots.is_empty() {
            slots_per_day.insert(day, slots);
        }
    }

    Ok(ScheduleEntry {
        hospital_id,
        hospital_name: config.hospital_name.trim().to_string(),
        aliases: config.aliases,
        doctor_name: config.doctor_name,
        slots_per_day,
        capacity_per_slot: config.capacity_per_slot,
        advance_booking_days: config.advance_booking_days,
    })
}

fn build_day(hospital_id: &str, day: DayOfWeek, config: DayScheduleConfig) -> Result<Vec<SlotDefinition>, CatalogError> {
    let mut slots = match config {
        DayScheduleConfig::Explicit { slots } => slots
            .into_iter()
            .map(|slot| SlotDefinition::new(hospital_id, day, slot.start, slot.end, slot.label))
            .collect::<Vec<_>>(),
        DayScheduleConfig::Window { start, end, slot_minutes } => {
            generate_slots(hospital_id, day, start, end, slot_minutes)?
        }
    };

    slots.sort_by_key(|slot| slot.start_time);

    let mut labels = HashSet::new();
    for slot in &slots {
        if slot.start_time >= slot.end_time {
            return Err(CatalogError::InvalidSchedule(format!(
                "{} {}: slot {} must start before it ends",
                hospital_id, day, slot.display_label
            )));
        }
        if !labels.insert(slot.display_label.clone()) {
            return Err(CatalogError::InvalidSchedule(format!(
                "{} {}: duplicate slot label '{}'",
                hospital_id, day, slot.display_label
            )));
        }
    }

    for pair in slots.windows(2) {
        if pair[0].start_time == pair[1].start_time {
            return Err(CatalogError::InvalidSchedule(format!(
                "{} {}: two slots start at {}",
                hospital_id, day, pair[0].start_time.format("%H:%M")
            )));
        }
    }

    Ok(slots)
}

/// Cuts `[start, end)` into back-to-back slots; a trailing remainder shorter than a slot is dropped.
pub fn generate_slots(
    hospital_id: &str,
    day: DayOfWeek,
    start: NaiveTime,
    end: NaiveTime,
    slot_minutes: u32,
) -> Result<Vec<SlotDefinition>, CatalogError> {
    if slot_minutes == 0 || start >= end {
        return Err(CatalogError::InvalidSchedule(format!(
            "{} {}: window {}-{} with {} minute slots is empty",
            hospital_id, day, start.format("%H:%M"), end.format("%H:%M"), slot_minutes
        )));
    }

    let step = Duration::minutes(i64::from(slot_minutes));
    let mut slots = Vec::new();
    let mut cursor = start;

    loop {
        let (slot_end, wrapped) = cursor.overflowing_add_signed(step);
        if wrapped != 0 || slot_end > end || slot_end <= cursor {
            break;
        }
        slots.push(SlotDefinition::new(hospital_id, day, cursor, slot_end, None));
        cursor = slot_end;
    }

    Ok(slots)
}

fn lookup_keys(entry: &ScheduleEntry) -> Vec<String> {
    let mut keys = vec![
        normalize(&entry.hospital_id),
        normalize(&entry.hospital_name),
        normalize(&format!("{} hospital", entry.hospital_id)),
    ];
    keys.extend(entry.aliases.iter().map(|alias| normalize(alias)));
    keys.sort();
    keys.dedup();
    keys
}

fn normalize(reference: &str) -> String {
    reference
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_generation_drops_partial_tail() {
        let slots = generate_slots("moon", DayOfWeek::Sunday, time(15, 0), time(17, 30), 60).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].display_label, "03:00 PM - 04:00 PM");
        assert_eq!(slots[1].id, "moon-sun-1600");
    }

    #[test]
    fn slot_matching_accepts_id_label_and_start_time() {
        let slots = generate_slots("gomoti", DayOfWeek::Monday, time(17, 0), time(19, 0), 60).unwrap();
        assert_eq!(match_slot(&slots, "gomoti-mon-1800").unwrap().start_time, time(18, 0));
        assert_eq!(match_slot(&slots, "05:00 PM - 06:00 PM").unwrap().start_time, time(17, 0));
        assert_eq!(match_slot(&slots, "05:00 pm -  06:00 pm").unwrap().start_time, time(17, 0));
        assert_eq!(match_slot(&slots, "18:00").unwrap().id, "gomoti-mon-1800");
        assert!(match_slot(&slots, "20:00").is_none());
    }
}
