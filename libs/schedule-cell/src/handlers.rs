// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use shared_models::error::AppError;
use shared_utils::dates::parse_calendar_date;

use crate::models::{CatalogError, DayOfWeek, ScheduleEntry};
use crate::services::catalog::ScheduleCatalog;

fn schedule_json(entry: &ScheduleEntry) -> Value {
    let schedule: serde_json::Map<String, Value> = entry
        .slots_per_day
        .iter()
        .map(|(day, slots)| (day.number().to_string(), json!({ "day_name": day.name(), "slots": slots })))
        .collect();

    json!({
        "hospital_id": entry.hospital_id,
        "hospital_name": entry.hospital_name,
        "doctor_name": entry.doctor_name,
        "schedule": schedule,
        "operating_days": entry.operating_days().iter().map(|d| d.number()).collect::<Vec<_>>(),
        "max_appointments_per_slot": entry.capacity_per_slot,
        "advance_booking_days": entry.advance_booking_days,
    })
}

fn map_catalog_error(error: CatalogError) -> AppError {
    match error {
        CatalogError::HospitalNotFound(reference) => {
            AppError::NotFound(format!("Hospital schedule not found: {}", reference))
        }
        CatalogError::Closed { reason, .. } => AppError::NotFound(reason),
        CatalogError::UnknownSlot { .. } => AppError::NotFound(error.to_string()),
        CatalogError::InvalidSchedule(msg) => AppError::Internal(msg),
    }
}

pub async fn list_schedules(
    State(catalog): State<Arc<ScheduleCatalog>>,
) -> Result<Json<Value>, AppError> {
    let schedules: Vec<Value> = catalog.hospitals().iter().map(schedule_json).collect();

    Ok(Json(json!({
        "success": true,
        "total": schedules.len(),
        "schedules": schedules,
        "weekly_closure_day": catalog.closure_day().map(|d| d.name()),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

pub async fn get_schedule(
    State(catalog): State<Arc<ScheduleCatalog>>,
    Path(hospital_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let entry = catalog.get_schedule(&hospital_id).map_err(map_catalog_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule_json(entry),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

pub async fn get_operating_days(
    State(catalog): State<Arc<ScheduleCatalog>>,
    Path(hospital_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let entry = catalog.get_schedule(&hospital_id).map_err(map_catalog_error)?;

    let days: Vec<Value> = entry
        .slots_per_day
        .iter()
        .map(|(day, slots)| json!({
            "day_number": day.number(),
            "day_name": day.name(),
            "slots": slots,
            "slot_count": slots.len(),
        }))
        .collect();

    Ok(Json(json!({
        "success": true,
        "hospital_id": entry.hospital_id,
        "hospital_name": entry.hospital_name,
        "total_days": days.len(),
        "available_days": days,
    })))
}

pub async fn get_day_slots(
    State(catalog): State<Arc<ScheduleCatalog>>,
    Path((hospital_id, day_number)): Path<(String, u8)>,
) -> Result<Json<Value>, AppError> {
    let day = DayOfWeek::from_number(day_number).ok_or_else(|| {
        AppError::BadRequest("Day number must be between 0 (Sunday) and 6 (Saturday)".to_string())
    })?;

    let entry = catalog.get_schedule(&hospital_id).map_err(map_catalog_error)?;
    let slots = catalog
        .slots_for_weekday(&entry.hospital_id, day)
        .map_err(map_catalog_error)?;

    Ok(Json(json!({
        "success": true,
        "hospital_id": entry.hospital_id,
        "hospital_name": entry.hospital_name,
        "day_number": day.number(),
        "day_name": day.name(),
        "slots": slots,
        "slot_count": slots.len(),
        "max_appointments_per_slot": entry.capacity_per_slot,
    })))
}

/// Slot layout for a date without occupancy. Not authoritative for booking decisions.
pub async fn preview_slots(
    State(catalog): State<Arc<ScheduleCatalog>>,
    Path((hospital_id, date)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let date = parse_calendar_date(&date).map_err(AppError::BadRequest)?;
    let entry = catalog.get_schedule(&hospital_id).map_err(map_catalog_error)?;
    let day = DayOfWeek::of(date);

    let body = match catalog.get_slots_for_day(&entry.hospital_id, date) {
        Ok(slots) => json!({
            "hospital_id": entry.hospital_id,
            "date": date,
            "day_name": day.name(),
            "is_closed": false,
            "slots": slots,
            "capacity_per_slot": entry.capacity_per_slot,
            "authoritative": false,
        }),
        Err(CatalogError::Closed { reason, .. }) => json!({
            "hospital_id": entry.hospital_id,
            "date": date,
            "day_name": day.name(),
            "is_closed": true,
            "reason": reason,
            "slots": [],
            "authoritative": false,
        }),
        Err(other) => return Err(map_catalog_error(other)),
    };

    Ok(Json(body))
}
