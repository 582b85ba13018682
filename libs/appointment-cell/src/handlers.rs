// libs/appointment-cell/src/handlers.rs
use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_utils::dates::parse_calendar_date;

use crate::models::{
    AppointmentFilter, AppointmentStatus, AvailabilityView, BookAppointmentRequest, BookingError,
    BulkAvailabilityRequest, SlotStatus, UpdateAppointmentRequest,
};
use crate::services::{AvailabilityService, BookingService, CalendarService};
use crate::state::AppointmentState;

pub const MAX_BULK_DATES: usize = 31;
pub const MAX_BULK_SLOTS: usize = 250;
pub const DEFAULT_CALENDAR_DAYS: u32 = 30;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub date: Option<String>,
    pub hospital: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub hospital: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub days: Option<u32>,
    pub start: Option<String>,
}

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

fn booking_error(error: BookingError) -> AppError {
    let message = error.to_string();

    match error {
        BookingError::Validation(msg) => AppError::ValidationError(msg),
        BookingError::HospitalClosed(_) | BookingError::UnknownSlot(_) => AppError::BadRequest(message),
        BookingError::HospitalNotFound(_) => AppError::NotFound(message),
        BookingError::NotFound => AppError::NotFound(message),
        BookingError::CapacityExceeded { current_bookings, max_capacity } => AppError::SlotUnavailable {
            message,
            details: slot_details(current_bookings, max_capacity, "capacity_exceeded"),
        },
        BookingError::RaceConditionDetected { current_bookings, max_capacity } => AppError::SlotUnavailable {
            message,
            details: slot_details(current_bookings, max_capacity, "race_condition_detected"),
        },
        BookingError::InvalidStatusTransition { .. } => AppError::Conflict(message),
        BookingError::Timeout | BookingError::Internal(_) => AppError::Internal(message),
    }
}

fn slot_details(current_bookings: u32, max_capacity: u32, reason: &str) -> Value {
    json!({
        "current_bookings": current_bookings,
        "max_capacity": max_capacity,
        "available_slots": max_capacity.saturating_sub(current_bookings),
        "reason": reason,
    })
}

fn parse_appointment_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("Invalid appointment id: {}", raw)))
}

fn view_json(view: &AvailabilityView) -> Value {
    let mut body = json!(view);
    if let Some(fields) = body.as_object_mut() {
        fields.insert("last_updated".to_string(), json!(Utc::now().to_rfc3339()));
    }
    body
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

pub async fn check_slot_availability(
    State(state): State<Arc<AppointmentState>>,
    Path((hospital_id, date, time_slot)): Path<(String, String, String)>,
) -> Result<Json<Value>, AppError> {
    let date = parse_calendar_date(&date).map_err(AppError::BadRequest)?;

    let availability_service = AvailabilityService::new(&state);
    let view = availability_service
        .check_availability(&hospital_id, date, &time_slot)
        .await
        .map_err(booking_error)?;

    if view.status == SlotStatus::HospitalNotFound {
        return Err(AppError::NotFound(format!("Hospital not found: {}", hospital_id)));
    }

    Ok(Json(view_json(&view)))
}

pub async fn day_availability(
    State(state): State<Arc<AppointmentState>>,
    Path((hospital_id, date)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let date = parse_calendar_date(&date).map_err(AppError::BadRequest)?;

    let availability_service = AvailabilityService::new(&state);
    let summary = availability_service
        .day_availability(&hospital_id, date)
        .await
        .map_err(booking_error)?;

    Ok(Json(json!({
        "success": true,
        "day": summary,
        "last_updated": Utc::now().to_rfc3339(),
    })))
}

pub async fn bulk_availability(
    State(state): State<Arc<AppointmentState>>,
    Json(request): Json<BulkAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    if request.date_time_slots.is_empty() {
        return Err(AppError::ValidationError("dateTimeSlots must not be empty".to_string()));
    }
    if request.date_time_slots.len() > MAX_BULK_SLOTS {
        return Err(AppError::ValidationError(format!(
            "At most {} slots can be checked per request",
            MAX_BULK_SLOTS
        )));
    }

    let distinct_dates: HashSet<_> = request.date_time_slots.iter().map(|slot| slot.date).collect();
    if distinct_dates.len() > MAX_BULK_DATES {
        return Err(AppError::ValidationError(format!(
            "At most {} distinct dates can be checked per request",
            MAX_BULK_DATES
        )));
    }

    let entry = state
        .catalog
        .resolve_hospital(&request.hospital_id)
        .ok_or_else(|| AppError::NotFound(format!("Hospital not found: {}", request.hospital_id)))?;

    let availability_service = AvailabilityService::new(&state);
    let views = availability_service
        .check_bulk_availability(&entry.hospital_id, &request.date_time_slots)
        .await
        .map_err(booking_error)?;

    Ok(Json(json!({
        "success": true,
        "hospital_id": entry.hospital_id,
        "slots": views,
        "last_updated": Utc::now().to_rfc3339(),
    })))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking_service = BookingService::new(&state);

    let receipt = booking_service
        .attempt_booking(&request.hospital, request.date, &request.appointment_time, request.patient)
        .await
        .map_err(booking_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": receipt.booking,
            "slot_info": receipt.slot_info,
            "message": "Appointment booked successfully"
        })),
    ))
}

pub async fn list_appointments(
    State(state): State<Arc<AppointmentState>>,
    Query(params): Query<AppointmentQueryParams>,
) -> Result<Json<Value>, AppError> {
    let date = params
        .date
        .as_deref()
        .map(parse_calendar_date)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let hospital_id = match params.hospital.as_deref() {
        Some(reference) => Some(
            state
                .catalog
                .resolve_hospital(reference)
                .map(|entry| entry.hospital_id.clone())
                .ok_or_else(|| AppError::NotFound(format!("Hospital not found: {}", reference)))?,
        ),
        None => None,
    };

    let status = params
        .status
        .as_deref()
        .map(str::parse::<AppointmentStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let filter = AppointmentFilter {
        date,
        hospital_id,
        status,
        limit: params.limit.unwrap_or(0),
        offset: params.offset.unwrap_or(0),
    };

    let booking_service = BookingService::new(&state);
    let appointments = booking_service
        .list_appointments(&filter)
        .await
        .map_err(booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointments": appointments,
        "total": appointments.len(),
        "offset": filter.offset,
    })))
}

pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_appointment_id(&appointment_id)?;

    let booking_service = BookingService::new(&state);
    let appointment = booking_service.get_appointment(id).await.map_err(booking_error)?;

    Ok(Json(json!(appointment)))
}

/// Public lookup by reference number; patient contact details are left out.
pub async fn track_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(reference): Path<String>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);
    let appointment = booking_service
        .track_appointment(&reference)
        .await
        .map_err(booking_error)?;

    let hospital_name = state
        .catalog
        .resolve_hospital(&appointment.hospital_id)
        .map(|entry| entry.hospital_name.clone());

    Ok(Json(json!({
        "success": true,
        "appointment": {
            "reference_number": appointment.reference_number,
            "hospital_id": appointment.hospital_id,
            "hospital_name": hospital_name,
            "appointment_date": appointment.appointment_date,
            "time_slot_label": appointment.time_slot_label,
            "status": appointment.status,
            "patient_name": appointment.patient.patient_name,
            "created_at": appointment.created_at,
        }
    })))
}

/// Serves both `PATCH /{id}/status` and `PUT /{id}`.
pub async fn update_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<String>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let id = parse_appointment_id(&appointment_id)?;

    let booking_service = BookingService::new(&state);
    let appointment = booking_service
        .update_appointment(id, request.status, request.doctor_notes)
        .await
        .map_err(booking_error)?;

    let message = match request.status {
        Some(status) => format!("Appointment status updated to {}", status),
        None => "Appointment updated successfully".to_string(),
    };

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": message
    })))
}

pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_appointment_id(&appointment_id)?;

    let booking_service = BookingService::new(&state);
    let appointment = booking_service.cancel_appointment(id).await.map_err(booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

pub async fn appointment_stats(
    State(state): State<Arc<AppointmentState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);
    let stats = booking_service
        .appointment_stats(query.hospital.as_deref())
        .await
        .map_err(booking_error)?;

    Ok(Json(json!({
        "success": true,
        "stats": stats,
        "as_of": state.clock.today(),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

// ==============================================================================
// CALENDAR HANDLERS
// ==============================================================================

pub async fn get_calendar(
    State(state): State<Arc<AppointmentState>>,
    Path(hospital_id): Path<String>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let days = query.days.unwrap_or(DEFAULT_CALENDAR_DAYS);
    if days == 0 {
        return Err(AppError::ValidationError("days must be at least 1".to_string()));
    }
    let days = days.min(state.config.max_calendar_days.max(1));

    let start = match query.start.as_deref() {
        Some(raw) => parse_calendar_date(raw).map_err(AppError::BadRequest)?,
        None => state.clock.today(),
    };

    let calendar_service = CalendarService::new(&state);
    let calendar = calendar_service
        .build_calendar(&hospital_id, start, days)
        .await
        .map_err(booking_error)?;

    let hospital = state.catalog.resolve_hospital(&hospital_id);

    Ok(Json(json!({
        "success": true,
        "hospital_id": hospital.map(|entry| entry.hospital_id.clone()),
        "hospital_name": hospital.map(|entry| entry.hospital_name.clone()),
        "start_date": start,
        "days": days,
        "calendar": calendar,
    })))
}
