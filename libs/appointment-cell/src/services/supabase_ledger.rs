// libs/appointment-cell/src/services/supabase_ledger.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::{DbError, SupabaseClient};

use crate::models::{AppointmentFilter, AppointmentStats, AppointmentStatus, Booking, SlotBucket, SlotKey};
use crate::services::ledger::{effective_limit, BookingLedger, LedgerError};

const TABLE: &str = "/rest/v1/appointments";
const SLOT_COUNTS_RPC: &str = "/rest/v1/rpc/appointment_slot_counts";
/// Grouped rows requested per page; the server may still return fewer.
const SLOT_COUNTS_PAGE: usize = 1000;

/// Ledger backed by the `appointments` table through PostgREST.
///
/// Relies on `appointments_active_slot_ordinal_idx` and
/// `appointments_slot_ordinal_range` from the migration for capacity safety.
pub struct SupabaseLedger {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct OrdinalRow {
    slot_ordinal: u32,
}

#[derive(Debug, Deserialize)]
struct SlotCountRow {
    appointment_date: NaiveDate,
    slot_id: String,
    booking_count: u32,
}

impl SupabaseLedger {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn key_filter(key: &SlotKey) -> String {
        format!(
            "hospital_id=eq.{}&appointment_date=eq.{}&slot_id=eq.{}&status=neq.cancelled",
            urlencoding::encode(&key.hospital_id),
            key.date.format("%Y-%m-%d"),
            urlencoding::encode(&key.slot_id)
        )
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    async fn fetch_one(&self, filter: &str) -> Result<Option<Booking>, LedgerError> {
        let path = format!("{}?{}&limit=1", TABLE, filter);
        let rows: Vec<Booking> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(database_error)?;
        Ok(rows.into_iter().next())
    }
}

fn database_error(error: DbError) -> LedgerError {
    match error {
        DbError::CheckViolation(message) => LedgerError::Rejected(message),
        DbError::NotFound(_) => LedgerError::NotFound,
        other => LedgerError::Database(other.to_string()),
    }
}

#[async_trait]
impl BookingLedger for SupabaseLedger {
    async fn occupied_ordinals(&self, key: &SlotKey) -> Result<Vec<u32>, LedgerError> {
        let path = format!(
            "{}?select=slot_ordinal&{}&order=slot_ordinal.asc",
            TABLE,
            Self::key_filter(key)
        );
        let rows: Vec<OrdinalRow> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(database_error)?;

        Ok(rows.into_iter().map(|row| row.slot_ordinal).collect())
    }

    async fn count_active(&self, key: &SlotKey) -> Result<u32, LedgerError> {
        let path = format!("{}?select=id&{}", TABLE, Self::key_filter(key));
        let total = self.supabase.count(&path, None).await.map_err(database_error)?;
        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }

    async fn slot_counts_in_range(
        &self,
        hospital_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SlotBucket>, LedgerError> {
        // Grouped in the database by `appointment_slot_counts` (see the migration).
        let body = json!({
            "p_hospital_id": hospital_id,
            "p_from": from.format("%Y-%m-%d").to_string(),
            "p_to": to.format("%Y-%m-%d").to_string(),
        });

        let mut buckets: BTreeMap<(NaiveDate, String), u32> = BTreeMap::new();
        let mut offset = 0usize;
        let mut pages = 0u32;

        loop {
            let path = format!(
                "{}?order=appointment_date.asc,slot_id.asc&limit={}&offset={}",
                SLOT_COUNTS_RPC, SLOT_COUNTS_PAGE, offset
            );
            let (rows, total): (Vec<SlotCountRow>, Option<u64>) = self
                .supabase
                .request_counted(Method::POST, &path, None, Some(body.clone()))
                .await
                .map_err(database_error)?;

            pages += 1;
            let fetched = rows.len();
            for row in rows {
                let count = buckets.entry((row.appointment_date, row.slot_id)).or_default();
                *count = count.saturating_add(row.booking_count);
            }
            offset += fetched;

            let total = total.map_or(offset, |total| usize::try_from(total).unwrap_or(usize::MAX));
            if fetched == 0 || offset >= total {
                if offset < total {
                    warn!(
                        "Slot counts for {} stopped at {} of {} groups",
                        hospital_id, offset, total
                    );
                }
                break;
            }
        }

        debug!(
            "Range count {}..={} for {}: {} groups in {} page(s)",
            from, to, hospital_id, buckets.len(), pages
        );

        Ok(buckets
            .into_iter()
            .map(|((date, slot_id), count)| SlotBucket { date, slot_id, count })
            .collect())
    }

    async fn insert(&self, booking: &Booking) -> Result<Booking, LedgerError> {
        let body = serde_json::to_value(booking)
            .map_err(|e| LedgerError::Database(format!("Failed to encode booking: {}", e)))?;

        let result: Result<Vec<Booking>, DbError> = self
            .supabase
            .request_with_headers(Method::POST, TABLE, None, Some(body), Some(Self::representation_headers()))
            .await;

        match result {
            Ok(rows) => rows
                .into_iter()
                .next()
                .ok_or_else(|| LedgerError::Database("Insert returned no row".to_string())),
            Err(DbError::UniqueViolation { constraint }) if constraint.contains("reference") => {
                Err(LedgerError::DuplicateReference)
            }
            Err(DbError::UniqueViolation { constraint }) => {
                debug!("Ordinal {} taken ({})", booking.slot_ordinal, constraint);
                Err(LedgerError::OrdinalTaken { ordinal: booking.slot_ordinal })
            }
            Err(e) => Err(database_error(e)),
        }
    }

    async fn remove(&self, id: Uuid) -> Result<(), LedgerError> {
        let path = format!("{}?id=eq.{}", TABLE, id);
        let removed: Vec<Booking> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, None, None, Some(Self::representation_headers()))
            .await
            .map_err(database_error)?;

        if removed.is_empty() {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, LedgerError> {
        self.fetch_one(&format!("id=eq.{}", id)).await
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, LedgerError> {
        let reference = reference.trim().to_ascii_uppercase();
        self.fetch_one(&format!("reference_number=eq.{}", urlencoding::encode(&reference)))
            .await
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
        doctor_notes: Option<&str>,
    ) -> Result<Booking, LedgerError> {
        let path = format!("{}?id=eq.{}&status=eq.{}", TABLE, id, expected.as_str());
        let mut body = json!({
            "status": new_status,
            "updated_at": Utc::now().to_rfc3339(),
        });
        if let Some(notes) = doctor_notes {
            body["doctor_notes"] = json!(notes);
        }

        let updated: Vec<Booking> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, None, Some(body), Some(Self::representation_headers()))
            .await
            .map_err(database_error)?;

        if let Some(row) = updated.into_iter().next() {
            return Ok(row);
        }

        // Nothing matched: either the row is gone or its status moved on.
        match self.get(id).await? {
            Some(current) => {
                warn!("Status of {} is {} not {}", id, current.status, expected);
                Err(LedgerError::StatusChanged)
            }
            None => Err(LedgerError::NotFound),
        }
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Booking>, LedgerError> {
        let mut query_parts = Vec::new();

        if let Some(date) = filter.date {
            query_parts.push(format!("appointment_date=eq.{}", date.format("%Y-%m-%d")));
        }
        if let Some(hospital_id) = &filter.hospital_id {
            query_parts.push(format!("hospital_id=eq.{}", urlencoding::encode(hospital_id)));
        }
        if let Some(status) = filter.status {
            query_parts.push(format!("status=eq.{}", status.as_str()));
        }

        query_parts.push("order=appointment_date.asc,created_at.asc".to_string());
        query_parts.push(format!("limit={}", effective_limit(filter)));
        query_parts.push(format!("offset={}", filter.offset));

        let path = format!("{}?{}", TABLE, query_parts.join("&"));
        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(database_error)
    }

    async fn stats(&self, hospital_id: Option<&str>, today: NaiveDate) -> Result<AppointmentStats, LedgerError> {
        let scope = match hospital_id {
            Some(id) => format!("&hospital_id=eq.{}", urlencoding::encode(id)),
            None => String::new(),
        };
        let count = |filter: String| {
            let path = format!("{}?select=id{}{}", TABLE, scope, filter);
            async move { self.supabase.count(&path, None).await.map_err(database_error) }
        };
        let today = today.format("%Y-%m-%d").to_string();
        let by_status = |status: AppointmentStatus| count(format!("&status=eq.{}", status.as_str()));

        let (total, today_count, upcoming, pending, confirmed, completed, cancelled, no_show) = tokio::try_join!(
            count(String::new()),
            count(format!("&appointment_date=eq.{}", today)),
            count(format!("&appointment_date=gt.{}", today)),
            by_status(AppointmentStatus::Pending),
            by_status(AppointmentStatus::Confirmed),
            by_status(AppointmentStatus::Completed),
            by_status(AppointmentStatus::Cancelled),
            by_status(AppointmentStatus::NoShow),
        )?;

        Ok(AppointmentStats {
            total_appointments: total,
            pending_appointments: pending,
            confirmed_appointments: confirmed,
            completed_appointments: completed,
            cancelled_appointments: cancelled,
            no_show_appointments: no_show,
            today_appointments: today_count,
            upcoming_appointments: upcoming,
        })
    }
}
