use std::sync::Arc;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::{AppConfig, LedgerBackend};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub ledger_backend: LedgerBackend,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            ledger_backend: LedgerBackend::Memory,
        }
    }
}

impl TestConfig {
    pub fn supabase(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ledger_backend: LedgerBackend::Supabase,
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            ledger_backend: self.ledger_backend,
            // Caching is switched off so tests observe every write immediately.
            availability_cache_ttl_secs: 0,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestSchedules;

impl TestSchedules {
    /// Small catalog: one hospital open Monday and Wednesday with two hourly slots.
    pub fn single_hospital_json(capacity: u32) -> Value {
        json!({
            "hospitals": [
                {
                    "hospital_id": "testcare",
                    "hospital_name": "TestCare Hospital",
                    "aliases": ["testcare clinic"],
                    "doctor_name": "Dr. Test",
                    "capacity_per_slot": capacity,
                    "advance_booking_days": 30,
                    "days": {
                        "monday": {
                            "slots": [
                                { "start": "17:00", "end": "18:00" },
                                { "start": "18:00", "end": "19:00" }
                            ]
                        },
                        "wednesday": {
                            "start": "09:00",
                            "end": "11:00",
                            "slot_minutes": 60
                        }
                    }
                }
            ]
        })
    }
}

pub struct TestPatients;

impl TestPatients {
    pub fn patient_json(name: &str) -> Value {
        json!({
            "patient_name": name,
            "patient_email": format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            "patient_phone": "+8801700000000",
            "patient_age": 34,
            "gender": "female",
            "symptoms": "Headache",
            "notes": null
        })
    }

    /// Body for `POST /appointments`.
    pub fn booking_request(hospital: &str, date: &str, time: &str) -> Value {
        let mut body = Self::patient_json("Test Patient");
        if let Some(fields) = body.as_object_mut() {
            fields.insert("hospital".to_string(), json!(hospital));
            fields.insert("date".to_string(), json!(date));
            fields.insert("appointment_time".to_string(), json!(time));
        }
        body
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_row(
        hospital_id: &str,
        date: NaiveDate,
        slot_id: &str,
        label: &str,
        ordinal: u32,
        status: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "reference_number": "A25TEST1",
            "hospital_id": hospital_id,
            "appointment_date": date.format("%Y-%m-%d").to_string(),
            "slot_id": slot_id,
            "time_slot_label": label,
            "slot_ordinal": ordinal,
            "slot_capacity": 25,
            "status": status,
            "patient_name": "Test Patient",
            "patient_email": "patient@example.com",
            "patient_phone": "+8801700000000",
            "patient_age": 34,
            "gender": "female",
            "symptoms": null,
            "notes": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn unique_violation(constraint: &str) -> Value {
        json!({
            "code": "23505",
            "details": "Key already exists.",
            "hint": null,
            "message": format!("duplicate key value violates unique constraint \"{}\"", constraint)
        })
    }
}
