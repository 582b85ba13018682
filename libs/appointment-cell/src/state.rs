// libs/appointment-cell/src/state.rs
use std::sync::Arc;

use tracing::{info, warn};

use schedule_cell::{Clock, ScheduleCatalog, SystemClock};
use shared_config::{AppConfig, LedgerBackend};
use shared_database::SupabaseClient;

use crate::services::cache::AvailabilityCache;
use crate::services::ledger::BookingLedger;
use crate::services::memory_ledger::InMemoryLedger;
use crate::services::supabase_ledger::SupabaseLedger;

/// Everything the booking routes share. Cloned per request; all fields are handles.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<ScheduleCatalog>,
    pub ledger: Arc<dyn BookingLedger>,
    pub cache: Arc<AvailabilityCache>,
    pub clock: Arc<dyn Clock>,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        catalog: Arc<ScheduleCatalog>,
        ledger: Arc<dyn BookingLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = AvailabilityCache::from_config(&config);
        Self {
            config,
            catalog,
            ledger,
            cache: Arc::new(cache),
            clock,
        }
    }

    /// Picks the ledger backend from configuration and uses the wall clock.
    pub fn from_config(config: Arc<AppConfig>, catalog: Arc<ScheduleCatalog>) -> Self {
        let ledger = build_ledger(&config);
        let clock = Arc::new(SystemClock::from_offset_minutes(config.clinic_utc_offset_minutes));
        Self::new(config, catalog, ledger, clock)
    }
}

fn build_ledger(config: &AppConfig) -> Arc<dyn BookingLedger> {
    match config.ledger_backend {
        LedgerBackend::Supabase if config.is_database_configured() => {
            info!("Booking ledger: Supabase at {}", config.supabase_url);
            Arc::new(SupabaseLedger::new(Arc::new(SupabaseClient::new(config))))
        }
        LedgerBackend::Supabase => {
            warn!("LEDGER_BACKEND=supabase but SUPABASE_URL/SUPABASE_SERVICE_KEY are missing, using in-memory ledger");
            Arc::new(InMemoryLedger::new())
        }
        LedgerBackend::Memory => {
            warn!("Booking ledger: in-memory (bookings are lost on restart)");
            Arc::new(InMemoryLedger::new())
        }
    }
}
