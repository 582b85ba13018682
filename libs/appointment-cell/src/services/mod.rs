pub mod availability;
pub mod booking;
pub mod cache;
pub mod calendar;
pub mod ledger;
pub mod lifecycle;
pub mod memory_ledger;
pub mod supabase_ledger;

pub use availability::AvailabilityService;
pub use booking::BookingService;
pub use cache::AvailabilityCache;
pub use calendar::CalendarService;
pub use ledger::{BookingLedger, LedgerError};
pub use lifecycle::AppointmentLifecycleService;
pub use memory_ledger::InMemoryLedger;
pub use supabase_ledger::SupabaseLedger;
