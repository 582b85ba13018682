use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which persistence backend holds the booking ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Supabase,
    Memory,
}

impl FromStr for LedgerBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" | "postgrest" => Ok(LedgerBackend::Supabase),
            "memory" | "in-memory" | "in_memory" => Ok(LedgerBackend::Memory),
            other => Err(format!("unknown ledger backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub ledger_backend: LedgerBackend,
    pub schedule_config_path: Option<String>,
    pub clinic_utc_offset_minutes: i32,
    /// Lowercase weekday name, or `None` when no day is globally reserved.
    pub weekly_closure_day: Option<String>,
    pub booking_timeout_ms: u64,
    pub availability_cache_ttl_secs: u64,
    /// Shared snapshot store for calendar counts; per-process when unset.
    pub redis_url: Option<String>,
    pub max_calendar_days: u32,
    pub api_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            ledger_backend: LedgerBackend::Memory,
            schedule_config_path: None,
            clinic_utc_offset_minutes: 360,
            weekly_closure_day: Some("friday".to_string()),
            booking_timeout_ms: 5_000,
            availability_cache_ttl_secs: 300,
            redis_url: None,
            max_calendar_days: 62,
            api_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });
        let supabase_service_key = env::var("SUPABASE_SERVICE_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                String::new()
            });

        let ledger_backend = match env::var("LEDGER_BACKEND") {
            Ok(value) => value.parse().unwrap_or_else(|e: String| {
                warn!("{}, falling back to in-memory ledger", e);
                LedgerBackend::Memory
            }),
            Err(_) if !supabase_url.is_empty() => LedgerBackend::Supabase,
            Err(_) => {
                warn!("LEDGER_BACKEND not set and no SUPABASE_URL, using in-memory ledger");
                LedgerBackend::Memory
            }
        };

        let weekly_closure_day = match env::var("WEEKLY_CLOSURE_DAY") {
            Ok(value) if value.trim().eq_ignore_ascii_case("none") || value.trim().is_empty() => None,
            Ok(value) => Some(value.trim().to_ascii_lowercase()),
            Err(_) => defaults.weekly_closure_day.clone(),
        };

        let config = Self {
            supabase_url,
            supabase_service_key,
            ledger_backend,
            schedule_config_path: env::var("SCHEDULE_CONFIG_PATH").ok(),
            clinic_utc_offset_minutes: parse_or_default(
                "CLINIC_UTC_OFFSET_MINUTES",
                defaults.clinic_utc_offset_minutes,
            ),
            weekly_closure_day,
            booking_timeout_ms: parse_or_default("BOOKING_TIMEOUT_MS", defaults.booking_timeout_ms),
            availability_cache_ttl_secs: parse_or_default(
                "AVAILABILITY_CACHE_TTL_SECS",
                defaults.availability_cache_ttl_secs,
            ),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            max_calendar_days: parse_or_default("MAX_CALENDAR_DAYS", defaults.max_calendar_days),
            api_port: parse_or_default("API_PORT", defaults.api_port),
        };

        if config.ledger_backend == LedgerBackend::Supabase && !config.is_database_configured() {
            warn!("Supabase ledger selected but SUPABASE_URL / SUPABASE_SERVICE_KEY are missing");
        }

        config
    }

    pub fn is_database_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_backend_parses_known_names() {
        assert_eq!("supabase".parse::<LedgerBackend>(), Ok(LedgerBackend::Supabase));
        assert_eq!(" Memory ".parse::<LedgerBackend>(), Ok(LedgerBackend::Memory));
        assert!("mongo".parse::<LedgerBackend>().is_err());
    }

    #[test]
    fn defaults_close_fridays() {
        let config = AppConfig::default();
        assert_eq!(config.weekly_closure_day.as_deref(), Some("friday"));
        assert!(!config.is_database_configured());
    }
}
