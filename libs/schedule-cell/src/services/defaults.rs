// libs/schedule-cell/src/services/defaults.rs

/// Hospitals served when no `SCHEDULE_CONFIG_PATH` is configured.
pub const BUILTIN_CATALOG: &str = include_str!("../../config/hospitals.json");
