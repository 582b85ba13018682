use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

/// Parses a calendar date from `YYYY-MM-DD`.
///
/// Timestamps such as `2025-09-10T00:00:00.000Z` are accepted by keeping their
/// literal date part. The date is never shifted through a timezone, so a value
/// written as the 10th stays the 10th regardless of the server's offset.
pub fn parse_calendar_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    let date_part = match trimmed.find(|c| c == 'T' || c == ' ') {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", raw))
}

/// Serde adapter for request fields holding a calendar date.
pub fn deserialize_calendar_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_calendar_date(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_dates_parse() {
        assert_eq!(
            parse_calendar_date("2025-09-10").unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 10).unwrap()
        );
    }

    #[test]
    fn utc_midnight_keeps_its_calendar_day() {
        assert_eq!(
            parse_calendar_date("2025-09-10T00:00:00.000Z").unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 10).unwrap()
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_calendar_date("10/09/2025").is_err());
        assert!(parse_calendar_date("").is_err());
    }
}
