//! Timestamp (de)serialization helpers.
//!
//! The platform API emits ISO-8601 timestamps that may or may not carry
//! an offset. Offset-less values are interpreted as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse an API timestamp, accepting RFC 3339 and offset-less forms.
///
/// # Examples
/// ```
/// use jobsync_models::timestamp::parse_api_timestamp;
/// let a = parse_api_timestamp("2024-03-01T10:00:00Z").unwrap();
/// let b = parse_api_timestamp("2024-03-01T10:00:00.000000").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_api_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Serde adapter for `DateTime<Utc>` fields using [`parse_api_timestamp`].
pub mod flexible {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_api_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
