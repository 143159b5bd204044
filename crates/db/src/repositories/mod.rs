use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use forcage_core::store::StoreError;

pub mod client_profile;
pub mod demande;
pub mod memory;

pub use client_profile::SqlClientProfileRepository;
pub use demande::SqlDemandeRepository;
pub use memory::{InMemoryClientProfileRepository, InMemoryDemandeRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
        }
    }
}

/// Fixed-width UTC timestamps, so TEXT comparison in SQL orders chronologically.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_optional_timestamp(
    column: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| decode_timestamp(column, &value)).transpose()
}

pub(crate) fn decode_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_enum<T>(
    column: &str,
    raw: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(raw).ok_or_else(|| RepositoryError::Decode(format!("{column}: unknown value `{raw}`")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{decode_timestamp, encode_timestamp, RepositoryError};
    use forcage_core::store::StoreError;

    #[test]
    fn encoded_timestamps_sort_like_instants() {
        let early = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid date");
        let later = early + Duration::microseconds(1500);

        assert!(encode_timestamp(&early) < encode_timestamp(&later));
        assert_eq!(decode_timestamp("created_at", &encode_timestamp(&later)).ok(), Some(later));
    }

    #[test]
    fn decode_failures_surface_as_store_decode_errors() {
        let error = decode_timestamp("due_date", "yesterday").expect_err("not rfc3339");
        assert!(matches!(
            StoreError::from(error),
            StoreError::Decode(ref message) if message.starts_with("due_date")
        ));
        assert!(matches!(
            StoreError::from(RepositoryError::Database(sqlx::Error::RowNotFound)),
            StoreError::Backend(_)
        ));
    }
}
