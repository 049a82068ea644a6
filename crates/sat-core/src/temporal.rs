//! # SAT Date and Timestamp Text
//!
//! The request signature covers the literal text of `FechaInicial` and
//! `FechaFinal`, so their formatting is fixed here and shared by every
//! request variant:
//!
//! - start of period: `YYYY-MM-DDT00:00:00`
//! - end of period: `YYYY-MM-DDT23:59:59`
//!
//! followed by the configured timezone offset token. SAT's published
//! samples carry no offset, which is the default.
//!
//! WS-Security timestamps of the authentication envelope use UTC with
//! millisecond precision and a `Z` suffix: `YYYY-MM-DDTHH:MM:SS.mmmZ`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Formatting rules for period dates in request attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateFormat {
    /// Token appended to every period timestamp (e.g. `""`, `"Z"`,
    /// `"-06:00"`).
    pub offset: String,
}

impl DateFormat {
    /// Format with no offset token.
    pub fn sat() -> Self {
        Self::default()
    }

    pub fn with_offset(offset: impl Into<String>) -> Self {
        Self {
            offset: offset.into(),
        }
    }

    /// `FechaInicial` text for the given calendar date.
    pub fn start_of_day(&self, date: NaiveDate) -> String {
        format!("{}T00:00:00{}", date.format("%Y-%m-%d"), self.offset)
    }

    /// `FechaFinal` text for the given calendar date.
    pub fn end_of_day(&self, date: NaiveDate) -> String {
        format!("{}T23:59:59{}", date.format("%Y-%m-%d"), self.offset)
    }
}

/// WS-Security `Created`/`Expires` text.
pub fn security_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp returned by the service, accepting any RFC 3339
/// offset and normalizing to UTC.
pub fn parse_service_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
