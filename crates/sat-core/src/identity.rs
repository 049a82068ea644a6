//! # Protocol Identifier Newtypes
//!
//! Newtype wrappers for the identifiers the SAT service exchanges. You
//! cannot pass a `PackageId` where a `RequestId` is expected, and an `Rfc`
//! can only exist in its normalized, well-formed shape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Mexican taxpayer identifier (Registro Federal de Contribuyentes).
///
/// 12 characters for legal persons, 13 for natural persons:
/// a 3 or 4 letter name prefix (`A-Z`, `Ñ`, `&`), a 6 digit date and a
/// 3 character alphanumeric homoclave. Input is trimmed and upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rfc(String);

impl Rfc {
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_uppercase();
        let chars: Vec<char> = normalized.chars().collect();

        let reject = |reason: &str| ValidationError::Identifier {
            kind: "RFC",
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        let prefix_len = match chars.len() {
            12 => 3,
            13 => 4,
            n => return Err(reject(&format!("expected 12 or 13 characters, got {n}"))),
        };

        if !chars[..prefix_len]
            .iter()
            .all(|c| c.is_ascii_uppercase() || *c == 'Ñ' || *c == '&')
        {
            return Err(reject("name prefix must be letters, Ñ or &"));
        }
        if !chars[prefix_len..prefix_len + 6]
            .iter()
            .all(char::is_ascii_digit)
        {
            return Err(reject("date segment must be 6 digits"));
        }
        if !chars[prefix_len + 6..]
            .iter()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(reject("homoclave must be alphanumeric"));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this RFC belongs to a natural person (13 characters).
    pub fn is_natural_person(&self) -> bool {
        self.0.chars().count() == 13
    }
}

impl TryFrom<String> for Rfc {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Rfc> for String {
    fn from(rfc: Rfc) -> Self {
        rfc.0
    }
}

impl std::fmt::Display for Rfc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fiscal folio (UUID) of a single CFDI.
///
/// Rendered upper-case, the form the SAT stamps into every CFDI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Folio(pub Uuid);

impl Folio {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|e| ValidationError::Identifier {
                kind: "folio",
                value: raw.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for Folio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated().to_string().to_uppercase())
    }
}

/// Opaque identifier the service assigns to an accepted download request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

/// Opaque identifier of one downloadable package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId(String);

impl RequestId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        non_empty("request id", raw.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PackageId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        non_empty("package id", raw.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn non_empty(kind: &'static str, raw: String) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Identifier {
            kind,
            value: raw.clone(),
            reason: "must not be empty".into(),
        });
    }
    Ok(trimmed.to_string())
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
