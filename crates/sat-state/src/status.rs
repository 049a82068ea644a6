//! # Status Code Taxonomy
//!
//! Every service response carries a `CodEstatus`. Exactly one family of
//! codes means the call was accepted; everything else, including codes
//! this table has never seen, is a business rejection.
//!
//! | Code        | Meaning                                            |
//! |-------------|----------------------------------------------------|
//! | `5000`      | Request received successfully                      |
//! | `5001`      | Third party not authorized                         |
//! | `5002`      | Lifetime request limit reached for these filters   |
//! | `5003`      | Result exceeds the maximum document count          |
//! | `5004`      | No information found for the filters               |
//! | `5005`      | Duplicate request                                  |
//! | `5007`      | Package does not exist                             |
//! | `5008`      | Package download limit reached                     |
//! | `5011`      | Daily folio download limit reached                 |
//! | `300`–`305` | Authentication, signature or certificate defects   |
//! | `404`       | Unhandled service error                            |

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Classification of one `CodEstatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeClass {
    Accepted,
    Rejected,
}

/// Status of a request as reported by `EstadoSolicitud`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
    Accepted,
    InProgress,
    Completed,
    Failed,
    Rejected,
    Expired,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Rejected | Self::Expired
        )
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accepted => "ACCEPTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// Configured status taxonomy. Build once and share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTable {
    accepted: BTreeSet<String>,
    descriptions: BTreeMap<String, String>,
    /// `EstadoSolicitud` value to request status.
    request_states: BTreeMap<String, VerificationStatus>,
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::sat()
    }
}

impl StatusTable {
    /// An empty table: every code is a rejection.
    pub fn empty() -> Self {
        Self {
            accepted: BTreeSet::new(),
            descriptions: BTreeMap::new(),
            request_states: BTreeMap::new(),
        }
    }

    /// SAT's published codes.
    pub fn sat() -> Self {
        let descriptions = [
            ("300", "Usuario no válido"),
            ("301", "XML mal formado"),
            ("302", "Sello mal formado"),
            ("303", "Sello no corresponde con RfcSolicitante"),
            ("304", "Certificado revocado o caduco"),
            ("305", "Certificado inválido"),
            ("404", "Error no controlado"),
            ("5000", "Solicitud recibida con éxito"),
            ("5001", "Tercero no autorizado"),
            ("5002", "Se agotó las solicitudes de por vida"),
            ("5003", "Tope máximo de elementos de la consulta"),
            ("5004", "No se encontró la información"),
            ("5005", "Solicitud duplicada"),
            ("5007", "No existe el paquete solicitado"),
            ("5008", "Máximo de descargas permitidas"),
            ("5011", "Límite de descargas por folio por día"),
        ];
        let request_states = [
            ("1", VerificationStatus::Accepted),
            ("2", VerificationStatus::InProgress),
            ("3", VerificationStatus::Completed),
            ("4", VerificationStatus::Failed),
            ("5", VerificationStatus::Rejected),
            ("6", VerificationStatus::Expired),
        ];
        let table = descriptions
            .into_iter()
            .fold(Self::empty().with_accepted("5000"), |table, (code, text)| {
                table.with_description(code, text)
            });
        request_states
            .into_iter()
            .fold(table, |table, (raw, status)| table.with_request_state(raw, status))
    }

    pub fn with_accepted(mut self, code: impl Into<String>) -> Self {
        self.accepted.insert(code.into());
        self
    }

    pub fn with_description(mut self, code: impl Into<String>, text: impl Into<String>) -> Self {
        self.descriptions.insert(code.into(), text.into());
        self
    }

    pub fn with_request_state(mut self, raw: impl Into<String>, status: VerificationStatus) -> Self {
        self.request_states.insert(raw.into(), status);
        self
    }

    /// Status for an `EstadoSolicitud` value, or `None` if unmapped.
    pub fn request_state(&self, raw: &str) -> Option<VerificationStatus> {
        self.request_states.get(raw.trim()).copied()
    }

    pub fn classify(&self, code: &str) -> CodeClass {
        if self.accepted.contains(code.trim()) {
            CodeClass::Accepted
        } else {
            CodeClass::Rejected
        }
    }

    pub fn is_accepted(&self, code: &str) -> bool {
        self.classify(code) == CodeClass::Accepted
    }

    /// Known description of a code, if any.
    pub fn describe(&self, code: &str) -> Option<&str> {
        self.descriptions.get(code.trim()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_5000_is_accepted_by_default() {
        let table = StatusTable::sat();
        assert_eq!(table.classify("5000"), CodeClass::Accepted);
        assert_eq!(table.classify(" 5000 "), CodeClass::Accepted);
        for code in [
            "5001", "5002", "5003", "5004", "5005", "5011", "300", "301", "302", "303", "304",
            "305", "404",
        ] {
            assert_eq!(table.classify(code), CodeClass::Rejected, "{code}");
        }
    }

    #[test]
    fn unknown_codes_are_rejections() {
        let table = StatusTable::sat();
        assert_eq!(table.classify("9999"), CodeClass::Rejected);
        assert_eq!(table.classify(""), CodeClass::Rejected);
        assert!(table.describe("9999").is_none());
    }

    #[test]
    fn descriptions_are_available() {
        assert_eq!(
            StatusTable::sat().describe("5005"),
            Some("Solicitud duplicada")
        );
    }

    #[test]
    fn table_is_configurable() {
        let table = StatusTable::empty().with_accepted("200");
        assert!(table.is_accepted("200"));
        assert!(!table.is_accepted("5000"));
    }

    #[test]
    fn request_state_mapping() {
        use VerificationStatus::*;
        let table = StatusTable::sat();
        let expected = [
            ("1", Accepted),
            ("2", InProgress),
            ("3", Completed),
            ("4", Failed),
            ("5", Rejected),
            ("6", Expired),
        ];
        for (raw, status) in expected {
            assert_eq!(table.request_state(raw), Some(status));
        }
        assert_eq!(table.request_state(" 3 "), Some(Completed));
        assert_eq!(table.request_state("0"), None);
        assert!(!InProgress.is_terminal());
        assert!(Expired.is_terminal());
    }

    #[test]
    fn request_states_are_configurable() {
        let table = StatusTable::empty()
            .with_request_state("7", VerificationStatus::Completed)
            .with_request_state("2", VerificationStatus::Failed);
        assert_eq!(table.request_state("7"), Some(VerificationStatus::Completed));
        assert_eq!(table.request_state("2"), Some(VerificationStatus::Failed));
        assert_eq!(table.request_state("3"), None);
        assert_eq!(
            StatusTable::sat()
                .with_request_state("3", VerificationStatus::InProgress)
                .request_state("3"),
            Some(VerificationStatus::InProgress)
        );
    }

    #[test]
    fn table_round_trips_through_json() {
        let table = StatusTable::sat();
        let json = serde_json::to_string(&table).unwrap();
        let back: StatusTable = serde_json::from_str(&json).unwrap();
        assert_eq!(table, back);
    }
}
