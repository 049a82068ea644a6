//! # Error Types — Local Validation and XML Construction
//!
//! Errors raised before anything leaves the process. A `ValidationError`
//! is never retried and never sent over the wire; it names every field
//! that failed so the caller can fix the request in one round.

use std::fmt;

use thiserror::Error;

/// What is wrong with a single request field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// A mandatory field was not supplied (or was blank).
    Missing,
    /// The field was supplied but its value is malformed.
    Invalid(String),
    /// The field conflicts with another field of the same request.
    Conflict(String),
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Field name as exposed by the request builder (e.g. `"receiver_rfc"`).
    pub field: &'static str,
    /// The failure.
    pub kind: IssueKind,
}

impl FieldIssue {
    pub fn missing(field: &'static str) -> Self {
        Self {
            field,
            kind: IssueKind::Missing,
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            kind: IssueKind::Invalid(reason.into()),
        }
    }

    pub fn conflict(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            kind: IssueKind::Conflict(reason.into()),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Missing => write!(f, "{} is required", self.field),
            IssueKind::Invalid(reason) => write!(f, "{} is invalid: {reason}", self.field),
            IssueKind::Conflict(reason) => write!(f, "{}: {reason}", self.field),
        }
    }
}

/// Local validation failure for identifiers and download requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// One or more request fields failed validation.
    #[error("invalid download request: {}", join_issues(.issues))]
    Request {
        /// Every failing field, in the order the validation pass found them.
        issues: Vec<FieldIssue>,
    },

    /// A single identifier failed its format check.
    #[error("invalid {kind} {value:?}: {reason}")]
    Identifier {
        /// Identifier kind (e.g. `"RFC"`).
        kind: &'static str,
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ValidationError {
    /// The field issues carried by a request validation failure.
    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            Self::Request { issues } => issues,
            Self::Identifier { .. } => &[],
        }
    }

    /// Whether the given field is among the reported issues.
    pub fn mentions(&self, field: &str) -> bool {
        self.issues().iter().any(|i| i.field == field)
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error while reading or writing an XML tree.
#[derive(Error, Debug)]
pub enum XmlError {
    /// The input is not well-formed XML.
    #[error("xml parse failed: {0}")]
    Parse(String),

    /// The input held no root element.
    #[error("xml document has no root element")]
    NoRoot,

    /// The underlying writer failed.
    #[error("xml write failed: {0}")]
    Write(String),

    /// The produced bytes were not UTF-8.
    #[error("xml output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
