//! # sat-core — Foundational Types for the SAT Bulk Download Client
//!
//! This crate is the leaf of the workspace. It defines the type-system
//! primitives every other crate builds on; it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for protocol identifiers.** `Rfc`, `Folio`,
//!    `RequestId`, `PackageId` all have validated constructors. No bare
//!    strings for identifiers cross a crate boundary.
//!
//! 2. **One sum type for download requests.** `DownloadRequest` has four
//!    variants (issued, received, third-party account, folio) sharing the
//!    same filter set. Construction goes through
//!    [`DownloadRequestBuilder`], which runs a single validation pass and
//!    reports every missing or invalid field at once.
//!
//! 3. **Canonical bytes come from one place.** `XmlElement` owns both the
//!    wire serializer and the canonical serializer used for digests. The
//!    signer never re-serializes by hand.
//!
//! 4. **Exact date text.** The SAT service signs over the literal date
//!    strings, so formatting lives in [`temporal`] and nowhere else.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `sat-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod request;
pub mod temporal;
pub mod token;
pub mod xml;

pub use error::{FieldIssue, IssueKind, ValidationError, XmlError};
pub use identity::{Folio, PackageId, RequestId, Rfc};
pub use request::{
    DateRange, DocumentStatus, DocumentType, DownloadRequest, DownloadRequestBuilder, FolioFilters,
    PeriodFilters, RequestKind, RequestType, ValidationReport,
};
pub use temporal::DateFormat;
pub use token::AccessToken;
pub use xml::{XmlAttribute, XmlElement, XmlNode};
