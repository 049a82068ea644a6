//! # sat-soap — Request Documents and Response Interpretation
//!
//! The SOAP layer between the typed requests of `sat-core` and the raw
//! HTTP exchanges of `sat-client`:
//!
//! - [`namespaces`]: prefixes, namespace URIs and token type constants.
//! - [`operation`]: one descriptor per remote call, with its element names
//!   and production SOAP action.
//! - [`builder`]: canonical request elements in protocol attribute order,
//!   signed and wrapped in SOAP envelopes, plus the WS-Security
//!   authentication envelope.
//! - [`interpreter`]: typed readers for every response, SOAP fault
//!   detection and package chunk assembly.
//!
//! ## Crate Policy
//!
//! - No network I/O. Building and interpreting are pure functions of their
//!   inputs, apart from the generated WS-Security ids.
//! - Every error produced from a response carries that response's body.

pub mod builder;
pub mod error;
pub mod interpreter;
pub mod namespaces;
pub mod operation;

pub use builder::{AuthenticationEnvelope, Destination, RequestBuilder, SignedRequestDocument};
pub use error::{BuildError, InterpretError};
pub use interpreter::{
    DownloadResponse, RequestAcknowledgement, TransportResult, VerificationResponse,
};
pub use operation::Operation;
