//! # sat-crypto — Signing Identity and XML Signatures
//!
//! Provides the cryptographic layer of the SAT bulk download client:
//!
//! - **SigningIdentity**: an RSA private key and its X.509 certificate,
//!   checked to belong together when loaded from DER or PEM.
//! - **SignatureEngine**: XML-DSig RSA-SHA1 signatures over canonical XML,
//!   enveloped (request bodies) or id-referenced (authentication
//!   timestamp).
//! - **Verification** of produced signature blocks against the embedded
//!   or supplied certificate.
//!
//! ## Crate Policy
//!
//! - Depends only on `sat-core` internally.
//! - Every digest input comes from `XmlElement::to_canonical`.
//! - No mocking of cryptographic operations in tests. All tests use a real
//!   RSA key and self-signed certificate from `fixtures/`.

pub mod error;
pub mod identity;
pub mod xmldsig;

pub use error::CryptoError;
pub use identity::{CertificateInfo, SigningIdentity};
pub use xmldsig::{
    verify_enveloped, verify_reference, Canonicalization, KeyInfo, Reference, SignatureEngine,
    SignatureSpec,
};
