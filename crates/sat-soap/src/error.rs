//! # Error Types — Building Requests and Reading Responses

use sat_core::{ValidationError, XmlError};
use sat_crypto::CryptoError;
use thiserror::Error;

/// Failure while building a signed request document.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// Failure while interpreting a service response.
///
/// Both variants carry the raw response body so no diagnostic detail is
/// lost between the wire and the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    /// The body is not well-formed, or lacks the expected element or
    /// value.
    #[error("invalid response content: {message}")]
    InvalidResponseContent { message: String, body: String },

    /// The service answered with a SOAP fault.
    #[error("SOAP fault {code}: {message}")]
    SoapFault {
        code: String,
        message: String,
        body: String,
    },
}

impl InterpretError {
    pub fn body(&self) -> &str {
        match self {
            Self::InvalidResponseContent { body, .. } | Self::SoapFault { body, .. } => body,
        }
    }
}
