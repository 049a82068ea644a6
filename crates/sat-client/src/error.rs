//! SAT client error types.

use sat_core::{ValidationError, XmlError};
use sat_crypto::CryptoError;
use sat_soap::{BuildError, InterpretError, Operation};
use sat_state::{StateError, VerificationStatus};
use thiserror::Error;

use crate::config::ConfigError;

/// Failure of the transport collaborator.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection could not be established or was dropped.
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// No response arrived within the configured timeout.
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// The request could not be built (e.g. a header value with invalid
    /// characters). Retrying cannot help.
    #[error("invalid request for {endpoint}: {reason}")]
    InvalidRequest { endpoint: String, reason: String },

    /// The caller cancelled the call.
    #[error("call to {endpoint} was cancelled")]
    Cancelled { endpoint: String },
}

impl TransportError {
    /// Whether a new attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Errors from SAT client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The download request is malformed. Nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Key, certificate or signing failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Xml(#[from] XmlError),

    /// The response body could not be read, or carried a SOAP fault.
    #[error(transparent)]
    Interpret(#[from] InterpretError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Transport(TransportError),

    /// The service refused the call with a business status code.
    #[error("{operation} rejected with status {code}: {message}")]
    Rejected {
        operation: Operation,
        code: String,
        message: String,
    },

    /// Non-2xx HTTP status without a SOAP fault in the body.
    #[error("service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Verification reported a terminal status other than completed.
    #[error("request ended with status {status} ({code}): {message}")]
    RequestEnded {
        status: VerificationStatus,
        code: String,
        message: String,
    },

    /// The verification poll budget ran out before a terminal status.
    #[error("request still unresolved after {attempts} verification attempts")]
    PollExhausted { attempts: u32 },

    /// A download task ended without producing an outcome.
    #[error("download task failed: {0}")]
    Task(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// True only for transient transport failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_transient())
    }

    /// Raw response body carried by the error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Interpret(e) => Some(e.body()),
            Self::Http { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled { .. } => Self::Cancelled,
            other => Self::Transport(other),
        }
    }
}

impl From<BuildError> for ClientError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::Validation(e) => Self::Validation(e),
            BuildError::Crypto(e) => Self::Crypto(e),
            BuildError::Xml(e) => Self::Xml(e),
        }
    }
}
