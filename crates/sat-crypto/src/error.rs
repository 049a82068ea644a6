//! Errors raised while loading a signing identity or producing and
//! checking XML signatures. None of them is retryable: each one means the
//! identity or the document is wrong, not that the network hiccuped.

use sat_core::XmlError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    /// The private key bytes could not be decoded as PKCS#8 or PKCS#1.
    #[error("private key could not be decoded: {0}")]
    InvalidKey(String),

    /// The key is password protected. Decrypt it before loading.
    #[error("encrypted private keys are not supported, decrypt the key first")]
    EncryptedKey,

    /// The certificate bytes could not be decoded as X.509.
    #[error("certificate could not be decoded: {0}")]
    InvalidCertificate(String),

    /// The private key does not belong to the certificate.
    #[error("private key does not match the certificate public key")]
    KeyMismatch,

    /// The RSA signing primitive failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The element already carries a `Signature` child.
    #[error("element <{element}> is already signed")]
    AlreadySigned { element: String },

    /// An id reference did not resolve to exactly one element.
    #[error("reference #{id} matched {count} elements, expected exactly one")]
    UnresolvedReference { id: String, count: usize },

    /// A signature block is malformed or does not verify.
    #[error("signature verification failed: {0}")]
    Verification(String),

    #[error(transparent)]
    Xml(#[from] XmlError),
}
