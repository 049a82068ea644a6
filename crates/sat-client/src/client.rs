//! # Per-Operation Services
//!
//! [`SatClient`] exposes the four protocol calls. Each one is a single
//! logical exchange in three steps:
//!
//! 1. build and sign a fresh envelope (`sat-soap`),
//! 2. post it through the [`SoapTransport`], retrying transient transport
//!    failures with backoff,
//! 3. interpret the raw result.
//!
//! ## HTTP Status Policy
//!
//! A SOAP fault in the body wins over the status line. Otherwise a non-2xx
//! status is [`ClientError::Http`] with the raw body, and only a 2xx body
//! is read for its typed result. Business status codes are classified by
//! the configured [`StatusTable`](sat_state::StatusTable); anything it does
//! not accept is [`ClientError::Rejected`] carrying the remote message.
//!
//! The client holds no mutable state. Tokens are passed in per call, so
//! concurrent calls never interfere; see [`crate::token::TokenCache`] for
//! shared renewal.

use std::sync::Arc;

use chrono::Utc;
use sat_core::{AccessToken, DownloadRequest, PackageId, RequestId, Rfc};
use sat_crypto::SigningIdentity;
use sat_soap::interpreter::{
    authentication_result, download_result, request_acknowledgement, verification_result,
};
use sat_soap::{
    Destination, InterpretError, Operation, RequestAcknowledgement, RequestBuilder,
    TransportResult,
};
use sat_state::VerificationStatus;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::error::ClientError;
use crate::retry::with_backoff;
use crate::transport::{HttpSoapTransport, SoapTransport};

// ─── Typed Results ──────────────────────────────────────────────────────

/// An accepted submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub request_id: RequestId,
    pub acknowledgement: RequestAcknowledgement,
}

/// Outcome of one verification poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    /// `CodigoEstadoSolicitud`, e.g. `5000` or `5004`.
    pub request_state_code: String,
    pub message: String,
    /// Number of matched documents (`NumeroCFDIs`); zero when absent.
    pub document_count: u64,
    pub package_ids: Vec<PackageId>,
}

/// A retrieved package: a zip of CFDI documents.
#[derive(Clone, PartialEq, Eq)]
pub struct DownloadedPackage {
    pub package_id: PackageId,
    pub payload: Vec<u8>,
}

impl std::fmt::Debug for DownloadedPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadedPackage")
            .field("package_id", &self.package_id)
            .field("payload_bytes", &self.payload.len())
            .finish()
    }
}

// ─── Client ─────────────────────────────────────────────────────────────

/// Typed client for the SAT bulk download services.
#[derive(Clone)]
pub struct SatClient {
    config: Arc<ServiceConfig>,
    identity: Arc<SigningIdentity>,
    transport: Arc<dyn SoapTransport>,
}

impl std::fmt::Debug for SatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SatClient")
            .field("config", &self.config)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl SatClient {
    /// Create a client over the default HTTP transport.
    pub fn new(config: ServiceConfig, identity: SigningIdentity) -> Result<Self, ClientError> {
        let transport = HttpSoapTransport::from_config(&config)?;
        Ok(Self::with_transport(
            config,
            Arc::new(identity),
            Arc::new(transport),
        ))
    }

    pub fn with_transport(
        config: ServiceConfig,
        identity: Arc<SigningIdentity>,
        transport: Arc<dyn SoapTransport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            identity,
            transport,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn builder(&self) -> RequestBuilder<'_> {
        RequestBuilder::new(&self.identity, self.config.date_format())
    }

    async fn exchange(
        &self,
        destination: &Destination,
        token: Option<&AccessToken>,
        body: &str,
        cancel: &CancellationToken,
    ) -> Result<TransportResult, ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let result = with_backoff(&self.config.retry, cancel, || {
            self.transport.send(destination, token, body, cancel)
        })
        .await?;
        Ok(result)
    }

    // ── Authenticate ────────────────────────────────────────────────────

    /// Exchange a signed WS-Security assertion for an access token.
    pub async fn authenticate(&self, cancel: &CancellationToken) -> Result<AccessToken, ClientError> {
        let envelope = self.builder().authentication_request(
            Utc::now(),
            self.config.token_validity,
            self.config.destination(Operation::Authenticate),
        )?;
        let result = self
            .exchange(&envelope.destination, None, &envelope.envelope, cancel)
            .await?;
        let token = interpret(&result, authentication_result)?;
        tracing::debug!(expires = %token.expires(), "access token issued");
        Ok(token)
    }

    // ── Submit ──────────────────────────────────────────────────────────

    /// Submit a download request. A non-accepted status code is a
    /// rejection.
    pub async fn submit(
        &self,
        token: &AccessToken,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<Submission, ClientError> {
        let operation = Operation::for_request(request.kind());
        let document = self
            .builder()
            .download_request(request, self.config.destination(operation))?;
        let result = self
            .exchange(document.destination(), Some(token), document.envelope(), cancel)
            .await?;
        let acknowledgement = interpret(&result, |r| request_acknowledgement(r, operation))?;
        self.accept(operation, &acknowledgement.code, &acknowledgement.message)?;

        let request_id = acknowledgement.request_id().ok_or_else(|| {
            InterpretError::InvalidResponseContent {
                message: "IdSolicitud is empty in an accepted response.".into(),
                body: acknowledgement.body.clone(),
            }
        })?;
        tracing::info!(
            request_id = %request_id,
            kind = %request.kind(),
            "download request accepted"
        );
        Ok(Submission {
            request_id,
            acknowledgement,
        })
    }

    // ── Verify ──────────────────────────────────────────────────────────

    /// Poll the status of a submitted request once.
    pub async fn verify(
        &self,
        token: &AccessToken,
        request_id: &RequestId,
        requester: &Rfc,
        cancel: &CancellationToken,
    ) -> Result<VerificationResult, ClientError> {
        let document = self.builder().verification_request(
            request_id,
            requester,
            self.config.destination(Operation::Verify),
        )?;
        let result = self
            .exchange(document.destination(), Some(token), document.envelope(), cancel)
            .await?;
        let response = interpret(&result, verification_result)?;
        self.accept(Operation::Verify, &response.code, &response.message)?;

        let status = self
            .config
            .status_table
            .request_state(&response.request_state)
            .ok_or_else(|| InterpretError::InvalidResponseContent {
                message: format!(
                    "EstadoSolicitud {:?} is not a known request state.",
                    response.request_state
                ),
                body: response.body.clone(),
            })?;
        tracing::debug!(
            request_id = %request_id,
            status = %status,
            packages = response.package_ids.len(),
            "verification result"
        );
        Ok(VerificationResult {
            status,
            request_state_code: response.request_state_code,
            message: response.message,
            document_count: response.document_count.unwrap_or(0),
            package_ids: response.package_ids,
        })
    }

    // ── Download ────────────────────────────────────────────────────────

    /// Download one package, joining every chunk the service returns for
    /// it before decoding.
    pub async fn download(
        &self,
        token: &AccessToken,
        package_id: &PackageId,
        requester: &Rfc,
        cancel: &CancellationToken,
    ) -> Result<DownloadedPackage, ClientError> {
        let document = self.builder().package_request(
            package_id,
            requester,
            self.config.destination(Operation::Download),
        )?;
        let result = self
            .exchange(document.destination(), Some(token), document.envelope(), cancel)
            .await?;
        let response = interpret(&result, download_result)?;
        self.accept(Operation::Download, &response.code, &response.message)?;

        let payload = response.package_bytes()?;
        tracing::debug!(
            package_id = %package_id,
            chunks = response.chunks.len(),
            payload_bytes = payload.len(),
            "package downloaded"
        );
        Ok(DownloadedPackage {
            package_id: package_id.clone(),
            payload,
        })
    }

    fn accept(&self, operation: Operation, code: &str, message: &str) -> Result<(), ClientError> {
        if self.config.status_table.is_accepted(code) {
            return Ok(());
        }
        let message = if message.is_empty() {
            self.config
                .status_table
                .describe(code)
                .unwrap_or_default()
                .to_string()
        } else {
            message.to_string()
        };
        Err(ClientError::Rejected {
            operation,
            code: code.to_string(),
            message,
        })
    }
}

/// Apply the HTTP status policy around a body reader.
fn interpret<T>(
    result: &TransportResult,
    read: impl FnOnce(&TransportResult) -> Result<T, InterpretError>,
) -> Result<T, ClientError> {
    match read(result) {
        Err(fault @ InterpretError::SoapFault { .. }) => Err(fault.into()),
        _ if !result.is_success() => Err(ClientError::Http {
            status: result.status,
            body: result.body.clone(),
        }),
        other => other.map_err(Into::into),
    }
}
