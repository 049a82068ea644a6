//! # sat-client — Async client for the SAT bulk download services
//!
//! Drives the "Descarga Masiva de CFDI" protocol:
//! - **Authenticate** via `Autenticacion.svc` (WS-Security signed timestamp)
//! - **Submit** via `SolicitaDescargaService.svc` (issued, received,
//!   third-party and folio requests)
//! - **Verify** via `VerificaSolicitudDescargaService.svc`
//! - **Download** via `DescargaMasivaService.svc`
//!
//! ## Architecture
//!
//! This crate is the only one in the workspace that performs network I/O,
//! and it does so only through a [`SoapTransport`]. Requests are built and
//! signed by `sat-soap`, responses are read by its interpreter, and
//! protocol state lives in `sat-state`. [`SatClient`] offers one method per
//! call; [`DownloadWorkflow`] chains them and downloads packages
//! concurrently.
//!
//! ## Cancellation
//!
//! Every network-issuing operation takes a `CancellationToken`. A cancelled
//! call fails with [`ClientError::Cancelled`] and leaves the workflow in the
//! state it had before the call.

pub mod client;
pub mod config;
pub mod error;
pub(crate) mod retry;
pub mod token;
pub mod transport;
pub mod workflow;

pub use client::{DownloadedPackage, SatClient, Submission, VerificationResult};
pub use config::{ConfigError, Endpoint, RequestEndpoint, RetryPolicy, ServiceConfig};
pub use error::{ClientError, TransportError};
pub use token::TokenCache;
pub use transport::{HttpSoapTransport, SoapTransport};
pub use workflow::{DownloadReport, DownloadWorkflow, PackageOutcome, PollPolicy};

pub use tokio_util::sync::CancellationToken;
