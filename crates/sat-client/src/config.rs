//! SAT service client configuration.
//!
//! Holds the endpoint URLs and SOAP actions of the four services, plus the
//! timing and concurrency knobs of the workflow. Defaults point to the
//! production endpoints. Override via environment variables or explicit
//! construction for testing.

use std::time::Duration;

use sat_core::DateFormat;
use sat_soap::{Destination, Operation};
use sat_state::StatusTable;
use url::Url;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of packages downloaded at once.
const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;

/// One service endpoint and the SOAP action it is called with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: Url,
    pub soap_action: String,
}

impl Endpoint {
    fn destination(&self) -> Destination {
        Destination {
            url: self.url.to_string(),
            soap_action: self.soap_action.clone(),
        }
    }
}

/// The request service takes one action per submission variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEndpoint {
    pub url: Url,
    pub issued_action: String,
    pub received_action: String,
    pub folio_action: String,
}

/// Backoff applied to transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }
}

/// Configuration for connecting to the SAT bulk download services.
///
/// Immutable once built; the services and the workflow share one copy.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Authentication service (`Autentica`).
    pub authentication: Endpoint,
    /// Request service (`SolicitaDescarga*`).
    pub request: RequestEndpoint,
    /// Verification service (`VerificaSolicitudDescarga`).
    pub verification: Endpoint,
    /// Download service (`Descargar`).
    pub download: Endpoint,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Validity window declared in the authentication timestamp.
    pub token_validity: chrono::Duration,
    /// A token this close to expiry is renewed before the next call.
    pub token_refresh_margin: chrono::Duration,
    /// Offset token appended to request period dates.
    pub date_offset: String,
    /// Maximum packages downloaded concurrently.
    pub download_concurrency: usize,
    pub retry: RetryPolicy,
    pub status_table: StatusTable,
}

impl ServiceConfig {
    /// Production endpoints and default settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if a built-in URL fails to parse.
    pub fn production() -> Result<Self, ConfigError> {
        let url = |operation: Operation| parse_url(operation.production_url(), &operation.to_string());
        Ok(Self::with_urls(
            url(Operation::Authenticate)?,
            url(Operation::SubmitIssued)?,
            url(Operation::Verify)?,
            url(Operation::Download)?,
        ))
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `SAT_AUTH_URL` (default: production authentication endpoint)
    /// - `SAT_REQUEST_URL` (default: production request endpoint)
    /// - `SAT_VERIFY_URL` (default: production verification endpoint)
    /// - `SAT_DOWNLOAD_URL` (default: production download endpoint)
    /// - `SAT_TIMEOUT_SECS` (default: 30)
    /// - `SAT_DOWNLOAD_CONCURRENCY` (default: 4)
    /// - `SAT_DATE_OFFSET` (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::with_urls(
            env_url("SAT_AUTH_URL", Operation::Authenticate.production_url())?,
            env_url("SAT_REQUEST_URL", Operation::SubmitIssued.production_url())?,
            env_url("SAT_VERIFY_URL", Operation::Verify.production_url())?,
            env_url("SAT_DOWNLOAD_URL", Operation::Download.production_url())?,
        );
        if let Some(secs) = env_number("SAT_TIMEOUT_SECS")? {
            config.timeout_secs = secs;
        }
        if let Some(n) = env_number("SAT_DOWNLOAD_CONCURRENCY")? {
            if n == 0 {
                return Err(ConfigError::InvalidValue(
                    "SAT_DOWNLOAD_CONCURRENCY".to_string(),
                    "must be at least 1".to_string(),
                ));
            }
            config.download_concurrency = n as usize;
        }
        if let Ok(offset) = std::env::var("SAT_DATE_OFFSET") {
            config.date_offset = offset;
        }
        Ok(config)
    }

    /// Create a configuration pointing every service at one local mock
    /// server (for testing). Each service keeps its production path, so a
    /// mock can route on it.
    pub fn local_mock(base_url: &str) -> Result<Self, ConfigError> {
        let base = parse_url(base_url, "local mock")?;
        let url = |operation: Operation| -> Result<Url, ConfigError> {
            let production = parse_url(operation.production_url(), &operation.to_string())?;
            base.join(production.path())
                .map_err(|e| ConfigError::InvalidUrl(base_url.to_string(), e.to_string()))
        };
        let mut config = Self::with_urls(
            url(Operation::Authenticate)?,
            url(Operation::SubmitIssued)?,
            url(Operation::Verify)?,
            url(Operation::Download)?,
        );
        config.timeout_secs = 5;
        config.retry = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
        };
        Ok(config)
    }

    fn with_urls(authentication: Url, request: Url, verification: Url, download: Url) -> Self {
        let action = |operation: Operation| operation.production_soap_action().to_string();
        Self {
            authentication: Endpoint {
                url: authentication,
                soap_action: action(Operation::Authenticate),
            },
            request: RequestEndpoint {
                url: request,
                issued_action: action(Operation::SubmitIssued),
                received_action: action(Operation::SubmitReceived),
                folio_action: action(Operation::SubmitFolio),
            },
            verification: Endpoint {
                url: verification,
                soap_action: action(Operation::Verify),
            },
            download: Endpoint {
                url: download,
                soap_action: action(Operation::Download),
            },
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            token_validity: chrono::Duration::minutes(5),
            token_refresh_margin: chrono::Duration::seconds(30),
            date_offset: String::new(),
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            retry: RetryPolicy::default(),
            status_table: StatusTable::sat(),
        }
    }

    /// Where the given operation is posted.
    pub fn destination(&self, operation: Operation) -> Destination {
        let submit = |action: &str| Destination {
            url: self.request.url.to_string(),
            soap_action: action.to_string(),
        };
        match operation {
            Operation::Authenticate => self.authentication.destination(),
            Operation::SubmitIssued => submit(&self.request.issued_action),
            Operation::SubmitReceived => submit(&self.request.received_action),
            Operation::SubmitFolio => submit(&self.request.folio_action),
            Operation::Verify => self.verification.destination(),
            Operation::Download => self.download.destination(),
        }
    }

    pub fn date_format(&self) -> DateFormat {
        DateFormat::with_offset(self.date_offset.clone())
    }
}

fn parse_url(raw: &str, name: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(name.to_string(), e.to_string()))
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn env_number(var: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue(var.to_string(), e.to_string())
            }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
