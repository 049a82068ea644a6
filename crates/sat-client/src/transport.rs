//! # SOAP Transport
//!
//! The protocol engine never performs socket I/O itself. It hands a signed
//! envelope to a [`SoapTransport`] and gets back a transport-agnostic
//! [`TransportResult`] (HTTP status + raw body).
//!
//! [`HttpSoapTransport`] is the `reqwest` implementation. It maps
//! connection failures and timeouts to [`TransportError`] and returns every
//! HTTP status, including non-2xx, as a result: SOAP faults arrive with a
//! 500 status and the interpreter needs their body.
//!
//! Retries are NOT built into the transport; see [`crate::retry`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use sat_core::AccessToken;
use sat_soap::{Destination, TransportResult};
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::error::TransportError;

const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Posts one SOAP envelope and returns the raw response.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Send `body` to `destination`, attaching `token` as the
    /// `Authorization` header when present.
    ///
    /// A cancelled call fails with [`TransportError::Cancelled`] as soon
    /// as `cancel` fires.
    async fn send(
        &self,
        destination: &Destination,
        token: Option<&AccessToken>,
        body: &str,
        cancel: &CancellationToken,
    ) -> Result<TransportResult, TransportError>;
}

/// `reqwest`-backed transport. Cheap to clone; share one per process.
#[derive(Debug, Clone)]
pub struct HttpSoapTransport {
    client: reqwest::Client,
}

impl HttpSoapTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(SOAP_CONTENT_TYPE));
                headers
            })
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                endpoint: "client_init".into(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, TransportError> {
        Self::new(Duration::from_secs(config.timeout_secs))
    }

    async fn post(
        &self,
        destination: &Destination,
        token: Option<&AccessToken>,
        body: &str,
    ) -> Result<TransportResult, TransportError> {
        let endpoint = destination.url.as_str();
        let soap_action = HeaderValue::from_str(&destination.soap_action).map_err(|e| {
            TransportError::InvalidRequest {
                endpoint: endpoint.to_string(),
                reason: format!("SOAPAction: {e}"),
            }
        })?;

        let mut request = self
            .client
            .post(endpoint)
            .header("SOAPAction", soap_action)
            .body(body.to_string());
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&token.authorization_header()).map_err(|_| {
                TransportError::InvalidRequest {
                    endpoint: endpoint.to_string(),
                    reason: "access token contains invalid header characters".into(),
                }
            })?;
            value.set_sensitive(true);
            request = request.header(AUTHORIZATION, value);
        }

        let resp = request.send().await.map_err(|e| map_reqwest(endpoint, e))?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| map_reqwest(endpoint, e))?;

        tracing::debug!(
            endpoint,
            status,
            response_bytes = text.len(),
            "SOAP exchange complete"
        );
        Ok(TransportResult::new(status, text))
    }
}

fn map_reqwest(endpoint: &str, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else if e.is_builder() {
        TransportError::InvalidRequest {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    } else {
        TransportError::Connection {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl SoapTransport for HttpSoapTransport {
    async fn send(
        &self,
        destination: &Destination,
        token: Option<&AccessToken>,
        body: &str,
        cancel: &CancellationToken,
    ) -> Result<TransportResult, TransportError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled {
                endpoint: destination.url.clone(),
            }),
            result = self.post(destination, token, body) => result,
        }
    }
}
