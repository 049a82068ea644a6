//! # Response Interpreter
//!
//! Reads the typed result out of a raw service response. Every reader:
//!
//! 1. parses the body (a body that is not XML is invalid content),
//! 2. surfaces a SOAP `Fault` as [`InterpretError::SoapFault`],
//! 3. locates the first element with the expected local name, failing with
//!    [`InterpretError::InvalidResponseContent`] when it is absent,
//! 4. reads attributes by local name; a missing attribute reads as `""`.
//!
//! Errors always carry the raw body. HTTP status handling belongs to the
//! caller: readers return whatever the body says, and the raw status is
//! kept on every result.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sat_core::temporal::parse_service_timestamp;
use sat_core::{AccessToken, PackageId, RequestId, XmlElement};

use crate::error::InterpretError;
use crate::operation::Operation;

/// Transport-agnostic outcome of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResult {
    pub status: u16,
    pub body: String,
}

impl TransportResult {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result element of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAcknowledgement {
    /// `IdSolicitud`; empty when the request was rejected.
    pub request_id: String,
    pub code: String,
    pub message: String,
    pub http_status: u16,
    pub body: String,
}

impl RequestAcknowledgement {
    pub fn request_id(&self) -> Option<RequestId> {
        RequestId::new(self.request_id.as_str()).ok()
    }
}

/// Result element of a verification poll, uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResponse {
    /// `CodEstatus` of the poll call itself.
    pub code: String,
    /// `EstadoSolicitud`.
    pub request_state: String,
    /// `CodigoEstadoSolicitud`.
    pub request_state_code: String,
    pub message: String,
    /// `NumeroCFDIs`; `None` when absent or not a number.
    pub document_count: Option<u64>,
    pub package_ids: Vec<PackageId>,
    pub http_status: u16,
    pub body: String,
}

/// Download response: header status plus the package content chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResponse {
    pub code: String,
    pub message: String,
    /// Base64 text of every `Paquete` element, in document order.
    pub chunks: Vec<String>,
    pub http_status: u16,
    pub body: String,
}

impl DownloadResponse {
    /// Concatenate the chunks in order and base64-decode the result.
    pub fn package_bytes(&self) -> Result<Vec<u8>, InterpretError> {
        let joined: String = self
            .chunks
            .iter()
            .flat_map(|c| c.chars())
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if joined.is_empty() {
            return Err(invalid("response carries no Paquete content", &self.body));
        }
        STANDARD
            .decode(joined.as_bytes())
            .map_err(|e| invalid(&format!("Paquete content is not base64: {e}"), &self.body))
    }
}

fn invalid(message: &str, body: &str) -> InterpretError {
    InterpretError::InvalidResponseContent {
        message: message.to_string(),
        body: body.to_string(),
    }
}

/// Parse the body and surface SOAP faults.
fn parse(result: &TransportResult) -> Result<XmlElement, InterpretError> {
    let root = XmlElement::parse(&result.body)
        .map_err(|e| invalid(&format!("response is not well-formed XML: {e}"), &result.body))?;
    if let Some(fault) = root.find_descendant("Fault") {
        let read = |name: &str| {
            fault
                .find_child(name)
                .map(|e| e.text().trim().to_string())
                .unwrap_or_default()
        };
        return Err(InterpretError::SoapFault {
            code: read("faultcode"),
            message: read("faultstring"),
            body: result.body.clone(),
        });
    }
    Ok(root)
}

fn required<'a>(
    root: &'a XmlElement,
    name: &str,
    body: &str,
) -> Result<&'a XmlElement, InterpretError> {
    root.find_descendant(name)
        .ok_or_else(|| invalid(&format!("Element {name} is missing in response."), body))
}

fn attribute(element: &XmlElement, name: &str) -> String {
    element.attribute(name).unwrap_or_default().to_string()
}

/// Read an authentication response into a token.
pub fn authentication_result(result: &TransportResult) -> Result<AccessToken, InterpretError> {
    let root = parse(result)?;
    let token = required(&root, Operation::Authenticate.result_element(), &result.body)?
        .text()
        .trim()
        .to_string();
    if token.is_empty() {
        return Err(invalid("AutenticaResult is empty", &result.body));
    }
    let instant = |name: &str| {
        let raw = required(&root, name, &result.body)?.text();
        parse_service_timestamp(&raw)
            .ok_or_else(|| invalid(&format!("{name} is not a timestamp: {raw:?}"), &result.body))
    };
    let created = instant("Created")?;
    let expires = instant("Expires")?;
    Ok(AccessToken::new(token, created, expires))
}

/// Read a submission response for the given submit operation.
pub fn request_acknowledgement(
    result: &TransportResult,
    operation: Operation,
) -> Result<RequestAcknowledgement, InterpretError> {
    let root = parse(result)?;
    let element = required(&root, operation.result_element(), &result.body)?;
    Ok(RequestAcknowledgement {
        request_id: attribute(element, "IdSolicitud"),
        code: attribute(element, "CodEstatus"),
        message: attribute(element, "Mensaje"),
        http_status: result.status,
        body: result.body.clone(),
    })
}

/// Read a verification response.
pub fn verification_result(result: &TransportResult) -> Result<VerificationResponse, InterpretError> {
    let root = parse(result)?;
    let element = required(&root, Operation::Verify.result_element(), &result.body)?;
    let package_ids = element
        .descendants_named("IdsPaquetes")
        .into_iter()
        .filter_map(|ids| PackageId::new(ids.text()).ok())
        .collect();
    Ok(VerificationResponse {
        code: attribute(element, "CodEstatus"),
        request_state: attribute(element, "EstadoSolicitud"),
        request_state_code: attribute(element, "CodigoEstadoSolicitud"),
        message: attribute(element, "Mensaje"),
        document_count: element
            .attribute("NumeroCFDIs")
            .and_then(|n| n.trim().parse().ok()),
        package_ids,
        http_status: result.status,
        body: result.body.clone(),
    })
}

/// Read a download response.
pub fn download_result(result: &TransportResult) -> Result<DownloadResponse, InterpretError> {
    let root = parse(result)?;
    let status = required(&root, Operation::Download.result_element(), &result.body)?;
    Ok(DownloadResponse {
        code: attribute(status, "CodEstatus"),
        message: attribute(status, "Mensaje"),
        chunks: root
            .descendants_named("Paquete")
            .into_iter()
            .map(XmlElement::text)
            .collect(),
        http_status: result.status,
        body: result.body.clone(),
    })
}
