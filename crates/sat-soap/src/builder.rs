//! # Canonical Request Builder
//!
//! Turns a validated [`DownloadRequest`] (or a verify/download call) into a
//! signed SOAP envelope.
//!
//! ## Attribute Order
//!
//! The service rejects period requests whose attributes arrive in any
//! other order than:
//!
//! > `Complemento`, `EstadoComprobante`, `FechaInicial`, `FechaFinal`,
//! > `RfcEmisor`, `RfcSolicitante`, `TipoComprobante`, `TipoSolicitud`,
//! > `RfcReceptor`, `RfcACuentaTerceros`
//!
//! Absent optional values are omitted, never written empty. Folio requests
//! carry `Folio` then `RfcSolicitante`; verify requests `IdSolicitud` then
//! `RfcSolicitante`; download requests `IdPaquete` then `RfcSolicitante`.
//!
//! ## Envelope Shape
//!
//! ```text
//! s:Envelope (xmlns:s, xmlns:des, xmlns:xd)
//!   s:Header
//!   s:Body
//!     des:<operation body element>
//!       des:<request element> (attributes, then Signature)
//! ```
//!
//! The request element is signed before it is attached, so its canonical
//! form is independent of the envelope.

use chrono::{DateTime, Duration, Utc};
use sat_core::{DateFormat, DownloadRequest, PackageId, RequestId, Rfc, XmlElement};
use sat_crypto::{Canonicalization, KeyInfo, Reference, SignatureEngine, SignatureSpec, SigningIdentity};
use uuid::Uuid;

use crate::error::BuildError;
use crate::namespaces::{
    AUTENTICACION, BASE64_ENCODING, DESCARGA, DESCARGA_PREFIX, SOAP_ENVELOPE, SOAP_PREFIX,
    WSSE, WSSE_PREFIX, WSU, WSU_PREFIX, X509_TOKEN_TYPE, XMLDSIG, XMLDSIG_PREFIX,
};
use crate::operation::Operation;

/// Where a document is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
    pub soap_action: String,
}

/// A signed request ready for the transport. One signature per document;
/// build a new document for every call.
#[derive(Debug, Clone)]
pub struct SignedRequestDocument {
    operation: Operation,
    destination: Destination,
    signed_element: XmlElement,
    envelope: String,
}

impl SignedRequestDocument {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// The signed request element (`des:solicitud` or
    /// `des:peticionDescarga`).
    pub fn signed_element(&self) -> &XmlElement {
        &self.signed_element
    }

    /// Envelope text sent over the wire.
    pub fn envelope(&self) -> &str {
        &self.envelope
    }
}

/// A signed authentication envelope and the validity window it declares.
#[derive(Debug, Clone)]
pub struct AuthenticationEnvelope {
    pub destination: Destination,
    pub envelope: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// Builds and signs every request document of the protocol.
#[derive(Debug)]
pub struct RequestBuilder<'a> {
    identity: &'a SigningIdentity,
    dates: DateFormat,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(identity: &'a SigningIdentity, dates: DateFormat) -> Self {
        Self { identity, dates }
    }

    /// The unsigned request element with its attributes in protocol order.
    ///
    /// The request's validation pass runs first; nothing is built for a
    /// malformed request.
    pub fn request_element(&self, request: &DownloadRequest) -> Result<XmlElement, BuildError> {
        request.validate().into_result()?;

        let mut el = des(Operation::for_request(request.kind()).request_element());
        match request {
            DownloadRequest::Folio(f) => {
                el.set_attribute("Folio", f.folio().to_string());
                el.set_attribute("RfcSolicitante", f.requester_rfc().as_str());
            }
            DownloadRequest::Issued(f) | DownloadRequest::Received(f) | DownloadRequest::ThirdParty(f) => {
                let attributes: [(&str, Option<String>); 10] = [
                    ("Complemento", f.complement().map(str::to_string)),
                    (
                        "EstadoComprobante",
                        f.document_status().map(|s| s.as_sat_str().to_string()),
                    ),
                    ("FechaInicial", Some(self.dates.start_of_day(f.period().start()))),
                    ("FechaFinal", Some(self.dates.end_of_day(f.period().end()))),
                    ("RfcEmisor", f.issuer_rfc().map(rfc_text)),
                    ("RfcSolicitante", f.requester_rfc().map(rfc_text)),
                    (
                        "TipoComprobante",
                        f.document_type().map(|t| t.as_sat_str().to_string()),
                    ),
                    ("TipoSolicitud", Some(f.request_type().as_sat_str().to_string())),
                    ("RfcReceptor", f.receiver_rfc().map(rfc_text)),
                    ("RfcACuentaTerceros", f.third_party_rfc().map(rfc_text)),
                ];
                for (name, value) in attributes {
                    if let Some(value) = value {
                        el.set_attribute(name, value);
                    }
                }
            }
        }
        Ok(el)
    }

    /// Signed submission document for a download request.
    pub fn download_request(
        &self,
        request: &DownloadRequest,
        destination: Destination,
    ) -> Result<SignedRequestDocument, BuildError> {
        let element = self.request_element(request)?;
        self.sign_into_envelope(Operation::for_request(request.kind()), element, destination)
    }

    /// Signed verification document for an accepted request.
    pub fn verification_request(
        &self,
        request_id: &RequestId,
        requester: &Rfc,
        destination: Destination,
    ) -> Result<SignedRequestDocument, BuildError> {
        let element = des(Operation::Verify.request_element())
            .with_attribute("IdSolicitud", request_id.as_str())
            .with_attribute("RfcSolicitante", requester.as_str());
        self.sign_into_envelope(Operation::Verify, element, destination)
    }

    /// Signed download document for one package.
    pub fn package_request(
        &self,
        package_id: &PackageId,
        requester: &Rfc,
        destination: Destination,
    ) -> Result<SignedRequestDocument, BuildError> {
        let element = des(Operation::Download.request_element())
            .with_attribute("IdPaquete", package_id.as_str())
            .with_attribute("RfcSolicitante", requester.as_str());
        self.sign_into_envelope(Operation::Download, element, destination)
    }

    fn sign_into_envelope(
        &self,
        operation: Operation,
        mut element: XmlElement,
        destination: Destination,
    ) -> Result<SignedRequestDocument, BuildError> {
        SignatureEngine::new(self.identity).sign_enveloped(&mut element)?;

        let envelope = soap("Envelope")
            .with_namespace(Some(SOAP_PREFIX), SOAP_ENVELOPE)
            .with_namespace(Some(DESCARGA_PREFIX), DESCARGA)
            .with_namespace(Some(XMLDSIG_PREFIX), XMLDSIG)
            .with_child(soap("Header"))
            .with_child(
                soap("Body")
                    .with_child(des(operation.body_element()).with_child(element.clone())),
            )
            .to_xml()?;

        tracing::debug!(
            operation = %operation,
            envelope_bytes = envelope.len(),
            "built signed request envelope"
        );

        Ok(SignedRequestDocument {
            operation,
            destination,
            signed_element: element,
            envelope,
        })
    }

    /// Signed WS-Security authentication envelope valid from `now` for
    /// `validity`.
    pub fn authentication_request(
        &self,
        now: DateTime<Utc>,
        validity: Duration,
        destination: Destination,
    ) -> Result<AuthenticationEnvelope, BuildError> {
        let created = now;
        let expires = now + validity;
        let timestamp_id = format!("_{}", Uuid::new_v4().simple());
        let token_id = format!("uuid-{}-1", Uuid::new_v4());

        let timestamp = wsu("Timestamp")
            .with_qualified_attribute(WSU_PREFIX, "Id", WSU, timestamp_id.as_str())
            .with_child(wsu("Created").with_text(sat_core::temporal::security_timestamp(created)))
            .with_child(wsu("Expires").with_text(sat_core::temporal::security_timestamp(expires)));
        let token = XmlElement::qualified(WSSE_PREFIX, "BinarySecurityToken", WSSE)
            .with_qualified_attribute(WSU_PREFIX, "Id", WSU, token_id.as_str())
            .with_attribute("ValueType", X509_TOKEN_TYPE)
            .with_attribute("EncodingType", BASE64_ENCODING)
            .with_text(self.identity.certificate().to_base64());
        let security = XmlElement::qualified(WSSE_PREFIX, "Security", WSSE)
            .with_namespace(Some(WSSE_PREFIX), WSSE)
            .with_qualified_attribute(SOAP_PREFIX, "mustUnderstand", SOAP_ENVELOPE, "1")
            .with_child(timestamp)
            .with_child(token);

        let mut envelope = soap("Envelope")
            .with_namespace(Some(SOAP_PREFIX), SOAP_ENVELOPE)
            .with_namespace(Some(WSU_PREFIX), WSU)
            .with_child(soap("Header").with_child(security))
            .with_child(
                soap("Body")
                    .with_child(XmlElement::in_default_namespace("Autentica", AUTENTICACION)),
            );

        let spec = SignatureSpec {
            canonicalization: Canonicalization::Exclusive,
            reference: Reference::Id(timestamp_id),
            key_info: KeyInfo::SecurityTokenReference {
                token_id,
                value_type: X509_TOKEN_TYPE.to_string(),
                secext_namespace: WSSE.to_string(),
            },
        };
        let signature = SignatureEngine::new(self.identity).sign_reference(&envelope, &spec)?;
        if let Some(security) = envelope.find_descendant_mut("Security") {
            security.push_child(signature);
        }
        let envelope = envelope.to_xml()?;

        tracing::debug!(envelope_bytes = envelope.len(), %expires, "built authentication envelope");

        Ok(AuthenticationEnvelope {
            destination,
            envelope,
            created,
            expires,
        })
    }
}

fn rfc_text(rfc: &Rfc) -> String {
    rfc.as_str().to_string()
}

fn des(name: &str) -> XmlElement {
    XmlElement::qualified(DESCARGA_PREFIX, name, DESCARGA)
}

fn soap(name: &str) -> XmlElement {
    XmlElement::qualified(SOAP_PREFIX, name, SOAP_ENVELOPE)
}

fn wsu(name: &str) -> XmlElement {
    XmlElement::qualified(WSU_PREFIX, name, WSU)
}
