//! # XML Digital Signature Engine
//!
//! Produces and verifies XML-DSig `Signature` blocks over canonical XML
//! using RSA-SHA1, the only algorithm pair the SAT service accepts.
//!
//! Two reference styles are supported:
//!
//! - [`Reference::Enveloped`]: `URI=""`, the signature lives inside the
//!   signed element and is excluded from the digest. Used for request
//!   bodies, with `KeyInfo` carrying the certificate itself.
//! - [`Reference::Id`]: `URI="#id"`, pointing at an element of the
//!   document carrying that id. Used for the WS-Security timestamp of the
//!   authentication envelope, with `KeyInfo` pointing at the binary
//!   security token.
//!
//! ## Security Invariant
//!
//! The digest and the signature are always computed from
//! [`XmlElement::to_canonical`]. Nothing in this module serializes XML by
//! hand, so the bytes signed and the bytes described by the tree cannot
//! drift apart.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::RsaPublicKey;
use sat_core::XmlElement;

use crate::error::CryptoError;
use crate::identity::{public_key_from_certificate, sha1_base64, verify_sha1, SigningIdentity};

pub const DSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

const SIGNATURE: &str = "Signature";

/// Canonicalization algorithm named in `SignedInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canonicalization {
    /// Canonical XML 1.0 (request bodies).
    Inclusive,
    /// Exclusive XML canonicalization (authentication timestamp).
    Exclusive,
}

impl Canonicalization {
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Inclusive => "http://www.w3.org/TR/2001/REC-xml-c14n-20010315",
            Self::Exclusive => "http://www.w3.org/2001/10/xml-exc-c14n#",
        }
    }
}

/// What the single `Reference` of a signature points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Enveloped,
    Id(String),
}

impl Reference {
    fn uri(&self) -> String {
        match self {
            Self::Enveloped => String::new(),
            Self::Id(id) => format!("#{id}"),
        }
    }
}

/// How `KeyInfo` identifies the signing certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInfo {
    /// `X509Data` with issuer/serial and the certificate bytes.
    X509Data,
    /// WS-Security `SecurityTokenReference` to a `BinarySecurityToken`.
    SecurityTokenReference {
        token_id: String,
        value_type: String,
        secext_namespace: String,
    },
}

/// The full description of one signature to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSpec {
    pub canonicalization: Canonicalization,
    pub reference: Reference,
    pub key_info: KeyInfo,
}

impl SignatureSpec {
    /// Enveloped, inclusive, certificate embedded: the request-body profile.
    pub fn enveloped() -> Self {
        Self {
            canonicalization: Canonicalization::Inclusive,
            reference: Reference::Enveloped,
            key_info: KeyInfo::X509Data,
        }
    }
}

/// Signs XML elements with one [`SigningIdentity`].
#[derive(Debug)]
pub struct SignatureEngine<'a> {
    identity: &'a SigningIdentity,
}

impl<'a> SignatureEngine<'a> {
    pub fn new(identity: &'a SigningIdentity) -> Self {
        Self { identity }
    }

    /// Sign `element` with an enveloped signature and append the
    /// `Signature` block as its last child.
    pub fn sign_enveloped(&self, element: &mut XmlElement) -> Result<(), CryptoError> {
        if element.find_child(SIGNATURE).is_some() {
            return Err(CryptoError::AlreadySigned {
                element: element.name().to_string(),
            });
        }
        let canonical = element.to_canonical()?;
        let signature = self.signature_block(&SignatureSpec::enveloped(), canonical.as_bytes())?;
        element.push_child(signature);
        Ok(())
    }

    /// Build a `Signature` block for the element of `document` whose `Id`
    /// equals the referenced id. The caller places the block.
    pub fn sign_reference(
        &self,
        document: &XmlElement,
        spec: &SignatureSpec,
    ) -> Result<XmlElement, CryptoError> {
        let Reference::Id(id) = &spec.reference else {
            return Err(CryptoError::Signing(
                "sign_reference needs an id reference".into(),
            ));
        };
        let target = resolve_id(document, id)?;
        if target.find_child(SIGNATURE).is_some() {
            return Err(CryptoError::AlreadySigned {
                element: target.name().to_string(),
            });
        }
        let canonical = target.to_canonical()?;
        self.signature_block(spec, canonical.as_bytes())
    }

    fn signature_block(
        &self,
        spec: &SignatureSpec,
        canonical_target: &[u8],
    ) -> Result<XmlElement, CryptoError> {
        let digest = sha1_base64(canonical_target);
        let signed_info = signed_info(spec, &digest);
        let canonical_signed_info = signed_info.to_canonical()?;
        let signature_value = STANDARD.encode(self.identity.sign_sha1(canonical_signed_info.as_bytes())?);

        tracing::debug!(
            reference = %spec.reference.uri(),
            signed_bytes = canonical_target.len(),
            "produced xml signature"
        );

        Ok(dsig("Signature")
            .with_child(signed_info)
            .with_child(dsig("SignatureValue").with_text(signature_value))
            .with_child(self.key_info(&spec.key_info)))
    }

    fn key_info(&self, style: &KeyInfo) -> XmlElement {
        let cert = self.identity.certificate();
        match style {
            KeyInfo::X509Data => dsig("KeyInfo").with_child(
                dsig("X509Data")
                    .with_child(
                        dsig("X509IssuerSerial")
                            .with_child(dsig("X509IssuerName").with_text(cert.issuer_name()))
                            .with_child(dsig("X509SerialNumber").with_text(cert.serial_number())),
                    )
                    .with_child(dsig("X509Certificate").with_text(cert.to_base64())),
            ),
            KeyInfo::SecurityTokenReference {
                token_id,
                value_type,
                secext_namespace,
            } => dsig("KeyInfo").with_child(
                XmlElement::qualified("o", "SecurityTokenReference", secext_namespace.as_str())
                    .with_child(
                        XmlElement::qualified("o", "Reference", secext_namespace.as_str())
                            .with_attribute("ValueType", value_type.as_str())
                            .with_attribute("URI", format!("#{token_id}")),
                    ),
            ),
        }
    }
}

fn dsig(name: &str) -> XmlElement {
    XmlElement::in_default_namespace(name, DSIG_NAMESPACE)
}

fn algorithm(name: &str, uri: &str) -> XmlElement {
    dsig(name).with_attribute("Algorithm", uri)
}

fn signed_info(spec: &SignatureSpec, digest: &str) -> XmlElement {
    let transform = match spec.reference {
        Reference::Enveloped => ENVELOPED_SIGNATURE,
        Reference::Id(_) => spec.canonicalization.algorithm(),
    };
    dsig("SignedInfo")
        .with_child(algorithm(
            "CanonicalizationMethod",
            spec.canonicalization.algorithm(),
        ))
        .with_child(algorithm("SignatureMethod", RSA_SHA1))
        .with_child(
            dsig("Reference")
                .with_attribute("URI", spec.reference.uri())
                .with_child(dsig("Transforms").with_child(algorithm("Transform", transform)))
                .with_child(algorithm("DigestMethod", SHA1))
                .with_child(dsig("DigestValue").with_text(digest)),
        )
}

fn resolve_id<'d>(document: &'d XmlElement, id: &str) -> Result<&'d XmlElement, CryptoError> {
    let matches = document.elements_with_id(id);
    match matches.as_slice() {
        [single] => Ok(*single),
        _ => Err(CryptoError::UnresolvedReference {
            id: id.to_string(),
            count: matches.len(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

fn required_text(parent: &XmlElement, path: &[&str]) -> Result<String, CryptoError> {
    let mut current = parent;
    for name in path {
        current = current
            .find_child(name)
            .ok_or_else(|| CryptoError::Verification(format!("missing <{name}>")))?;
    }
    Ok(current.text().trim().to_string())
}

fn check_signature(
    signature: &XmlElement,
    canonical_target: &[u8],
    public_key: &RsaPublicKey,
) -> Result<(), CryptoError> {
    let signed_info = signature
        .find_child("SignedInfo")
        .ok_or_else(|| CryptoError::Verification("missing <SignedInfo>".into()))?;
    let digest = required_text(signed_info, &["Reference", "DigestValue"])?;
    if digest != sha1_base64(canonical_target) {
        return Err(CryptoError::Verification("digest mismatch".into()));
    }
    let value = required_text(signature, &["SignatureValue"])?;
    let value = STANDARD
        .decode(value.as_bytes())
        .map_err(|e| CryptoError::Verification(format!("SignatureValue is not base64: {e}")))?;
    verify_sha1(public_key, signed_info.to_canonical()?.as_bytes(), &value)
}

/// Verify the enveloped signature of `element` against the certificate
/// embedded in its `KeyInfo/X509Data`.
pub fn verify_enveloped(element: &XmlElement) -> Result<(), CryptoError> {
    let signature = element
        .find_child(SIGNATURE)
        .ok_or_else(|| CryptoError::Verification("element carries no <Signature>".into()))?;
    let certificate = required_text(signature, &["KeyInfo", "X509Data", "X509Certificate"])?;
    let certificate = STANDARD
        .decode(certificate.as_bytes())
        .map_err(|e| CryptoError::Verification(format!("X509Certificate is not base64: {e}")))?;
    let public_key = public_key_from_certificate(&certificate)?;

    let mut unsigned = element.clone();
    unsigned.remove_children_named(SIGNATURE);
    check_signature(signature, unsigned.to_canonical()?.as_bytes(), &public_key)
}

/// Verify an id-referenced `signature` over its target in `document`,
/// using the given DER certificate.
pub fn verify_reference(
    document: &XmlElement,
    signature: &XmlElement,
    certificate_der: &[u8],
) -> Result<(), CryptoError> {
    let uri = signature
        .find_child("SignedInfo")
        .and_then(|si| si.find_child("Reference"))
        .and_then(|r| r.attribute("URI"))
        .ok_or_else(|| CryptoError::Verification("missing Reference URI".into()))?;
    let id = uri
        .strip_prefix('#')
        .ok_or_else(|| CryptoError::Verification(format!("unsupported Reference URI {uri:?}")))?;
    let target = resolve_id(document, id)?;
    let public_key = public_key_from_certificate(certificate_der)?;
    check_signature(signature, target.to_canonical()?.as_bytes(), &public_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_DER: &[u8] = include_bytes!("../../../fixtures/test_key.der");
    const CERT_DER: &[u8] = include_bytes!("../../../fixtures/test_cert.der");
    const DES: &str = "http://DescargaMasivaTerceros.sat.gob.mx";
    const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

    fn identity() -> SigningIdentity {
        SigningIdentity::from_der(KEY_DER, CERT_DER).unwrap()
    }

    fn solicitud() -> XmlElement {
        XmlElement::qualified("des", "solicitud", DES)
            .with_attribute("FechaInicial", "2023-01-01T00:00:00")
            .with_attribute("FechaFinal", "2023-01-31T23:59:59")
            .with_attribute("TipoSolicitud", "CFDI")
            .with_attribute("RfcReceptor", "AAA010101AAA")
    }

    #[test]
    fn enveloped_signature_is_last_child_and_verifies() {
        let identity = identity();
        let mut el = solicitud();
        SignatureEngine::new(&identity).sign_enveloped(&mut el).unwrap();

        assert_eq!(el.children().last().unwrap().name(), "Signature");
        verify_enveloped(&el).unwrap();
    }

    #[test]
    fn signature_embeds_issuer_serial_and_certificate() {
        let identity = identity();
        let mut el = solicitud();
        SignatureEngine::new(&identity).sign_enveloped(&mut el).unwrap();
        let sig = el.find_child("Signature").unwrap();
        let x509 = sig.find_child("KeyInfo").unwrap().find_child("X509Data").unwrap();
        let serial = x509
            .find_child("X509IssuerSerial")
            .unwrap()
            .find_child("X509SerialNumber")
            .unwrap()
            .text();
        assert_eq!(serial, identity.certificate().serial_number());
        assert_eq!(
            x509.find_child("X509Certificate").unwrap().text(),
            identity.certificate().to_base64()
        );
        let reference = sig
            .find_child("SignedInfo")
            .unwrap()
            .find_child("Reference")
            .unwrap();
        assert_eq!(reference.attribute("URI"), Some(""));
    }

    #[test]
    fn signing_twice_is_refused() {
        let identity = identity();
        let engine = SignatureEngine::new(&identity);
        let mut el = solicitud();
        engine.sign_enveloped(&mut el).unwrap();
        assert!(matches!(
            engine.sign_enveloped(&mut el),
            Err(CryptoError::AlreadySigned { .. })
        ));
    }

    #[test]
    fn tampering_breaks_verification() {
        let identity = identity();
        let mut el = solicitud();
        SignatureEngine::new(&identity).sign_enveloped(&mut el).unwrap();
        el.set_attribute("RfcReceptor", "BBB010101BBB");
        assert!(verify_enveloped(&el).is_err());
    }

    #[test]
    fn signature_survives_wire_round_trip() {
        let identity = identity();
        let mut el = solicitud();
        SignatureEngine::new(&identity).sign_enveloped(&mut el).unwrap();
        let envelope = XmlElement::qualified("s", "Body", "urn:s")
            .with_namespace(Some("des"), DES)
            .with_child(el);
        let reparsed = XmlElement::parse(&envelope.to_xml().unwrap()).unwrap();
        verify_enveloped(reparsed.find_child("solicitud").unwrap()).unwrap();
    }

    #[test]
    fn id_reference_signature_verifies() {
        let identity = identity();
        let header = XmlElement::new("Security").with_child(
            XmlElement::qualified("u", "Timestamp", WSU)
                .with_qualified_attribute("u", "Id", WSU, "_0")
                .with_child(XmlElement::qualified("u", "Created", WSU).with_text("2024-01-01T00:00:00.000Z")),
        );
        let spec = SignatureSpec {
            canonicalization: Canonicalization::Exclusive,
            reference: Reference::Id("_0".into()),
            key_info: KeyInfo::SecurityTokenReference {
                token_id: "uuid-1".into(),
                value_type: "urn:x509v3".into(),
                secext_namespace: "urn:o".into(),
            },
        };
        let signature = SignatureEngine::new(&identity)
            .sign_reference(&header, &spec)
            .unwrap();
        let uri = signature
            .find_descendant("Reference")
            .and_then(|r| r.attribute("URI"))
            .unwrap();
        assert_eq!(uri, "#_0");
        verify_reference(&header, &signature, CERT_DER).unwrap();
    }

    #[test]
    fn id_reference_must_match_exactly_one_element() {
        let identity = identity();
        let twice = XmlElement::new("r")
            .with_child(XmlElement::new("a").with_attribute("Id", "x"))
            .with_child(XmlElement::new("b").with_attribute("Id", "x"));
        let spec = SignatureSpec {
            reference: Reference::Id("x".into()),
            ..SignatureSpec::enveloped()
        };
        let engine = SignatureEngine::new(&identity);
        assert!(matches!(
            engine.sign_reference(&twice, &spec),
            Err(CryptoError::UnresolvedReference { count: 2, .. })
        ));
        let spec = SignatureSpec {
            reference: Reference::Id("missing".into()),
            ..spec
        };
        assert!(matches!(
            engine.sign_reference(&twice, &spec),
            Err(CryptoError::UnresolvedReference { count: 0, .. })
        ));
    }

    mod round_trip {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn any_attribute_text_verifies_after_wire_round_trip(
                complemento in "[ -~\t\n]{0,40}",
                rfc in "[A-Z]{3}[0-9]{6}[A-Z0-9]{3}",
            ) {
                let identity = identity();
                let mut el = XmlElement::qualified("des", "solicitud", DES)
                    .with_attribute("Complemento", complemento)
                    .with_attribute("RfcReceptor", rfc);
                SignatureEngine::new(&identity).sign_enveloped(&mut el).unwrap();
                let reparsed = XmlElement::parse(&el.to_xml().unwrap()).unwrap();
                prop_assert!(verify_enveloped(&reparsed).is_ok());
            }
        }
    }
}
