//! Wire constants: namespaces, prefixes and WS-Security token types.

/// SOAP 1.1 envelope.
pub const SOAP_ENVELOPE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_PREFIX: &str = "s";

/// Bulk download service elements.
pub const DESCARGA: &str = "http://DescargaMasivaTerceros.sat.gob.mx";
pub const DESCARGA_PREFIX: &str = "des";

/// Authentication service body element. Note the missing `.sat`.
pub const AUTENTICACION: &str = "http://DescargaMasivaTerceros.gob.mx";

/// XML digital signature.
pub const XMLDSIG: &str = sat_crypto::xmldsig::DSIG_NAMESPACE;
pub const XMLDSIG_PREFIX: &str = "xd";

/// WS-Security utility (`u:Timestamp`, `u:Id`).
pub const WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const WSU_PREFIX: &str = "u";

/// WS-Security extensions (`o:Security`, `o:BinarySecurityToken`).
pub const WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSSE_PREFIX: &str = "o";

pub const X509_TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
pub const BASE64_ENCODING: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
