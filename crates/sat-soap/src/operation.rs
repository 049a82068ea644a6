//! # Service Operations
//!
//! Each remote operation is described by the element names it writes and
//! reads and the SOAP action it is posted with. Endpoint URLs are not part
//! of the descriptor: they are configuration (see `sat-client`), and the
//! production defaults here exist only so configuration has a source.

use sat_core::RequestKind;
use crate::builder::Destination;

/// One remote call of the bulk download protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Authenticate,
    SubmitIssued,
    SubmitReceived,
    SubmitFolio,
    Verify,
    Download,
}

impl Operation {
    /// Submission operation for a request variant. Third-party account
    /// requests travel as received-document requests.
    pub fn for_request(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Issued => Self::SubmitIssued,
            RequestKind::Received | RequestKind::ThirdParty => Self::SubmitReceived,
            RequestKind::Folio => Self::SubmitFolio,
        }
    }

    /// Element placed directly under `s:Body`.
    pub fn body_element(&self) -> &'static str {
        match self {
            Self::Authenticate => "Autentica",
            Self::SubmitIssued => "SolicitaDescargaEmitidos",
            Self::SubmitReceived => "SolicitaDescargaRecibidos",
            Self::SubmitFolio => "SolicitaDescargaFolio",
            Self::Verify => "VerificaSolicitudDescarga",
            Self::Download => "PeticionDescargaMasivaTercerosEntrada",
        }
    }

    /// The signed element nested in the body element.
    pub fn request_element(&self) -> &'static str {
        match self {
            Self::Download => "peticionDescarga",
            _ => "solicitud",
        }
    }

    /// Element of the response whose attributes carry the result.
    pub fn result_element(&self) -> &'static str {
        match self {
            Self::Authenticate => "AutenticaResult",
            Self::SubmitIssued => "SolicitaDescargaEmitidosResult",
            Self::SubmitReceived => "SolicitaDescargaRecibidosResult",
            Self::SubmitFolio => "SolicitaDescargaFolioResult",
            Self::Verify => "VerificaSolicitudDescargaResult",
            Self::Download => "respuesta",
        }
    }

    pub fn production_url(&self) -> &'static str {
        match self {
            Self::Authenticate => {
                "https://cfdidescargamasivasolicitud.clouda.sat.gob.mx/Autenticacion/Autenticacion.svc"
            }
            Self::SubmitIssued | Self::SubmitReceived | Self::SubmitFolio => {
                "https://cfdidescargamasivasolicitud.clouda.sat.gob.mx/SolicitaDescargaService.svc"
            }
            Self::Verify => {
                "https://cfdidescargamasivasolicitud.clouda.sat.gob.mx/VerificaSolicitudDescargaService.svc"
            }
            Self::Download => "https://cfdidescargamasiva.clouda.sat.gob.mx/DescargaMasivaService.svc",
        }
    }

    pub fn production_soap_action(&self) -> &'static str {
        match self {
            Self::Authenticate => "http://DescargaMasivaTerceros.gob.mx/IAutenticacion/Autentica",
            Self::SubmitIssued => {
                "http://DescargaMasivaTerceros.sat.gob.mx/ISolicitaDescargaService/SolicitaDescargaEmitidos"
            }
            Self::SubmitReceived => {
                "http://DescargaMasivaTerceros.sat.gob.mx/ISolicitaDescargaService/SolicitaDescargaRecibidos"
            }
            Self::SubmitFolio => {
                "http://DescargaMasivaTerceros.sat.gob.mx/ISolicitaDescargaService/SolicitaDescargaFolio"
            }
            Self::Verify => {
                "http://DescargaMasivaTerceros.sat.gob.mx/IVerificaSolicitudDescargaService/VerificaSolicitudDescarga"
            }
            Self::Download => {
                "http://DescargaMasivaTerceros.sat.gob.mx/IDescargaMasivaTercerosService/Descargar"
            }
        }
    }

    /// Production endpoint and action.
    pub fn production_destination(&self) -> Destination {
        Destination {
            url: self.production_url().to_string(),
            soap_action: self.production_soap_action().to_string(),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.body_element())
    }
}
