//! # Download Request Variants
//!
//! A download request is one of four variants sharing a common filter set:
//!
//! | Variant      | Mandatory fields                                              |
//! |--------------|---------------------------------------------------------------|
//! | `Issued`     | period, issuer RFC, request type                              |
//! | `Received`   | period, receiver RFC, request type                            |
//! | `ThirdParty` | period, receiver RFC, third-party-account RFC, request type   |
//! | `Folio`      | folio, requester RFC                                          |
//!
//! A folio request has no period: the two selection modes are mutually
//! exclusive by construction.
//!
//! ## Validation
//!
//! [`DownloadRequestBuilder::build`] runs a single pass over every field and
//! returns all failures at once. The same pass ([`DownloadRequest::validate`])
//! runs again inside the request builder of `sat-soap`, so a request can
//! never reach the signer in a malformed state.
//!
//! Optional string fields follow the service's "has value" rule: blank or
//! whitespace-only text counts as absent.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{FieldIssue, ValidationError};
use crate::identity::{Folio, Rfc};

/// Kind of content to download (`TipoSolicitud`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    /// Full CFDI XML documents.
    Cfdi,
    /// Metadata listing only.
    Metadata,
}

impl RequestType {
    pub fn as_sat_str(&self) -> &'static str {
        match self {
            Self::Cfdi => "CFDI",
            Self::Metadata => "Metadata",
        }
    }
}

/// CFDI document type (`TipoComprobante`). Absent means any type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    Ingreso,
    Egreso,
    Traslado,
    Nomina,
    Pago,
}

impl DocumentType {
    pub fn as_sat_str(&self) -> &'static str {
        match self {
            Self::Ingreso => "I",
            Self::Egreso => "E",
            Self::Traslado => "T",
            Self::Nomina => "N",
            Self::Pago => "P",
        }
    }
}

/// CFDI status (`EstadoComprobante`). Absent means any status.
///
/// XML downloads only ever include current documents; metadata listings
/// include both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    Cancelado,
    Vigente,
}

impl DocumentStatus {
    pub fn as_sat_str(&self) -> &'static str {
        match self {
            Self::Cancelado => "0",
            Self::Vigente => "1",
        }
    }
}

/// Inclusive calendar period, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::Request {
                issues: vec![period_order_issue(start, end)],
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

fn period_order_issue(start: NaiveDate, end: NaiveDate) -> FieldIssue {
    FieldIssue::conflict(
        "end_date",
        format!("end date {end} is before start date {start}"),
    )
}

/// The variant tag of a download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Issued,
    Received,
    ThirdParty,
    Folio,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Issued => "ISSUED",
            Self::Received => "RECEIVED",
            Self::ThirdParty => "THIRD_PARTY",
            Self::Folio => "FOLIO",
        };
        f.write_str(s)
    }
}

/// Filters shared by the three period-based variants.
///
/// Fields are private: a value only exists after the builder's validation
/// pass accepted it for a specific variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodFilters {
    period: DateRange,
    request_type: RequestType,
    issuer_rfc: Option<Rfc>,
    receiver_rfc: Option<Rfc>,
    requester_rfc: Option<Rfc>,
    third_party_rfc: Option<Rfc>,
    document_type: Option<DocumentType>,
    document_status: Option<DocumentStatus>,
    complement: Option<String>,
}

impl PeriodFilters {
    pub fn period(&self) -> &DateRange {
        &self.period
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn issuer_rfc(&self) -> Option<&Rfc> {
        self.issuer_rfc.as_ref()
    }

    pub fn receiver_rfc(&self) -> Option<&Rfc> {
        self.receiver_rfc.as_ref()
    }

    pub fn requester_rfc(&self) -> Option<&Rfc> {
        self.requester_rfc.as_ref()
    }

    pub fn third_party_rfc(&self) -> Option<&Rfc> {
        self.third_party_rfc.as_ref()
    }

    pub fn document_type(&self) -> Option<DocumentType> {
        self.document_type
    }

    pub fn document_status(&self) -> Option<DocumentStatus> {
        self.document_status
    }

    pub fn complement(&self) -> Option<&str> {
        self.complement.as_deref()
    }
}

/// Filters of a single-document (folio) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolioFilters {
    folio: Folio,
    requester_rfc: Rfc,
}

impl FolioFilters {
    pub fn folio(&self) -> &Folio {
        &self.folio
    }

    pub fn requester_rfc(&self) -> &Rfc {
        &self.requester_rfc
    }
}

/// A validated download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadRequest {
    /// Documents issued by `issuer_rfc`.
    Issued(PeriodFilters),
    /// Documents received by `receiver_rfc`.
    Received(PeriodFilters),
    /// Received documents handled on behalf of a third-party account.
    ThirdParty(PeriodFilters),
    /// One document by fiscal folio.
    Folio(FolioFilters),
}

impl DownloadRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Issued(_) => RequestKind::Issued,
            Self::Received(_) => RequestKind::Received,
            Self::ThirdParty(_) => RequestKind::ThirdParty,
            Self::Folio(_) => RequestKind::Folio,
        }
    }

    /// RFC that will sign the request, when the request names one.
    pub fn requester_rfc(&self) -> Option<&Rfc> {
        match self {
            Self::Issued(f) | Self::Received(f) | Self::ThirdParty(f) => f.requester_rfc(),
            Self::Folio(f) => Some(f.requester_rfc()),
        }
    }

    /// Run the variant-level validation pass.
    ///
    /// Values built by [`DownloadRequestBuilder`] always pass; the check
    /// is repeated by consumers that only see the finished request.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let (Self::Issued(f) | Self::Received(f) | Self::ThirdParty(f)) = self else {
            return report;
        };
        let present = |field: &str| match field {
            "issuer_rfc" => f.issuer_rfc.is_some(),
            "receiver_rfc" => f.receiver_rfc.is_some(),
            "third_party_rfc" => f.third_party_rfc.is_some(),
            _ => f.requester_rfc.is_some(),
        };
        for &field in required_rfcs(self.kind()) {
            if !present(field) {
                report.push(FieldIssue::missing(field));
            }
        }
        if f.period.start > f.period.end {
            report.push(period_order_issue(f.period.start, f.period.end));
        }
        if !matches!(self, Self::Issued(_)) {
            check_requester(&mut report, f.requester_rfc(), f.receiver_rfc());
        }
        report
    }
}

/// Outcome of a validation pass: empty means well-formed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    issues: Vec<FieldIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[FieldIssue] {
        &self.issues
    }

    pub fn push(&mut self, issue: FieldIssue) {
        self.issues.push(issue);
    }

    /// Convert into a `Result`, failing when any issue was recorded.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Request {
                issues: self.issues,
            })
        }
    }
}

/// Collects raw request fields and turns them into a [`DownloadRequest`].
///
/// Setters may be called in any order; the produced request (and thus its
/// canonical attribute order) does not depend on it.
#[derive(Debug, Clone)]
pub struct DownloadRequestBuilder {
    kind: RequestKind,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    folio: Option<String>,
    issuer_rfc: Option<String>,
    receiver_rfc: Option<String>,
    requester_rfc: Option<String>,
    third_party_rfc: Option<String>,
    request_type: Option<RequestType>,
    document_type: Option<DocumentType>,
    document_status: Option<DocumentStatus>,
    complement: Option<String>,
}

impl DownloadRequestBuilder {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            start_date: None,
            end_date: None,
            folio: None,
            issuer_rfc: None,
            receiver_rfc: None,
            requester_rfc: None,
            third_party_rfc: None,
            request_type: None,
            document_type: None,
            document_status: None,
            complement: None,
        }
    }

    pub fn issued() -> Self {
        Self::new(RequestKind::Issued)
    }

    pub fn received() -> Self {
        Self::new(RequestKind::Received)
    }

    pub fn third_party() -> Self {
        Self::new(RequestKind::ThirdParty)
    }

    pub fn by_folio() -> Self {
        Self::new(RequestKind::Folio)
    }

    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn end_date(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    pub fn period(self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date(start).end_date(end)
    }

    pub fn folio(mut self, folio: impl Into<String>) -> Self {
        self.folio = Some(folio.into());
        self
    }

    pub fn issuer_rfc(mut self, rfc: impl Into<String>) -> Self {
        self.issuer_rfc = Some(rfc.into());
        self
    }

    pub fn receiver_rfc(mut self, rfc: impl Into<String>) -> Self {
        self.receiver_rfc = Some(rfc.into());
        self
    }

    pub fn requester_rfc(mut self, rfc: impl Into<String>) -> Self {
        self.requester_rfc = Some(rfc.into());
        self
    }

    pub fn third_party_rfc(mut self, rfc: impl Into<String>) -> Self {
        self.third_party_rfc = Some(rfc.into());
        self
    }

    pub fn request_type(mut self, request_type: RequestType) -> Self {
        self.request_type = Some(request_type);
        self
    }

    pub fn document_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = Some(document_type);
        self
    }

    pub fn document_status(mut self, status: DocumentStatus) -> Self {
        self.document_status = Some(status);
        self
    }

    pub fn complement(mut self, complement: impl Into<String>) -> Self {
        self.complement = Some(complement.into());
        self
    }

    /// Validate every field and build the request.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Request` listing every missing, malformed
    /// or conflicting field.
    pub fn build(self) -> Result<DownloadRequest, ValidationError> {
        let mut report = ValidationReport::default();

        let issuer_rfc = parse_rfc(&mut report, "issuer_rfc", self.issuer_rfc.as_deref());
        let receiver_rfc = parse_rfc(&mut report, "receiver_rfc", self.receiver_rfc.as_deref());
        let requester_rfc =
            parse_rfc(&mut report, "requester_rfc", self.requester_rfc.as_deref());
        let third_party_rfc =
            parse_rfc(&mut report, "third_party_rfc", self.third_party_rfc.as_deref());

        for &field in required_rfcs(self.kind) {
            let raw = match field {
                "issuer_rfc" => &self.issuer_rfc,
                "receiver_rfc" => &self.receiver_rfc,
                "third_party_rfc" => &self.third_party_rfc,
                _ => &self.requester_rfc,
            };
            if !raw.as_deref().is_some_and(has_value) {
                report.push(FieldIssue::missing(field));
            }
        }

        if self.kind == RequestKind::Folio {
            if self.start_date.is_some() || self.end_date.is_some() {
                report.push(FieldIssue::conflict(
                    "start_date",
                    "a folio request must not declare a period",
                ));
            }
            let folio = match self.folio.as_deref().filter(|f| has_value(f)) {
                None => {
                    report.push(FieldIssue::missing("folio"));
                    None
                }
                Some(raw) => Folio::parse(raw)
                    .map_err(|e| report.push(FieldIssue::invalid("folio", e.to_string())))
                    .ok(),
            };
            report.into_result()?;
            return match (folio, requester_rfc) {
                (Some(folio), Some(requester_rfc)) => Ok(DownloadRequest::Folio(FolioFilters {
                    folio,
                    requester_rfc,
                })),
                _ => Err(ValidationError::Request {
                    issues: vec![FieldIssue::missing("folio")],
                }),
            };
        }

        if self.folio.as_deref().is_some_and(has_value) {
            report.push(FieldIssue::conflict(
                "folio",
                "a period request must not declare a folio",
            ));
        }
        if self.start_date.is_none() {
            report.push(FieldIssue::missing("start_date"));
        }
        if self.end_date.is_none() {
            report.push(FieldIssue::missing("end_date"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                report.push(period_order_issue(start, end));
            }
        }
        if self.request_type.is_none() {
            report.push(FieldIssue::missing("request_type"));
        }
        if self.kind != RequestKind::Issued {
            check_requester(&mut report, requester_rfc.as_ref(), receiver_rfc.as_ref());
        }
        report.into_result()?;

        let (Some(start), Some(end), Some(request_type)) =
            (self.start_date, self.end_date, self.request_type)
        else {
            return Err(ValidationError::Request {
                issues: vec![FieldIssue::missing("date_range")],
            });
        };
        let filters = PeriodFilters {
            period: DateRange { start, end },
            request_type,
            issuer_rfc,
            receiver_rfc,
            requester_rfc,
            third_party_rfc,
            document_type: self.document_type,
            document_status: self.document_status,
            complement: self
                .complement
                .filter(|c| has_value(c))
                .map(|c| c.trim().to_string()),
        };
        Ok(match self.kind {
            RequestKind::Issued => DownloadRequest::Issued(filters),
            RequestKind::Received => DownloadRequest::Received(filters),
            _ => DownloadRequest::ThirdParty(filters),
        })
    }
}

fn required_rfcs(kind: RequestKind) -> &'static [&'static str] {
    match kind {
        RequestKind::Issued => &["issuer_rfc"],
        RequestKind::Received => &["receiver_rfc"],
        RequestKind::ThirdParty => &["receiver_rfc", "third_party_rfc"],
        RequestKind::Folio => &["requester_rfc"],
    }
}

fn check_requester(report: &mut ValidationReport, requester: Option<&Rfc>, receiver: Option<&Rfc>) {
    if let (Some(requester), Some(receiver)) = (requester, receiver) {
        if requester != receiver {
            report.push(FieldIssue::conflict(
                "requester_rfc",
                format!("requester RFC {requester} must equal receiver RFC {receiver}"),
            ));
        }
    }
}

fn has_value(s: &str) -> bool {
    !s.trim().is_empty()
}

fn parse_rfc(report: &mut ValidationReport, field: &'static str, raw: Option<&str>) -> Option<Rfc> {
    let raw = raw.filter(|r| has_value(r))?;
    match Rfc::new(raw) {
        Ok(rfc) => Some(rfc),
        Err(e) => {
            report.push(FieldIssue::invalid(field, e.to_string()));
            None
        }
    }
}
