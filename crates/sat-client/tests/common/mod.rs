//! Shared fixtures for the sat-client integration tests: the test signing
//! identity, canned service responses and a scripted in-memory transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sat_client::{RetryPolicy, SatClient, ServiceConfig, SoapTransport, TransportError};
use sat_core::{AccessToken, DownloadRequest, DownloadRequestBuilder, RequestType};
use sat_crypto::SigningIdentity;
use sat_soap::{Destination, TransportResult};
use tokio_util::sync::CancellationToken;

pub const RECEIVER: &str = "AAA010101AAA";
pub const REQUEST_ID: &str = "4e80345d-917f-40bb-a98f-4a73939343c5";

pub fn identity() -> Arc<SigningIdentity> {
    Arc::new(
        SigningIdentity::from_der(
            include_bytes!("../../../../fixtures/test_key.der"),
            include_bytes!("../../../../fixtures/test_cert.der"),
        )
        .unwrap(),
    )
}

/// Mock configuration with retries off and no refresh margin.
pub fn config() -> ServiceConfig {
    let mut config = ServiceConfig::local_mock("http://127.0.0.1:9").unwrap();
    config.retry = RetryPolicy::none();
    config.token_refresh_margin = chrono::Duration::zero();
    config
}

pub fn client(transport: Arc<ScriptedTransport>) -> Arc<SatClient> {
    Arc::new(SatClient::with_transport(config(), identity(), transport))
}

/// Received documents for January 2023.
pub fn january_request() -> DownloadRequest {
    DownloadRequestBuilder::received()
        .period(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        )
        .receiver_rfc(RECEIVER)
        .request_type(RequestType::Cfdi)
        .build()
        .unwrap()
}

// ─── Canned Responses ───────────────────────────────────────────────────

fn stamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn auth_response(token: &str, created: DateTime<Utc>, expires: DateTime<Utc>) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" xmlns:u="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><s:Header><o:Security s:mustUnderstand="1" xmlns:o="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"><u:Timestamp u:Id="_0"><u:Created>{}</u:Created><u:Expires>{}</u:Expires></u:Timestamp></o:Security></s:Header><s:Body><AutenticaResponse xmlns="http://DescargaMasivaTerceros.gob.mx"><AutenticaResult>{token}</AutenticaResult></AutenticaResponse></s:Body></s:Envelope>"#,
        stamp(created),
        stamp(expires)
    )
}

/// A token valid for the next five minutes.
pub fn fresh_auth_response(token: &str) -> String {
    let now = Utc::now();
    auth_response(token, now, now + chrono::Duration::minutes(5))
}

pub fn fault_response() -> String {
    r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><s:Fault><faultcode xmlns:a="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">a:InvalidSecurity</faultcode><faultstring xml:lang="en-US">An error occurred when verifying security for the message.</faultstring></s:Fault></s:Body></s:Envelope>"#.to_string()
}

pub fn submit_response(code: &str, message: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><SolicitaDescargaRecibidosResponse xmlns="http://DescargaMasivaTerceros.sat.gob.mx"><SolicitaDescargaRecibidosResult IdSolicitud="{REQUEST_ID}" CodEstatus="{code}" Mensaje="{message}"/></SolicitaDescargaRecibidosResponse></s:Body></s:Envelope>"#
    )
}

pub fn verify_response(state: &str, count: u32, packages: &[&str]) -> String {
    let ids: String = packages
        .iter()
        .map(|id| format!("<IdsPaquetes>{id}</IdsPaquetes>"))
        .collect();
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><VerificaSolicitudDescargaResponse xmlns="http://DescargaMasivaTerceros.sat.gob.mx"><VerificaSolicitudDescargaResult CodEstatus="5000" EstadoSolicitud="{state}" CodigoEstadoSolicitud="5000" NumeroCFDIs="{count}" Mensaje="Solicitud Aceptada">{ids}</VerificaSolicitudDescargaResult></VerificaSolicitudDescargaResponse></s:Body></s:Envelope>"#
    )
}

pub fn download_response(chunks: &[&str]) -> String {
    let packages: String = chunks
        .iter()
        .map(|c| format!("<Paquete>{c}</Paquete>"))
        .collect();
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Header><h:respuesta xmlns:h="http://DescargaMasivaTerceros.sat.gob.mx" xmlns="http://DescargaMasivaTerceros.sat.gob.mx" CodEstatus="5000" Mensaje="Solicitud Aceptada"/></s:Header><s:Body><RespuestaDescargaMasivaTercerosSalida xmlns="http://DescargaMasivaTerceros.sat.gob.mx">{packages}</RespuestaDescargaMasivaTercerosSalida></s:Body></s:Envelope>"#
    )
}

// ─── Scripted Transport ─────────────────────────────────────────────────

/// SOAP action suffixes of the four services.
pub const AUTH: &str = "/Autentica";
pub const SUBMIT: &str = "/SolicitaDescargaRecibidos";
pub const VERIFY: &str = "/VerificaSolicitudDescarga";
pub const DOWNLOAD: &str = "/Descargar";

#[derive(Debug, Clone)]
pub enum Reply {
    Body(u16, String),
    Timeout,
    /// Never answers; resolves only through cancellation.
    Hang,
}

impl Reply {
    pub fn ok(body: String) -> Self {
        Self::Body(200, body)
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub soap_action: String,
    pub token: Option<String>,
    pub body: String,
}

struct Rule {
    action: &'static str,
    body_contains: Option<String>,
    replies: VecDeque<Reply>,
}

/// Answers each call from the first matching rule. A rule replays its
/// last reply once the queue is down to one.
#[derive(Default)]
pub struct ScriptedTransport {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, action: &'static str, reply: Reply) -> Self {
        self.push(action, None, reply);
        self
    }

    /// Rule for calls whose body contains `needle`. Register these before
    /// the generic rule for the same action.
    pub fn on_body(self, action: &'static str, needle: &str, reply: Reply) -> Self {
        self.push(action, Some(needle.to_string()), reply);
        self
    }

    fn push(&self, action: &'static str, body_contains: Option<String>, reply: Reply) {
        let mut rules = self.rules.lock().unwrap();
        match rules
            .iter_mut()
            .find(|r| r.action == action && r.body_contains == body_contains)
        {
            Some(rule) => rule.replies.push_back(reply),
            None => rules.push(Rule {
                action,
                body_contains,
                replies: VecDeque::from([reply]),
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, action: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.soap_action.ends_with(action))
            .count()
    }

    fn next_reply(&self, call: &Call) -> Reply {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules.iter_mut().find(|r| {
            call.soap_action.ends_with(r.action)
                && r.body_contains
                    .as_deref()
                    .map_or(true, |needle| call.body.contains(needle))
        });
        match rule {
            Some(rule) if rule.replies.len() > 1 => rule.replies.pop_front().unwrap(),
            Some(rule) => rule.replies[0].clone(),
            None => Reply::Body(500, format!("unscripted call to {}", call.soap_action)),
        }
    }
}

#[async_trait]
impl SoapTransport for ScriptedTransport {
    async fn send(
        &self,
        destination: &Destination,
        token: Option<&AccessToken>,
        body: &str,
        cancel: &CancellationToken,
    ) -> Result<TransportResult, TransportError> {
        let call = Call {
            soap_action: destination.soap_action.clone(),
            token: token.map(|t| t.value().to_string()),
            body: body.to_string(),
        };
        let reply = self.next_reply(&call);
        self.calls.lock().unwrap().push(call);
        match reply {
            Reply::Body(status, body) => Ok(TransportResult::new(status, body)),
            Reply::Timeout => Err(TransportError::Timeout {
                endpoint: destination.url.clone(),
            }),
            Reply::Hang => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled {
                    endpoint: destination.url.clone(),
                })
            }
        }
    }
}
