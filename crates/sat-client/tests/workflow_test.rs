//! Workflow scenarios against a scripted in-memory transport.
//!
//! | Scenario | Test |
//! |----------|------|
//! | Two packages, second transport call fails | `failing_package_keeps_the_others` |
//! | Completed with zero packages | `completed_without_packages_downloads_nothing` |
//! | Chunks A, B, C | `chunks_are_joined_before_decoding` |
//! | Token expiry between submit and poll | `expired_token_is_renewed_before_polling` |
//! | Cancellation mid-call | `cancellation_keeps_pre_call_state` |
//! | Requester differs from receiver | `mismatched_requester_never_reaches_the_wire` |
//! | Missing result element | `missing_result_element_reports_the_body` |

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{NaiveDate, Utc};
use common::*;
use sat_client::{
    ClientError, DownloadWorkflow, PollPolicy, SatClient, TokenCache, TransportError,
};
use sat_core::{DownloadRequestBuilder, RequestType};
use sat_soap::InterpretError;
use sat_state::{StatusTable, VerificationStatus, WorkflowState};
use tokio_util::sync::CancellationToken;

fn quick_polls() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 5,
        backoff_factor: 1.0,
        max_interval: Duration::from_secs(1),
    }
}

/// Authentication and submission both succeed.
fn accepted() -> ScriptedTransport {
    ScriptedTransport::new()
        .on(AUTH, Reply::ok(fresh_auth_response("token-1")))
        .on(SUBMIT, Reply::ok(submit_response("5000", "Solicitud Aceptada")))
}

// ── Packages ───────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_package_keeps_the_others() {
    let payload = b"PK\x03\x04 first package";
    let transport = Arc::new(
        accepted()
            .on(VERIFY, Reply::ok(verify_response("3", 2, &["pkg-1", "pkg-2"])))
            .on_body(DOWNLOAD, "pkg-1", Reply::ok(download_response(&[&STANDARD.encode(payload)])))
            .on_body(DOWNLOAD, "pkg-2", Reply::Timeout),
    );
    let mut workflow = DownloadWorkflow::new(client(transport.clone()));

    let report = workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.request_id.as_str(), REQUEST_ID);
    assert_eq!(report.packages.len(), 2);
    assert_eq!(report.packages[0].package_id.as_str(), "pkg-1");
    let first = report.packages[0].result.as_ref().unwrap();
    assert_eq!(first.payload, payload);

    assert_eq!(report.packages[1].package_id.as_str(), "pkg-2");
    assert!(matches!(
        report.packages[1].result,
        Err(ClientError::Transport(TransportError::Timeout { .. }))
    ));
    assert_eq!(report.downloaded().count(), 1);
    assert_eq!(report.failures().count(), 1);
    assert_eq!(workflow.state().state(), WorkflowState::Completed);
    assert_eq!(transport.count(DOWNLOAD), 2);
}

#[tokio::test]
async fn completed_without_packages_downloads_nothing() {
    let transport = Arc::new(accepted().on(VERIFY, Reply::ok(verify_response("3", 0, &[]))));
    let mut workflow = DownloadWorkflow::new(client(transport.clone()));

    let report = workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.packages.is_empty());
    assert_eq!(report.verification.status, VerificationStatus::Completed);
    assert_eq!(report.verification.document_count, 0);
    assert_eq!(workflow.state().state(), WorkflowState::Completed);
    assert_eq!(transport.count(DOWNLOAD), 0);
}

#[tokio::test]
async fn chunks_are_joined_before_decoding() {
    // "hello world" split so that no chunk is valid base64 on its own.
    let transport = Arc::new(
        accepted()
            .on(VERIFY, Reply::ok(verify_response("3", 1, &["pkg-1"])))
            .on(DOWNLOAD, Reply::ok(download_response(&["aGVsbG", "8gd29y", "bGQ="]))),
    );
    let mut workflow = DownloadWorkflow::new(client(transport));

    let report = workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap();

    let package = report.downloaded().next().unwrap();
    assert_eq!(package.payload, b"hello world");
}

// ── Polling ────────────────────────────────────────────────────────────

#[tokio::test]
async fn in_progress_keeps_polling_until_completed() {
    let transport = Arc::new(
        accepted()
            .on(VERIFY, Reply::ok(verify_response("1", 0, &[])))
            .on(VERIFY, Reply::ok(verify_response("2", 0, &[])))
            .on(VERIFY, Reply::ok(verify_response("3", 1, &["pkg-1"])))
            .on(DOWNLOAD, Reply::ok(download_response(&["aGVsbG8="]))),
    );
    let mut workflow = DownloadWorkflow::new(client(transport.clone()));

    workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(transport.count(VERIFY), 3);
    let path: Vec<_> = workflow.state().transitions().iter().map(|t| t.to).collect();
    assert_eq!(
        path,
        vec![
            WorkflowState::Authenticated,
            WorkflowState::Submitted,
            WorkflowState::Verifying,
            WorkflowState::Completed,
        ]
    );
}

#[tokio::test]
async fn poll_budget_is_bounded() {
    let transport = Arc::new(accepted().on(VERIFY, Reply::ok(verify_response("2", 0, &[]))));
    let mut workflow = DownloadWorkflow::new(client(transport.clone()));
    let policy = PollPolicy {
        max_attempts: 3,
        ..quick_polls()
    };

    let err = workflow
        .run(&january_request(), &policy, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::PollExhausted { attempts: 3 }));
    assert_eq!(transport.count(VERIFY), 3);
    assert_eq!(workflow.state().state(), WorkflowState::Verifying);
}

#[tokio::test]
async fn expired_request_is_terminal() {
    let transport = Arc::new(accepted().on(VERIFY, Reply::ok(verify_response("6", 0, &[]))));
    let mut workflow = DownloadWorkflow::new(client(transport));

    let err = workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::RequestEnded {
            status: VerificationStatus::Expired,
            ..
        }
    ));
    assert_eq!(workflow.state().state(), WorkflowState::Expired);
}

#[tokio::test]
async fn request_states_resolve_through_the_configured_table() {
    let transport = Arc::new(accepted().on(VERIFY, Reply::ok(verify_response("9", 0, &[]))));
    let mut config = config();
    config.status_table = StatusTable::sat().with_request_state("9", VerificationStatus::Completed);
    let client = Arc::new(SatClient::with_transport(config, identity(), transport.clone()));
    let mut workflow = DownloadWorkflow::new(client);

    let report = workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.verification.status, VerificationStatus::Completed);
    assert_eq!(workflow.state().state(), WorkflowState::Completed);
    assert_eq!(transport.count(VERIFY), 1);
}

#[tokio::test]
async fn unmapped_request_state_is_reported() {
    let transport = Arc::new(accepted().on(VERIFY, Reply::ok(verify_response("9", 0, &[]))));
    let mut workflow = DownloadWorkflow::new(client(transport));

    let err = workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Interpret(InterpretError::InvalidResponseContent { .. })
    ));
}

// ── Tokens ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_token_is_renewed_before_polling() {
    let now = Utc::now();
    let short_lived = auth_response("token-1", now, now + chrono::Duration::milliseconds(300));
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(AUTH, Reply::ok(short_lived))
            .on(AUTH, Reply::ok(fresh_auth_response("token-2")))
            .on(SUBMIT, Reply::ok(submit_response("5000", "Solicitud Aceptada")))
            .on(VERIFY, Reply::ok(verify_response("3", 0, &[]))),
    );
    let mut workflow = DownloadWorkflow::new(client(transport.clone()));
    let policy = PollPolicy {
        interval: Duration::from_millis(600),
        ..quick_polls()
    };

    workflow
        .run(&january_request(), &policy, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(transport.count(AUTH), 2);
    let tokens: Vec<_> = transport
        .calls()
        .into_iter()
        .filter(|c| !c.soap_action.ends_with(AUTH))
        .map(|c| c.token.unwrap())
        .collect();
    assert_eq!(tokens, vec!["token-1", "token-2"]);
    assert_eq!(workflow.state().request_id().unwrap().as_str(), REQUEST_ID);
}

#[tokio::test]
async fn concurrent_callers_share_one_renewal() {
    let transport = Arc::new(
        ScriptedTransport::new().on(AUTH, Reply::ok(fresh_auth_response("shared"))),
    );
    let client = client(transport.clone());
    let tokens = Arc::new(TokenCache::new(chrono::Duration::zero()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.get(&client, &CancellationToken::new()).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().value(), "shared");
    }
    assert_eq!(transport.count(AUTH), 1);
}

// ── Failures ───────────────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_keeps_pre_call_state() {
    let transport = Arc::new(accepted().on(VERIFY, Reply::Hang));
    let mut workflow = DownloadWorkflow::new(client(transport.clone()));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = workflow
        .run(&january_request(), &quick_polls(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(workflow.state().state(), WorkflowState::Submitted);
    assert_eq!(workflow.state().transitions().len(), 2);
    assert_eq!(transport.count(VERIFY), 1);
}

#[tokio::test]
async fn mismatched_requester_never_reaches_the_wire() {
    let transport = Arc::new(accepted());
    let _client = client(transport.clone());

    let err = DownloadRequestBuilder::received()
        .period(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        )
        .receiver_rfc(RECEIVER)
        .requester_rfc("BBB010101BBB")
        .request_type(RequestType::Cfdi)
        .build()
        .unwrap_err();

    assert!(err.mentions("requester_rfc"));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn missing_result_element_reports_the_body() {
    let body = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><Unexpected/></s:Body></s:Envelope>"#;
    let transport = Arc::new(accepted().on(VERIFY, Reply::ok(body.to_string())));
    let mut workflow = DownloadWorkflow::new(client(transport));

    let err = workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        ClientError::Interpret(InterpretError::InvalidResponseContent { body: raw, .. }) => {
            assert_eq!(raw, body);
        }
        other => panic!("expected invalid response content, got {other:?}"),
    }
    assert_eq!(workflow.state().state(), WorkflowState::Failed);
}

#[tokio::test]
async fn business_rejection_is_terminal() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(AUTH, Reply::ok(fresh_auth_response("token-1")))
            .on(SUBMIT, Reply::ok(submit_response("5004", "No se encontró la información"))),
    );
    let mut workflow = DownloadWorkflow::new(client(transport.clone()));

    let err = workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ClientError::Rejected { code, message, .. } => {
            assert_eq!(code, "5004");
            assert_eq!(message, "No se encontró la información");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(workflow.state().state(), WorkflowState::Rejected);
    assert_eq!(transport.count(VERIFY), 0);
}

#[tokio::test]
async fn authentication_fault_fails_the_workflow() {
    let transport = Arc::new(ScriptedTransport::new().on(AUTH, Reply::Body(500, fault_response())));
    let mut workflow = DownloadWorkflow::new(client(transport.clone()));

    let err = workflow
        .run(&january_request(), &quick_polls(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Interpret(InterpretError::SoapFault { .. })
    ));
    assert_eq!(workflow.state().state(), WorkflowState::Failed);
    assert_eq!(transport.count(AUTH), 1);
    assert_eq!(transport.count(SUBMIT), 0);
}

#[tokio::test]
async fn transient_submit_failure_can_be_retried_by_the_caller() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(AUTH, Reply::ok(fresh_auth_response("token-1")))
            .on(SUBMIT, Reply::Timeout)
            .on(SUBMIT, Reply::ok(submit_response("5000", "Solicitud Aceptada"))),
    );
    let mut workflow = DownloadWorkflow::new(client(transport));
    let cancel = CancellationToken::new();

    workflow.authenticate(&cancel).await.unwrap();
    let err = workflow.submit(&january_request(), &cancel).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(workflow.state().state(), WorkflowState::Authenticated);

    let submission = workflow.submit(&january_request(), &cancel).await.unwrap();
    assert_eq!(submission.request_id.as_str(), REQUEST_ID);
    assert_eq!(workflow.state().state(), WorkflowState::Submitted);
}
