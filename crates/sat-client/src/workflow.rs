//! # Download Workflow
//!
//! Drives one download request through authenticate → submit → verify →
//! download, recording every state change in a [`Workflow`].
//!
//! The single-step operations ([`authenticate`](DownloadWorkflow::authenticate),
//! [`submit`](DownloadWorkflow::submit), [`poll`](DownloadWorkflow::poll),
//! [`download_all`](DownloadWorkflow::download_all)) are public so an
//! external scheduler can own the poll cadence. [`run`](DownloadWorkflow::run)
//! chains them with a [`PollPolicy`].
//!
//! ## Failure Handling
//!
//! | Error                         | Workflow effect          |
//! |-------------------------------|--------------------------|
//! | Local validation              | none (nothing was sent)  |
//! | Cancelled, transient transport| none (safe to retry)     |
//! | Business rejection            | → Rejected               |
//! | Fault, HTTP, response shape   | → Failed                 |
//!
//! Package downloads run as independent tasks. A failing package is
//! reported in its own [`PackageOutcome`] and never affects the others.

use std::sync::Arc;
use std::time::Duration;

use sat_core::{DownloadRequest, FieldIssue, PackageId, RequestId, Rfc, ValidationError};
use sat_state::{StateError, VerificationStatus, Workflow, WorkflowState};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::client::{DownloadedPackage, SatClient, Submission, VerificationResult};
use crate::error::ClientError;
use crate::token::TokenCache;

// ─── Poll Policy ────────────────────────────────────────────────────────

/// Cadence of the verification loop in [`DownloadWorkflow::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Wait before the first poll.
    pub interval: Duration,
    pub max_attempts: u32,
    /// Multiplier applied to the wait after every poll (1.0 keeps it
    /// constant).
    pub backoff_factor: f64,
    /// Upper bound on any single wait.
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_attempts: 60,
            backoff_factor: 1.0,
            max_interval: Duration::from_secs(600),
        }
    }
}

impl PollPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_factor
            .max(1.0)
            .powi(attempt.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(self.interval.as_secs_f64() * factor)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

// ─── Outcomes ───────────────────────────────────────────────────────────

/// Result of downloading one package.
#[derive(Debug)]
pub struct PackageOutcome {
    pub package_id: PackageId,
    pub result: Result<DownloadedPackage, ClientError>,
}

/// Everything a completed [`DownloadWorkflow::run`] produced.
#[derive(Debug)]
pub struct DownloadReport {
    pub request_id: RequestId,
    pub verification: VerificationResult,
    /// One outcome per package id, in verification order.
    pub packages: Vec<PackageOutcome>,
}

impl DownloadReport {
    pub fn downloaded(&self) -> impl Iterator<Item = &DownloadedPackage> {
        self.packages.iter().filter_map(|p| p.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PackageId, &ClientError)> {
        self.packages
            .iter()
            .filter_map(|p| p.result.as_ref().err().map(|e| (&p.package_id, e)))
    }
}

// ─── Workflow ───────────────────────────────────────────────────────────

/// One download request and its protocol state.
#[derive(Debug)]
pub struct DownloadWorkflow {
    client: Arc<SatClient>,
    tokens: Arc<TokenCache>,
    state: Workflow,
    requester: Option<Rfc>,
    verification: Option<VerificationResult>,
}

impl DownloadWorkflow {
    /// A workflow with its own token cache.
    pub fn new(client: Arc<SatClient>) -> Self {
        let tokens = Arc::new(TokenCache::new(client.config().token_refresh_margin));
        Self::with_tokens(client, tokens)
    }

    /// A workflow sharing `tokens` with other workflows.
    pub fn with_tokens(client: Arc<SatClient>, tokens: Arc<TokenCache>) -> Self {
        Self {
            client,
            tokens,
            state: Workflow::new(),
            requester: None,
            verification: None,
        }
    }

    pub fn state(&self) -> &Workflow {
        &self.state
    }

    /// The most recent verification result.
    pub fn verification(&self) -> Option<&VerificationResult> {
        self.verification.as_ref()
    }

    /// UNAUTHENTICATED → AUTHENTICATED.
    pub async fn authenticate(&mut self, cancel: &CancellationToken) -> Result<(), ClientError> {
        ensure_state(&self.state, &[WorkflowState::Unauthenticated], WorkflowState::Authenticated)?;
        match self.tokens.renew(&self.client, cancel).await {
            Ok(_) => {
                self.state.authenticated()?;
                Ok(())
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    /// AUTHENTICATED → SUBMITTED, or REJECTED on a business rejection.
    pub async fn submit(
        &mut self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<Submission, ClientError> {
        ensure_state(&self.state, &[WorkflowState::Authenticated], WorkflowState::Submitted)?;
        let requester = requester_of(request)?.clone();
        let submitted = async {
            let token = self.tokens.get(&self.client, cancel).await?;
            self.client.submit(&token, request, cancel).await
        }
        .await;
        match submitted {
            Ok(submission) => {
                self.state.submitted(submission.request_id.clone())?;
                self.requester = Some(requester);
                Ok(submission)
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    /// One verification poll (SUBMITTED | VERIFYING → next state).
    pub async fn poll(&mut self, cancel: &CancellationToken) -> Result<VerificationResult, ClientError> {
        let (request_id, requester) = match (self.state.request_id(), self.requester.as_ref()) {
            (Some(id), Some(rfc)) if !self.state.state().is_terminal() => (id.clone(), rfc.clone()),
            _ => {
                return Err(StateError::InvalidTransition {
                    from: self.state.state(),
                    to: WorkflowState::Verifying,
                }
                .into())
            }
        };
        let verified = async {
            let token = self.tokens.get(&self.client, cancel).await?;
            self.client.verify(&token, &request_id, &requester, cancel).await
        }
        .await;
        match verified {
            Ok(result) => {
                let reason = format!("{} {}", result.request_state_code, result.message);
                let next = self.state.observe_verification(
                    result.status,
                    result.package_ids.clone(),
                    reason.trim(),
                )?;
                if next == WorkflowState::Completed {
                    tracing::info!(
                        request_id = %request_id,
                        documents = result.document_count,
                        packages = result.package_ids.len(),
                        "download request completed"
                    );
                }
                self.verification = Some(result.clone());
                Ok(result)
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    /// Download every package of a completed workflow, at most
    /// `download_concurrency` at a time. Zero packages yields no outcomes.
    pub async fn download_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageOutcome>, ClientError> {
        let requester = match (self.state.state(), self.requester.as_ref()) {
            (WorkflowState::Completed, Some(rfc)) => rfc.clone(),
            (state, _) => {
                return Err(StateError::InvalidTransition {
                    from: state,
                    to: WorkflowState::Completed,
                }
                .into())
            }
        };

        let permits = Arc::new(Semaphore::new(
            self.client.config().download_concurrency.max(1),
        ));
        let handles: Vec<_> = self
            .state
            .package_ids()
            .iter()
            .cloned()
            .map(|package_id| {
                let client = Arc::clone(&self.client);
                let tokens = Arc::clone(&self.tokens);
                let permits = Arc::clone(&permits);
                let requester = requester.clone();
                let cancel = cancel.clone();
                let id = package_id.clone();
                let handle = tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| ClientError::Task(e.to_string()))?;
                    let token = tokens.get(&client, &cancel).await?;
                    client.download(&token, &id, &requester, &cancel).await
                });
                (package_id, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (package_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ClientError::Task(e.to_string())),
            };
            if let Err(e) = &result {
                tracing::warn!(package_id = %package_id, "package download failed: {e}");
            }
            outcomes.push(PackageOutcome { package_id, result });
        }
        Ok(outcomes)
    }

    /// Run the whole sequence: authenticate if needed, submit, poll per
    /// `policy` until the request is resolved, then download every
    /// package.
    pub async fn run(
        &mut self,
        request: &DownloadRequest,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport, ClientError> {
        if self.state.state() == WorkflowState::Unauthenticated {
            self.authenticate(cancel).await?;
        }
        let submission = self.submit(request, cancel).await?;

        let mut attempt = 0;
        let verification = loop {
            if attempt >= policy.max_attempts {
                return Err(ClientError::PollExhausted { attempts: attempt });
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(policy.delay(attempt)) => {}
            }
            attempt += 1;
            let result = self.poll(cancel).await?;
            match self.state.state() {
                WorkflowState::Verifying => continue,
                WorkflowState::Completed => break result,
                _ => {
                    return Err(ClientError::RequestEnded {
                        status: result.status,
                        code: result.request_state_code,
                        message: result.message,
                    })
                }
            }
        };

        let packages = self.download_all(cancel).await?;
        Ok(DownloadReport {
            request_id: submission.request_id,
            verification,
            packages,
        })
    }

    /// Apply the failure table and hand the error back.
    fn record_failure(&mut self, err: ClientError) -> ClientError {
        let recorded = match &err {
            ClientError::Validation(_) | ClientError::Cancelled => Ok(()),
            e if e.is_retryable() => Ok(()),
            ClientError::Rejected { code, message, .. } => {
                self.state.rejected(&format!("{code} {message}"))
            }
            other => self.state.failed(&other.to_string()),
        };
        if let Err(state_err) = recorded {
            tracing::debug!(state = %self.state.state(), "failure not recorded: {state_err}");
        }
        err
    }
}

fn ensure_state(
    workflow: &Workflow,
    allowed: &[WorkflowState],
    to: WorkflowState,
) -> Result<(), StateError> {
    let from = workflow.state();
    if from.is_terminal() {
        return Err(StateError::TerminalState { state: from });
    }
    if !allowed.contains(&from) {
        return Err(StateError::InvalidTransition { from, to });
    }
    Ok(())
}

/// RFC that signs verification and download calls for `request`.
fn requester_of(request: &DownloadRequest) -> Result<&Rfc, ValidationError> {
    request
        .requester_rfc()
        .or(match request {
            DownloadRequest::Issued(f) => f.issuer_rfc(),
            DownloadRequest::Received(f) | DownloadRequest::ThirdParty(f) => f.receiver_rfc(),
            DownloadRequest::Folio(f) => Some(f.requester_rfc()),
        })
        .ok_or_else(|| ValidationError::Request {
            issues: vec![FieldIssue::missing("requester_rfc")],
        })
}

// ─── Tests ──────────────────────────────────────────────────────────────
