//! # Download Workflow State Machine
//!
//! ## States
//!
//! ```text
//! Unauthenticated ──▶ Authenticated ──▶ Submitted ──▶ Verifying ──▶ Completed
//!        │                  │               │             │
//!        └──▶ Failed        └──▶ Rejected   └─────────────┴──▶ Rejected | Expired | Failed
//! ```
//!
//! Verification results drive the last step:
//!
//! | `EstadoSolicitud`        | Packages | Next state  |
//! |--------------------------|----------|-------------|
//! | In progress              | any      | Verifying   |
//! | Accepted                 | none     | Verifying   |
//! | Accepted                 | some     | Completed   |
//! | Completed                | any      | Completed   |
//! | Rejected/Expired/Failed  | any      | same        |
//!
//! Token renewal is not a transition: a workflow keeps its request id and
//! state across re-authentication.

use chrono::{DateTime, Utc};
use sat_core::{PackageId, RequestId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::VerificationStatus;

// ─── Workflow State ──────────────────────────────────────────────────

/// The protocol state of one download workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Unauthenticated,
    Authenticated,
    Submitted,
    Verifying,
    Completed,
    Rejected,
    Expired,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Rejected | Self::Expired | Self::Failed
        )
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Authenticated => "AUTHENTICATED",
            Self::Submitted => "SUBMITTED",
            Self::Verifying => "VERIFYING",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The transition is not allowed from the current state.
    #[error("invalid workflow transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    /// The workflow already reached a terminal state.
    #[error("workflow is in terminal state {state}")]
    TerminalState { state: WorkflowState },
}

// ─── Transition Record ───────────────────────────────────────────────

/// Record of one state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

// ─── Workflow ────────────────────────────────────────────────────────

/// State, request id, package ids and transition history of one
/// workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    state: WorkflowState,
    request_id: Option<RequestId>,
    package_ids: Vec<PackageId>,
    transitions: Vec<TransitionRecord>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Unauthenticated,
            request_id: None,
            package_ids: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Package ids reported by the completing verification.
    pub fn package_ids(&self) -> &[PackageId] {
        &self.package_ids
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// UNAUTHENTICATED → AUTHENTICATED.
    pub fn authenticated(&mut self) -> Result<(), StateError> {
        self.require(&[WorkflowState::Unauthenticated], WorkflowState::Authenticated)?;
        self.transition(WorkflowState::Authenticated, "authenticated");
        Ok(())
    }

    /// AUTHENTICATED → SUBMITTED, keeping the assigned request id.
    pub fn submitted(&mut self, request_id: RequestId) -> Result<(), StateError> {
        self.require(&[WorkflowState::Authenticated], WorkflowState::Submitted)?;
        let reason = format!("request {request_id} accepted");
        self.request_id = Some(request_id);
        self.transition(WorkflowState::Submitted, &reason);
        Ok(())
    }

    /// A business rejection of a submission or a poll.
    pub fn rejected(&mut self, reason: &str) -> Result<(), StateError> {
        self.require(
            &[
                WorkflowState::Authenticated,
                WorkflowState::Submitted,
                WorkflowState::Verifying,
            ],
            WorkflowState::Rejected,
        )?;
        self.transition(WorkflowState::Rejected, reason);
        Ok(())
    }

    /// A failure from which the workflow cannot continue.
    pub fn failed(&mut self, reason: &str) -> Result<(), StateError> {
        self.require_live()?;
        self.transition(WorkflowState::Failed, reason);
        Ok(())
    }

    /// Apply one verification result (SUBMITTED | VERIFYING → next).
    pub fn observe_verification(
        &mut self,
        status: VerificationStatus,
        package_ids: Vec<PackageId>,
        reason: &str,
    ) -> Result<WorkflowState, StateError> {
        let next = match status {
            VerificationStatus::InProgress => WorkflowState::Verifying,
            VerificationStatus::Accepted if package_ids.is_empty() => WorkflowState::Verifying,
            VerificationStatus::Accepted | VerificationStatus::Completed => WorkflowState::Completed,
            VerificationStatus::Rejected => WorkflowState::Rejected,
            VerificationStatus::Expired => WorkflowState::Expired,
            VerificationStatus::Failed => WorkflowState::Failed,
        };
        self.require(
            &[WorkflowState::Submitted, WorkflowState::Verifying],
            next,
        )?;
        if next == WorkflowState::Completed {
            self.package_ids = package_ids;
        }
        if next != self.state {
            self.transition(next, reason);
        }
        Ok(next)
    }

    fn require_live(&self) -> Result<(), StateError> {
        if self.state.is_terminal() {
            return Err(StateError::TerminalState { state: self.state });
        }
        Ok(())
    }

    fn require(&self, allowed: &[WorkflowState], to: WorkflowState) -> Result<(), StateError> {
        self.require_live()?;
        if !allowed.contains(&self.state) {
            return Err(StateError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    fn transition(&mut self, to: WorkflowState, reason: &str) {
        tracing::info!(from = %self.state, to = %to, reason, "workflow transition");
        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.state = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted() -> Workflow {
        let mut wf = Workflow::new();
        wf.authenticated().unwrap();
        wf.submitted(RequestId::new("req-1").unwrap()).unwrap();
        wf
    }

    fn packages(ids: &[&str]) -> Vec<PackageId> {
        ids.iter().map(|id| PackageId::new(*id).unwrap()).collect()
    }

    #[test]
    fn happy_path_records_every_transition() {
        let mut wf = submitted();
        assert_eq!(
            wf.observe_verification(VerificationStatus::InProgress, vec![], "2")
                .unwrap(),
            WorkflowState::Verifying
        );
        assert_eq!(
            wf.observe_verification(VerificationStatus::Completed, packages(&["pkg-1", "pkg-2"]), "3")
                .unwrap(),
            WorkflowState::Completed
        );
        assert_eq!(wf.request_id().unwrap().as_str(), "req-1");
        assert_eq!(wf.package_ids().len(), 2);
        let path: Vec<_> = wf.transitions().iter().map(|t| t.to).collect();
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

    #[test]
    fn repeated_in_progress_is_not_a_new_transition() {
        let mut wf = submitted();
        for _ in 0..3 {
            wf.observe_verification(VerificationStatus::InProgress, vec![], "2")
                .unwrap();
        }
        assert_eq!(wf.transitions().len(), 3);
    }

    #[test]
    fn accepted_waits_for_packages() {
        let mut wf = submitted();
        assert_eq!(
            wf.observe_verification(VerificationStatus::Accepted, vec![], "1")
                .unwrap(),
            WorkflowState::Verifying
        );
        assert_eq!(
            wf.observe_verification(VerificationStatus::Accepted, packages(&["pkg-1"]), "1")
                .unwrap(),
            WorkflowState::Completed
        );
    }

    #[test]
    fn completed_without_packages_is_valid() {
        let mut wf = submitted();
        assert_eq!(
            wf.observe_verification(VerificationStatus::Completed, vec![], "3")
                .unwrap(),
            WorkflowState::Completed
        );
        assert!(wf.package_ids().is_empty());
    }

    #[test]
    fn terminal_verification_states() {
        for (status, state) in [
            (VerificationStatus::Rejected, WorkflowState::Rejected),
            (VerificationStatus::Expired, WorkflowState::Expired),
            (VerificationStatus::Failed, WorkflowState::Failed),
        ] {
            let mut wf = submitted();
            assert_eq!(wf.observe_verification(status, vec![], "x").unwrap(), state);
            assert!(wf.state().is_terminal());
            assert!(matches!(
                wf.observe_verification(VerificationStatus::InProgress, vec![], "x"),
                Err(StateError::TerminalState { .. })
            ));
        }
    }

    #[test]
    fn cannot_submit_before_authenticating() {
        let mut wf = Workflow::new();
        let err = wf.submitted(RequestId::new("req-1").unwrap()).unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                from: WorkflowState::Unauthenticated,
                to: WorkflowState::Submitted,
            }
        );
    }

    #[test]
    fn cannot_verify_before_submitting() {
        let mut wf = Workflow::new();
        wf.authenticated().unwrap();
        assert!(matches!(
            wf.observe_verification(VerificationStatus::InProgress, vec![], "2"),
            Err(StateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn submission_rejection_is_terminal() {
        let mut wf = Workflow::new();
        wf.authenticated().unwrap();
        wf.rejected("5005 Solicitud duplicada").unwrap();
        assert_eq!(wf.state(), WorkflowState::Rejected);
        assert!(wf.failed("late").is_err());
        assert_eq!(wf.transitions().last().unwrap().reason, "5005 Solicitud duplicada");
    }

    #[test]
    fn authentication_failure_is_terminal() {
        let mut wf = Workflow::new();
        wf.failed("fault").unwrap();
        assert_eq!(wf.state(), WorkflowState::Failed);
        assert!(wf.authenticated().is_err());
    }

    #[test]
    fn workflow_serializes_with_history() {
        let wf = submitted();
        let json = serde_json::to_value(&wf).unwrap();
        assert_eq!(json["state"], "Submitted");
        assert_eq!(json["transitions"].as_array().unwrap().len(), 2);
    }
}
