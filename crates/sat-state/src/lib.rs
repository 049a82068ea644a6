//! # sat-state — Protocol State Machine
//!
//! - **Status taxonomy** (`status.rs`): the [`StatusTable`] classifying
//!   `CodEstatus` values as accepted or rejected, with SAT's defaults and
//!   descriptions, and the `EstadoSolicitud` to [`VerificationStatus`]
//!   mapping.
//!
//! - **Workflow** (`workflow.rs`): the runtime-checked state machine
//!   `Unauthenticated → Authenticated → Submitted → Verifying →
//!   Completed | Rejected | Expired | Failed`, with an ordered record of
//!   every transition.
//!
//! ## Design
//!
//! The status table is data injected by the caller, never re-derived at a
//! call site. The workflow owns no I/O: the client feeds it interpreted
//! responses and it answers with the next state or a `StateError`.

pub mod status;
pub mod workflow;

pub use status::{CodeClass, StatusTable, VerificationStatus};
pub use workflow::{StateError, TransitionRecord, Workflow, WorkflowState};
