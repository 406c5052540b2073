use async_trait::async_trait;

use super::types::{Transition, TransitionPayload, WorkflowState};
use crate::context::ExecutionContext;
use crate::errors::WorkflowError;

/// Capability contract every workflow state satisfies.
///
/// `execute` converts its own failures into transitions to `Error`; the
/// `Err` arm exists so the orchestrator can defend against contract
/// violations, not as a normal outcome.
#[async_trait]
pub trait StateStrategy: Send {
    fn state(&self) -> WorkflowState;

    /// Validate the incoming payload shape and prepare state-local data
    fn enter(&mut self, ctx: &ExecutionContext, payload: TransitionPayload) -> Result<(), WorkflowError>;

    async fn execute(&mut self, ctx: &ExecutionContext) -> Result<Transition, WorkflowError>;

    /// Best-effort cleanup, never fails
    fn exit(&mut self, ctx: &ExecutionContext);

    /// The state's own veto, consulted after the static table
    fn can_transition_to(&self, ctx: &ExecutionContext, target: WorkflowState) -> bool;
}

/// Reject a payload this state cannot be entered with
pub(crate) fn unexpected_payload(
    state: WorkflowState,
    expected: &'static str,
    payload: &TransitionPayload,
) -> WorkflowError {
    WorkflowError::InvalidEntryPayload {
        state,
        expected,
        received: payload.kind_name(),
    }
}
