use async_trait::async_trait;
use tracing::{debug, info};

use crate::context::{ExecutionContext, LogTarget};
use crate::domain::{RawSubmission, SessionParameters};
use crate::errors::WorkflowError;
use crate::input::{RawInput, SharedInput};
use crate::workflow::strategy::{unexpected_payload, StateStrategy};
use crate::workflow::types::{
    ErrorEnvelope, IdleNotice, Transition, TransitionPayload, WorkflowState,
};

/// Obtains raw parameters and validates them into `SessionParameters`
pub struct CollectInputState {
    input: SharedInput,
    pending: Option<RawSubmission>,
    collected: Option<SessionParameters>,
}

impl CollectInputState {
    pub fn new(input: SharedInput) -> Self {
        Self {
            input,
            pending: None,
            collected: None,
        }
    }

    fn fail(error: WorkflowError, recoverable: bool) -> Transition {
        ErrorEnvelope::new(error, WorkflowState::CollectInput, recoverable).into_transition()
    }
}

#[async_trait]
impl StateStrategy for CollectInputState {
    fn state(&self) -> WorkflowState {
        WorkflowState::CollectInput
    }

    fn enter(&mut self, ctx: &ExecutionContext, payload: TransitionPayload) -> Result<(), WorkflowError> {
        self.collected = None;
        self.pending = None;
        match payload {
            TransitionPayload::Empty => {}
            TransitionPayload::Submission(raw) => {
                info!(fields = raw.len(), "Received pre-submitted data");
                self.pending = Some(raw);
            }
            TransitionPayload::RetryInput { error } => {
                ctx.logger.warn(LogTarget::User, &error);
                ctx.logger
                    .info(LogTarget::User, "Retrying input collection after error");
            }
            other => {
                return Err(unexpected_payload(
                    WorkflowState::CollectInput,
                    "empty, submission or retry-input",
                    &other,
                ))
            }
        }
        ctx.logger
            .info(LogTarget::User, "Ready to collect testing parameters");
        Ok(())
    }

    async fn execute(&mut self, ctx: &ExecutionContext) -> Result<Transition, WorkflowError> {
        let raw = match self.pending.take() {
            Some(raw) => raw,
            None => {
                let collected = self.input.lock().await.collect();
                match collected {
                    Ok(RawInput::Submitted(raw)) => raw,
                    Ok(RawInput::Cancelled) => {
                        info!("User cancelled input collection");
                        ctx.logger.info(LogTarget::User, "Returning to idle state");
                        return Ok(Transition::to(
                            WorkflowState::Idle,
                            TransitionPayload::Notice(IdleNotice::Cancelled),
                        ));
                    }
                    Err(e) => {
                        ctx.logger
                            .error(LogTarget::Dev, &format!("Input interface error: {e}"));
                        let recoverable = e.is_device();
                        return Ok(Self::fail(e, recoverable));
                    }
                }
            }
        };

        if ctx.shutdown.is_triggered() {
            return Ok(Transition::to(
                WorkflowState::Idle,
                TransitionPayload::Notice(IdleNotice::Cancelled),
            ));
        }

        let normalized = self.input.lock().await.normalize(&raw);
        match normalized {
            Ok(parameters) => {
                info!(
                    protocol = %parameters.protocol,
                    set_id = %parameters.set_id,
                    set_size = parameters.set_size,
                    client = %parameters.client,
                    "Input validation completed"
                );
                ctx.logger.info(LogTarget::User, "Starting testing workflow...");
                self.collected = Some(parameters.clone());
                Ok(Transition::to(
                    WorkflowState::Acquire,
                    TransitionPayload::Parameters(parameters),
                ))
            }
            Err(WorkflowError::Validation(message)) => {
                ctx.logger
                    .error(LogTarget::Both, &format!("Input validation failed: {message}"));
                Ok(Transition::to(
                    WorkflowState::CollectInput,
                    TransitionPayload::RetryInput { error: message },
                ))
            }
            Err(e) => Ok(Self::fail(e, false)),
        }
    }

    fn exit(&mut self, _ctx: &ExecutionContext) {
        match &self.collected {
            Some(p) => debug!(
                protocol = %p.protocol,
                set_size = p.set_size,
                "Exiting input state with collected parameters"
            ),
            None => debug!("Exiting input state"),
        }
        self.pending = None;
    }

    fn can_transition_to(&self, _ctx: &ExecutionContext, target: WorkflowState) -> bool {
        matches!(
            target,
            WorkflowState::Acquire
                | WorkflowState::Error
                | WorkflowState::Idle
                | WorkflowState::CollectInput
        )
    }
}
