use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::acquisition::{handler_for, MeasurementSource};
use crate::context::{ExecutionContext, LogTarget};
use crate::domain::{SpecimenMeasurement, TestSession};
use crate::errors::WorkflowError;
use crate::workflow::strategy::{unexpected_payload, StateStrategy};
use crate::workflow::types::{
    ErrorEnvelope, IdleNotice, Transition, TransitionPayload, WorkflowState,
};

/// Measures the set one specimen at a time
pub struct AcquireState {
    source: Arc<dyn MeasurementSource>,
    session: Option<TestSession>,
}

impl AcquireState {
    pub fn new(source: Arc<dyn MeasurementSource>) -> Self {
        Self {
            source,
            session: None,
        }
    }

    fn announce(ctx: &ExecutionContext, specimen: &SpecimenMeasurement) {
        if let Some(scale) = specimen.scale {
            ctx.logger
                .info(LogTarget::User, &format!("Scale reading: {}", scale.formatted()));
        }
        if let Some(press) = specimen.press {
            ctx.logger.info(
                LogTarget::User,
                &format!(
                    "Press reading: {} ({})",
                    press.formatted_load(),
                    press.formatted_strength()
                ),
            );
        }
    }
}

#[async_trait]
impl StateStrategy for AcquireState {
    fn state(&self) -> WorkflowState {
        WorkflowState::Acquire
    }

    fn enter(&mut self, ctx: &ExecutionContext, payload: TransitionPayload) -> Result<(), WorkflowError> {
        let session = match payload {
            TransitionPayload::Parameters(parameters) => {
                ctx.logger.info(
                    LogTarget::User,
                    &format!("Testing {} ready to begin", parameters.set_id),
                );
                ctx.logger
                    .info(LogTarget::User, "Please follow the instructions for each specimen");
                TestSession::new(parameters)
            }
            TransitionPayload::Session(session) => {
                ctx.logger.info(
                    LogTarget::User,
                    &format!(
                        "Resuming set {} at specimen {}/{}",
                        session.parameters.set_id,
                        session.next_index(),
                        session.parameters.set_size
                    ),
                );
                session
            }
            other => {
                return Err(unexpected_payload(
                    WorkflowState::Acquire,
                    "parameters or session",
                    &other,
                ))
            }
        };
        self.session = Some(session);
        Ok(())
    }

    async fn execute(&mut self, ctx: &ExecutionContext) -> Result<Transition, WorkflowError> {
        let mut session = self.session.take().ok_or_else(|| {
            WorkflowError::StateMachine("acquisition started without a session".to_string())
        })?;
        // sessions can arrive without passing through input validation
        if let Err(e) = session.parameters.check_protocol_limits() {
            ctx.logger
                .error(LogTarget::Dev, &format!("Protocol cannot run this set: {e}"));
            return Ok(ErrorEnvelope::new(
                WorkflowError::Protocol(e.message()),
                WorkflowState::Acquire,
                false,
            )
            .with_partial_data(session)
            .into_transition());
        }

        let handler = handler_for(session.parameters.protocol);
        let set_size = session.parameters.set_size;
        debug!(handler = handler.name(), set_size = set_size, "Acquisition started");

        while !session.is_complete() {
            if ctx.shutdown.is_triggered() {
                warn!(
                    set_id = %session.parameters.set_id,
                    measured = session.specimens().len(),
                    "Acquisition cancelled"
                );
                ctx.logger.info(LogTarget::User, "Returning to idle state");
                return Ok(Transition::to(
                    WorkflowState::Idle,
                    TransitionPayload::Notice(IdleNotice::Cancelled),
                ));
            }

            let index = session.next_index();
            ctx.logger.info(
                LogTarget::User,
                &format!("Processing specimen {index}/{set_size}"),
            );

            match handler.measure(self.source.as_ref(), index).await {
                Ok(specimen) => {
                    Self::announce(ctx, &specimen);
                    if let Err(e) = session.push_specimen(specimen) {
                        return Ok(ErrorEnvelope::new(e, WorkflowState::Acquire, false)
                            .with_partial_data(session)
                            .into_transition());
                    }
                }
                Err(e) => {
                    let recoverable = e.is_device();
                    if recoverable {
                        ctx.logger.error(
                            LogTarget::Both,
                            &format!("Device error during acquisition: {}", e.message()),
                        );
                    } else {
                        ctx.logger
                            .error(LogTarget::Dev, &format!("Acquisition failed: {e}"));
                    }
                    return Ok(ErrorEnvelope::new(e, WorkflowState::Acquire, recoverable)
                        .with_partial_data(session)
                        .into_transition());
                }
            }
        }

        info!(set_id = %session.parameters.set_id, specimens = set_size, "Acquisition completed");
        ctx.logger.info(
            LogTarget::User,
            &format!("Testing of set {} completed", session.parameters.set_id),
        );
        Ok(Transition::to(
            WorkflowState::Disseminate,
            TransitionPayload::Session(session),
        ))
    }

    fn exit(&mut self, _ctx: &ExecutionContext) {
        if let Some(session) = self.session.take() {
            debug!(
                set_id = %session.parameters.set_id,
                measured = session.specimens().len(),
                "Discarding unfinished session"
            );
        }
    }

    fn can_transition_to(&self, _ctx: &ExecutionContext, target: WorkflowState) -> bool {
        matches!(
            target,
            WorkflowState::Disseminate | WorkflowState::Error | WorkflowState::Idle
        )
    }
}
