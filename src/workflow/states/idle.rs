use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::context::{ExecutionContext, LogTarget};
use crate::errors::WorkflowError;
use crate::input::{SharedInput, Trigger};
use crate::workflow::strategy::{unexpected_payload, StateStrategy};
use crate::workflow::types::{
    ErrorEnvelope, IdleNotice, Transition, TransitionPayload, WorkflowState,
};

/// Resting state: polls the front-end for a start or exit request
pub struct IdleState {
    input: SharedInput,
}

impl IdleState {
    pub fn new(input: SharedInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl StateStrategy for IdleState {
    fn state(&self) -> WorkflowState {
        WorkflowState::Idle
    }

    fn enter(&mut self, ctx: &ExecutionContext, payload: TransitionPayload) -> Result<(), WorkflowError> {
        let log = &ctx.logger;
        match payload {
            TransitionPayload::Empty => {}
            TransitionPayload::Completed(summary) => {
                info!(
                    set_id = %summary.set_id,
                    protocol = %summary.protocol,
                    specimens = summary.specimen_count,
                    receipts = summary.receipts.len(),
                    "Testing cycle completed"
                );
                log.info(LogTarget::User, "Testing cycle completed successfully");
                log.info(LogTarget::User, "Ready for next testing cycle");
            }
            TransitionPayload::Notice(notice) => {
                debug!(notice = ?notice, "Idle entered with notice");
                match notice {
                    IdleNotice::Cancelled => {}
                    IdleNotice::RecoveredFromError
                    | IdleNotice::PartialDataSaved { .. }
                    | IdleNotice::TestingFailed
                    | IdleNotice::CriticalFallback => {
                        log.info(LogTarget::User, "System recovered from error");
                        log.info(LogTarget::User, "Ready to resume operations");
                    }
                }
            }
            other => {
                return Err(unexpected_payload(
                    WorkflowState::Idle,
                    "empty, completed or notice",
                    &other,
                ))
            }
        }
        log.info(LogTarget::User, "System is idle and ready for testing");
        Ok(())
    }

    async fn execute(&mut self, ctx: &ExecutionContext) -> Result<Transition, WorkflowError> {
        let interval = Duration::from_millis(ctx.config.input.poll_interval_ms);
        loop {
            if ctx.shutdown.is_triggered() {
                info!("Shutdown observed while idle");
                return Ok(Transition::Stop);
            }

            let trigger = self.input.lock().await.poll_trigger();
            match trigger {
                Ok(Trigger::Start(None)) => {
                    return Ok(Transition::to(WorkflowState::CollectInput, TransitionPayload::Empty))
                }
                Ok(Trigger::Start(Some(raw))) => {
                    info!(fields = raw.len(), "Start trigger carried a submission");
                    return Ok(Transition::to(
                        WorkflowState::CollectInput,
                        TransitionPayload::Submission(raw),
                    ));
                }
                Ok(Trigger::Exit) => {
                    info!("Front-end requested exit");
                    return Ok(Transition::Stop);
                }
                Ok(Trigger::Wait) => tokio::time::sleep(interval).await,
                Err(e) => {
                    ctx.logger
                        .error(LogTarget::Dev, &format!("Polling the input interface failed: {e}"));
                    let recoverable = e.is_device();
                    return Ok(ErrorEnvelope::new(e, WorkflowState::Idle, recoverable).into_transition());
                }
            }
        }
    }

    fn exit(&mut self, _ctx: &ExecutionContext) {
        debug!("Exiting idle state");
    }

    fn can_transition_to(&self, _ctx: &ExecutionContext, target: WorkflowState) -> bool {
        matches!(target, WorkflowState::CollectInput | WorkflowState::Error)
    }
}
