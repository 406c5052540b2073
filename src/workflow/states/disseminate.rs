use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::context::{ExecutionContext, LogTarget};
use crate::domain::{SessionReport, TestSession};
use crate::errors::WorkflowError;
use crate::input::SharedInput;
use crate::output::SharedOutput;
use crate::storage::{LabStorage, RegistryEntry};
use crate::workflow::strategy::{unexpected_payload, StateStrategy};
use crate::workflow::types::{
    CompletionSummary, ErrorEnvelope, Transition, TransitionPayload, WorkflowState,
};

/// Produces receipts, records the session and releases the front-end
pub struct DisseminateState {
    input: SharedInput,
    output: SharedOutput,
    storage: LabStorage,
    session: Option<TestSession>,
}

impl DisseminateState {
    pub fn new(input: SharedInput, output: SharedOutput, storage: LabStorage) -> Self {
        Self {
            input,
            output,
            storage,
            session: None,
        }
    }

    /// Registry and catalog failures are reported, never fatal
    async fn record(&self, ctx: &ExecutionContext, session: &TestSession) {
        let entry = RegistryEntry::from_session(session);
        if let Err(e) = self.storage.registry.append(&entry).await {
            ctx.logger
                .warn(LogTarget::Dev, &format!("Failed to update testing registry: {e}"));
        }

        let p = &session.parameters;
        match self.storage.clients.add(&p.client).await {
            Ok(true) => info!(client = %p.client, "New client recorded"),
            Ok(false) => {}
            Err(e) => ctx
                .logger
                .warn(LogTarget::Dev, &format!("Failed to update client catalog: {e}")),
        }
        match self.storage.concrete_classes.add(&p.concrete_class).await {
            Ok(true) => info!(concrete_class = %p.concrete_class, "New concrete class recorded"),
            Ok(false) => {}
            Err(e) => ctx
                .logger
                .warn(LogTarget::Dev, &format!("Failed to update concrete class catalog: {e}")),
        }
    }
}

#[async_trait]
impl StateStrategy for DisseminateState {
    fn state(&self) -> WorkflowState {
        WorkflowState::Disseminate
    }

    fn enter(&mut self, ctx: &ExecutionContext, payload: TransitionPayload) -> Result<(), WorkflowError> {
        let session = match payload {
            TransitionPayload::Session(session) => session,
            other => return Err(unexpected_payload(WorkflowState::Disseminate, "session", &other)),
        };
        if !session.is_complete() {
            return Err(WorkflowError::InvalidEntryPayload {
                state: WorkflowState::Disseminate,
                expected: "complete session",
                received: "incomplete session",
            });
        }

        ctx.logger.info(
            LogTarget::User,
            &format!("Processing results for set {}", session.parameters.set_id),
        );
        self.session = Some(session);
        Ok(())
    }

    async fn execute(&mut self, ctx: &ExecutionContext) -> Result<Transition, WorkflowError> {
        let session = self.session.take().ok_or_else(|| {
            WorkflowError::StateMachine("dissemination started without a session".to_string())
        })?;
        let set_id = session.parameters.set_id.clone();

        let report = SessionReport::compute(&session);
        info!(
            set_id = %set_id,
            sample_age_days = report.sample_age_days,
            strength_avg = report.strength.map(|s| s.avg),
            density_avg = report.density.map(|d| d.avg),
            "Session statistics computed"
        );

        ctx.logger.info(LogTarget::User, "Generating reports...");
        let generated = self.output.lock().await.generate_receipts(&session);
        let receipts = match generated {
            Ok(receipts) => receipts,
            Err(e) => {
                ctx.logger.error(
                    LogTarget::Both,
                    &format!("Output generation failed: {}", e.message()),
                );
                let error = match e {
                    WorkflowError::Output(_) => e,
                    other => WorkflowError::Output(other.message()),
                };
                return Ok(ErrorEnvelope::new(error, WorkflowState::Disseminate, true)
                    .with_partial_data(session)
                    .into_transition());
            }
        };
        for format in &session.parameters.output_formats {
            ctx.logger
                .info(LogTarget::User, &format!("{format} report ready"));
        }

        self.record(ctx, &session).await;

        if session.parameters.should_print {
            info!(set_id = %set_id, receipts = receipts.len(), "Printing requested");
            ctx.logger.info(
                LogTarget::User,
                "Printing is not supported, receipts were saved to the reports directory",
            );
        }

        ctx.logger
            .info(LogTarget::User, "Report generation completed successfully");
        ctx.logger
            .info(LogTarget::User, &format!("Set {set_id} processing complete"));

        let unlocked = self.input.lock().await.unlock();
        if let Err(e) = unlocked {
            ctx.logger
                .error(LogTarget::Dev, &format!("Failed to release the front-end: {e}"));
            return Ok(ErrorEnvelope::new(e, WorkflowState::Disseminate, false).into_transition());
        }

        Ok(Transition::to(
            WorkflowState::Idle,
            TransitionPayload::Completed(CompletionSummary {
                set_id,
                protocol: session.parameters.protocol,
                specimen_count: session.specimens().len(),
                receipts,
            }),
        ))
    }

    fn exit(&mut self, _ctx: &ExecutionContext) {
        if let Some(session) = self.session.take() {
            warn!(set_id = %session.parameters.set_id, "Leaving dissemination with an unprocessed session");
        } else {
            debug!("Exiting dissemination state");
        }
    }

    fn can_transition_to(&self, _ctx: &ExecutionContext, target: WorkflowState) -> bool {
        matches!(target, WorkflowState::Idle | WorkflowState::Error)
    }
}
