// Error state: tiered recovery
//
// Automatic recovery first (keyed by error kind, bounded per failure point),
// then manual recovery by source state. A failure point that keeps failing
// after manual recovery, or a failure inside recovery itself, lands in Idle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::context::{ExecutionContext, LogTarget};
use crate::errors::{ErrorKind, WorkflowError};
use crate::workflow::strategy::{unexpected_payload, StateStrategy};
use crate::workflow::types::{
    ErrorEnvelope, IdleNotice, Transition, TransitionPayload, WorkflowState,
};

/// Automatic recoveries allowed for the same failure point before falling back to manual
pub const MAX_AUTOMATIC_RECOVERIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Scale,
    Press,
    Equipment,
}

impl DeviceType {
    /// Which device a failure message talks about
    pub fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("scale") || message.contains("cântar") || message.contains("cantar") {
            DeviceType::Scale
        } else if message.contains("press") || message.contains("presa") || message.contains("presă") {
            DeviceType::Press
        } else {
            DeviceType::Equipment
        }
    }

    fn unavailable_message(&self, detail: &str) -> String {
        match self {
            DeviceType::Scale => "Atenție: Cântarul nu este conectat sau nu răspunde!".to_string(),
            DeviceType::Press => "Atenție: Presa nu este conectată sau nu răspunde!".to_string(),
            DeviceType::Equipment => format!("Problemă cu echipamentul: {detail}"),
        }
    }

    fn reconnected_message(&self) -> &'static str {
        match self {
            DeviceType::Scale => "Cântarul a fost reconectat",
            DeviceType::Press => "Presa a fost reconectată",
            DeviceType::Equipment => "Echipamentul a fost reconectat",
        }
    }

    fn check_connection_message(&self) -> &'static str {
        match self {
            DeviceType::Scale => "Verificați conexiunea cântarului și încercați din nou",
            DeviceType::Press => "Verificați conexiunea presei și încercați din nou",
            DeviceType::Equipment => "Verificați conexiunea echipamentului și încercați din nou",
        }
    }
}

/// Re-establishes a device connection. `Ok(false)` means the device is still gone.
#[async_trait]
pub trait Reconnector: Send + Sync {
    async fn reconnect(&self, device: DeviceType) -> Result<bool, WorkflowError>;
}

/// Waits for the configured delay and reports success
#[derive(Debug, Clone)]
pub struct SimulatedReconnector {
    delay: Duration,
}

impl SimulatedReconnector {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Reconnector for SimulatedReconnector {
    async fn reconnect(&self, device: DeviceType) -> Result<bool, WorkflowError> {
        debug!(device = ?device, delay_ms = self.delay.as_millis() as u64, "Simulating reconnection");
        tokio::time::sleep(self.delay).await;
        Ok(true)
    }
}

/// User-facing message for an envelope
pub fn user_message(envelope: &ErrorEnvelope) -> String {
    let message = envelope.error.message();
    match envelope.error.kind() {
        ErrorKind::Validation => format!("Date introduse invalide: {message}"),
        ErrorKind::Device => DeviceType::from_message(&message).unavailable_message(&message),
        ErrorKind::Configuration => format!("Problemă de configurare: {message}"),
        ErrorKind::Protocol => format!("Problemă cu protocolul de testare: {message}"),
        _ => format!("Eroare în {}: {message}", envelope.source_state),
    }
}

pub struct ErrorState {
    reconnector: Arc<dyn Reconnector>,
    envelope: Option<ErrorEnvelope>,
    automatic_recoveries: u32,
    /// Manual recovery already handed control back for this failure point
    manual_recovered: bool,
    /// Source state and specimens measured at the last failure
    last_failure_point: Option<(WorkflowState, usize)>,
}

impl ErrorState {
    pub fn new(reconnector: Arc<dyn Reconnector>) -> Self {
        Self {
            reconnector,
            envelope: None,
            automatic_recoveries: 0,
            manual_recovered: false,
            last_failure_point: None,
        }
    }

    fn reset_budget(&mut self) {
        self.automatic_recoveries = 0;
        self.manual_recovered = false;
        self.last_failure_point = None;
    }

    fn critical_fallback(&mut self, ctx: &ExecutionContext) -> Transition {
        ctx.logger
            .critical(LogTarget::User, "Returning to idle state for safety");
        self.reset_budget();
        Transition::to(
            WorkflowState::Idle,
            TransitionPayload::Notice(IdleNotice::CriticalFallback),
        )
    }

    /// `Ok(None)` when no automatic remedy applies or it did not work
    async fn automatic_recovery(
        &mut self,
        ctx: &ExecutionContext,
        envelope: &mut ErrorEnvelope,
    ) -> Result<Option<Transition>, WorkflowError> {
        let log = &ctx.logger;
        match envelope.error.kind() {
            ErrorKind::Device => {
                let device = DeviceType::from_message(&envelope.error.message());
                log.info(LogTarget::User, "Attempting device recovery...");
                if !self.reconnector.reconnect(device).await? {
                    log.info(LogTarget::User, device.check_connection_message());
                    return Ok(None);
                }
                log.info(LogTarget::User, device.reconnected_message());

                let resume = match envelope.source_state {
                    WorkflowState::Idle => Some(Transition::to(
                        WorkflowState::Idle,
                        TransitionPayload::Notice(IdleNotice::RecoveredFromError),
                    )),
                    WorkflowState::CollectInput => Some(Transition::to(
                        WorkflowState::CollectInput,
                        TransitionPayload::Empty,
                    )),
                    WorkflowState::Acquire => envelope
                        .partial_data
                        .take()
                        .map(|session| Transition::to(WorkflowState::Acquire, TransitionPayload::Session(session))),
                    _ => None,
                };
                if resume.is_none() {
                    warn!(source = %envelope.source_state, "Device recovered but the source state cannot be resumed");
                }
                Ok(resume)
            }
            ErrorKind::Validation if envelope.source_state == WorkflowState::CollectInput => {
                log.info(LogTarget::User, "Vă rugăm să corectați datele introduse");
                Ok(Some(Transition::to(
                    WorkflowState::CollectInput,
                    TransitionPayload::RetryInput {
                        error: envelope.error.message(),
                    },
                )))
            }
            ErrorKind::Configuration => {
                log.error(
                    LogTarget::User,
                    "Eroare de configurare - contactați administratorul",
                );
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn manual_recovery(&mut self, ctx: &ExecutionContext, envelope: ErrorEnvelope) -> Transition {
        let log = &ctx.logger;
        log.error(LogTarget::User, "Intervenție manuală necesară");

        match envelope.source_state {
            WorkflowState::CollectInput => {
                log.info(LogTarget::User, "Revenind la introducerea datelor...");
                Transition::to(WorkflowState::CollectInput, TransitionPayload::Empty)
            }
            WorkflowState::Acquire => {
                let measured = envelope
                    .partial_data
                    .as_ref()
                    .map(|session| session.specimens().len())
                    .unwrap_or(0);
                if measured > 0 {
                    info!(specimens = measured, "Partial acquisition data kept in the log");
                    log.info(
                        LogTarget::User,
                        "Date parțiale salvate - revenind la starea inițială",
                    );
                    Transition::to(
                        WorkflowState::Idle,
                        TransitionPayload::Notice(IdleNotice::PartialDataSaved { specimens: measured }),
                    )
                } else {
                    log.info(LogTarget::User, "Revenind la starea inițială");
                    Transition::to(
                        WorkflowState::Idle,
                        TransitionPayload::Notice(IdleNotice::TestingFailed),
                    )
                }
            }
            _ => {
                log.info(LogTarget::User, "Revenind la starea inițială");
                Transition::to(
                    WorkflowState::Idle,
                    TransitionPayload::Notice(IdleNotice::RecoveredFromError),
                )
            }
        }
    }

    async fn recover(
        &mut self,
        ctx: &ExecutionContext,
        mut envelope: ErrorEnvelope,
    ) -> Result<Transition, WorkflowError> {
        let failure_point = (
            envelope.source_state,
            envelope
                .partial_data
                .as_ref()
                .map_or(0, |session| session.specimens().len()),
        );
        // operator corrections are not a loop; each one needs fresh input
        let bounded = envelope.error.kind() != ErrorKind::Validation;
        if bounded {
            // progress since the last failure restarts the budget
            if self.last_failure_point != Some(failure_point) {
                self.automatic_recoveries = 0;
                self.manual_recovered = false;
            }
            self.last_failure_point = Some(failure_point);

            if self.manual_recovered {
                warn!(
                    source = %envelope.source_state,
                    attempts = self.automatic_recoveries,
                    "Failure point still failing after manual recovery"
                );
                return Ok(self.critical_fallback(ctx));
            }
        }

        if envelope.recoverable {
            if !bounded || self.automatic_recoveries < MAX_AUTOMATIC_RECOVERIES {
                if bounded {
                    self.automatic_recoveries += 1;
                }
                if let Some(transition) = self.automatic_recovery(ctx, &mut envelope).await? {
                    info!(
                        source = %envelope.source_state,
                        target = ?transition.target(),
                        "Automatic recovery succeeded"
                    );
                    return Ok(transition);
                }
                ctx.logger.error(LogTarget::User, "Automatic recovery failed");
            } else {
                warn!(
                    attempts = self.automatic_recoveries,
                    "Automatic recovery limit reached"
                );
            }
        }

        let transition = self.manual_recovery(ctx, envelope);
        if transition.target() == Some(WorkflowState::Idle) {
            // the cycle is over, the next failure starts a fresh budget
            self.reset_budget();
        } else if bounded {
            self.manual_recovered = true;
        }
        Ok(transition)
    }
}

#[async_trait]
impl StateStrategy for ErrorState {
    fn state(&self) -> WorkflowState {
        WorkflowState::Error
    }

    fn enter(&mut self, ctx: &ExecutionContext, payload: TransitionPayload) -> Result<(), WorkflowError> {
        let envelope = match payload {
            TransitionPayload::Failure(envelope) => *envelope,
            other => return Err(unexpected_payload(WorkflowState::Error, "failure", &other)),
        };

        ctx.logger.error(
            LogTarget::Dev,
            &format!(
                "{} in {}: {}",
                envelope.error.kind(),
                envelope.source_state,
                envelope.error.message()
            ),
        );
        ctx.logger.error(LogTarget::User, &user_message(&envelope));
        if envelope.recoverable {
            ctx.logger
                .info(LogTarget::User, "Attempting automatic recovery...");
        } else {
            ctx.logger
                .info(LogTarget::User, "Manual intervention may be required");
        }

        self.envelope = Some(envelope);
        Ok(())
    }

    async fn execute(&mut self, ctx: &ExecutionContext) -> Result<Transition, WorkflowError> {
        let outcome = match self.envelope.take() {
            Some(envelope) => self.recover(ctx, envelope).await,
            None => Err(WorkflowError::StateMachine(
                "error state executed without an envelope".to_string(),
            )),
        };

        match outcome {
            Ok(transition) => Ok(transition),
            Err(e) => {
                ctx.logger
                    .critical(LogTarget::Dev, &format!("Error recovery failed: {e}"));
                Ok(self.critical_fallback(ctx))
            }
        }
    }

    fn exit(&mut self, _ctx: &ExecutionContext) {
        self.envelope = None;
        debug!("Exiting error state");
    }

    fn can_transition_to(&self, _ctx: &ExecutionContext, target: WorkflowState) -> bool {
        matches!(
            target,
            WorkflowState::Idle | WorkflowState::CollectInput | WorkflowState::Acquire
        )
    }
}
