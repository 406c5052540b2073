// Workflow orchestrator: drives execute/transition and enforces legal edges

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn, Instrument};

use super::strategy::StateStrategy;
use super::types::{
    ErrorEnvelope, IdleNotice, Transition, TransitionPayload, TransitionRecord, WorkflowState,
};
use crate::context::{ExecutionContext, LogTarget};
use crate::errors::WorkflowError;
use crate::telemetry::{create_cycle_span, generate_correlation_id};

/// Static adjacency table. `Error` is additionally legal from every state.
pub fn legal_targets(from: WorkflowState) -> &'static [WorkflowState] {
    use WorkflowState::*;
    match from {
        Idle => &[CollectInput, Error],
        CollectInput => &[Acquire, Error, Idle, CollectInput],
        Acquire => &[Disseminate, Error, Idle],
        Disseminate => &[Idle, Error],
        Error => &[Idle, CollectInput, Acquire],
    }
}

pub fn is_legal(from: WorkflowState, to: WorkflowState) -> bool {
    to == WorkflowState::Error || legal_targets(from).contains(&to)
}

/// The five wired states, assembled before the orchestrator starts
pub struct StateSet {
    pub idle: Box<dyn StateStrategy>,
    pub collect_input: Box<dyn StateStrategy>,
    pub acquire: Box<dyn StateStrategy>,
    pub disseminate: Box<dyn StateStrategy>,
    pub error: Box<dyn StateStrategy>,
}

pub struct Orchestrator {
    states: HashMap<WorkflowState, Box<dyn StateStrategy>>,
    current: WorkflowState,
    stop: Arc<AtomicBool>,
    history: Vec<TransitionRecord>,
}

impl Orchestrator {
    pub fn new(set: StateSet) -> Result<Self, WorkflowError> {
        let slots = [
            (WorkflowState::Idle, set.idle),
            (WorkflowState::CollectInput, set.collect_input),
            (WorkflowState::Acquire, set.acquire),
            (WorkflowState::Disseminate, set.disseminate),
            (WorkflowState::Error, set.error),
        ];

        let mut states = HashMap::with_capacity(slots.len());
        for (slot, strategy) in slots {
            if strategy.state() != slot {
                return Err(WorkflowError::Configuration(format!(
                    "state wired as {} reports itself as {}",
                    slot,
                    strategy.state()
                )));
            }
            states.insert(slot, strategy);
        }

        Ok(Self {
            states,
            current: WorkflowState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
            history: Vec::new(),
        })
    }

    pub fn current_state(&self) -> WorkflowState {
        self.current
    }

    /// Targets the static table allows from the current state
    pub fn valid_transitions(&self) -> Vec<WorkflowState> {
        let mut targets = legal_targets(self.current).to_vec();
        if !targets.contains(&WorkflowState::Error) {
            targets.push(WorkflowState::Error);
        }
        targets
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Request a graceful stop, observed at the top of the loop
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn strategy(&mut self, state: WorkflowState) -> Result<&mut Box<dyn StateStrategy>, WorkflowError> {
        self.states
            .get_mut(&state)
            .ok_or_else(|| WorkflowError::StateMachine(format!("state {state} is not wired")))
    }

    /// Enter Idle and run until a state returns the terminal sentinel or a
    /// stop is requested. The current state is always exited on the way out.
    pub async fn start(&mut self, ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        self.current = WorkflowState::Idle;
        self.strategy(WorkflowState::Idle)?
            .enter(ctx, TransitionPayload::Empty)?;
        info!(state = %self.current, "Workflow started");

        let result = self.run(ctx).await;

        let last = self.current;
        if let Ok(strategy) = self.strategy(last) {
            strategy.exit(ctx);
        }
        match &result {
            Ok(()) => info!(state = %last, transitions = self.history.len(), "Workflow stopped"),
            Err(e) => error!(state = %last, error = %e, "Workflow aborted"),
        }
        result
    }

    async fn run(&mut self, ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        loop {
            if self.stop.load(Ordering::SeqCst) || ctx.shutdown.is_triggered() {
                info!(state = %self.current, "Stop requested");
                return Ok(());
            }

            let state = self.current;
            let span = create_cycle_span(state, &generate_correlation_id());
            let outcome = self.strategy(state)?.execute(ctx).instrument(span).await;

            match outcome {
                Ok(Transition::Stop) => {
                    info!(state = %state, "Terminal transition reached");
                    return Ok(());
                }
                Ok(Transition::Goto { target, payload }) => {
                    self.transition_to(ctx, target, payload)?;
                }
                Err(err) => {
                    warn!(state = %state, error = %err, "State escaped its execute contract");
                    self.escalate(ctx, err)?;
                }
            }
        }
    }

    /// Table check, veto, exit, enter. A rejected edge is escalated from the
    /// still-active source state.
    fn transition_to(
        &mut self,
        ctx: &ExecutionContext,
        target: WorkflowState,
        payload: TransitionPayload,
    ) -> Result<(), WorkflowError> {
        let from = self.current;
        if !is_legal(from, target) {
            return self.escalate(
                ctx,
                WorkflowError::StateMachine(format!("illegal transition {from} -> {target}")),
            );
        }
        if !self.strategy(from)?.can_transition_to(ctx, target) {
            return self.escalate(
                ctx,
                WorkflowError::StateMachine(format!("{from} refused transition to {target}")),
            );
        }

        self.strategy(from)?.exit(ctx);
        self.enter_target(ctx, from, target, payload, false)
    }

    /// Move straight to `target`, bypassing the table and the veto.
    /// A target that cannot be entered is routed to Error like any failure.
    pub fn force_transition(
        &mut self,
        ctx: &ExecutionContext,
        target: WorkflowState,
        payload: TransitionPayload,
    ) -> Result<(), WorkflowError> {
        let from = self.current;
        self.strategy(from)?.exit(ctx);
        self.enter_target(ctx, from, target, payload, true)
    }

    /// Enter `target` once `from` has been exited. `current` only moves when
    /// the entry succeeds.
    fn enter_target(
        &mut self,
        ctx: &ExecutionContext,
        from: WorkflowState,
        target: WorkflowState,
        payload: TransitionPayload,
        forced: bool,
    ) -> Result<(), WorkflowError> {
        let kind = payload.kind_name();
        let partial = payload.session().cloned();
        match self.strategy(target)?.enter(ctx, payload) {
            Ok(()) => {
                self.record(from, target, kind, forced);
                Ok(())
            }
            Err(err) => {
                error!(from = %from, to = %target, error = %err, "State could not be entered");
                if target == WorkflowState::Error {
                    return self.fall_back_to_idle(ctx, from);
                }
                let mut envelope = ErrorEnvelope::new(err, from, false);
                envelope.partial_data = partial;
                self.enter_target(
                    ctx,
                    from,
                    WorkflowState::Error,
                    TransitionPayload::failure(envelope),
                    true,
                )
            }
        }
    }

    /// Last resort once Error is unusable. Only an Idle that cannot be
    /// entered is fatal.
    fn fall_back_to_idle(&mut self, ctx: &ExecutionContext, from: WorkflowState) -> Result<(), WorkflowError> {
        ctx.logger
            .critical(LogTarget::Both, "Returning to idle state for safety");
        let payload = TransitionPayload::Notice(IdleNotice::CriticalFallback);
        let kind = payload.kind_name();
        self.strategy(WorkflowState::Idle)?.enter(ctx, payload)?;
        self.record(from, WorkflowState::Idle, kind, true);
        Ok(())
    }

    fn record(&mut self, from: WorkflowState, to: WorkflowState, payload: &'static str, forced: bool) {
        self.current = to;
        self.history.push(TransitionRecord {
            from,
            to,
            payload,
            forced,
        });
        if forced {
            warn!(from = %from, to = %to, payload = payload, "Forced transition");
        } else {
            info!(from = %from, to = %to, payload = payload, "Transition");
        }
    }

    /// Route a contract violation to Error, or to Idle when Error itself failed
    fn escalate(&mut self, ctx: &ExecutionContext, err: WorkflowError) -> Result<(), WorkflowError> {
        let source = self.current;
        error!(state = %source, kind = %err.kind(), error = %err, "Escalating failure");

        self.strategy(source)?.exit(ctx);
        if source == WorkflowState::Error {
            return self.fall_back_to_idle(ctx, source);
        }
        let envelope = ErrorEnvelope::new(err, source, false);
        self.enter_target(
            ctx,
            source,
            WorkflowState::Error,
            TransitionPayload::failure(envelope),
            true,
        )
    }
}
