// Process wiring: front-ends, states and the orchestrator for one run

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::acquisition::SimulatedInstruments;
use crate::context::{ExecutionContext, LogTarget};
use crate::input::InputInterface;
use crate::output::OutputInterface;
use crate::plugins::{ModuleLoader, StrategyRegistry};
use crate::storage::LabStorage;
use crate::workflow::states::{
    AcquireState, CollectInputState, DisseminateState, ErrorState, IdleState, SimulatedReconnector,
};
use crate::workflow::{Orchestrator, StateSet, TransitionRecord, WorkflowState};

/// Output strategy used for receipts
pub const RECEIPT_STRATEGY: &str = "receipt_generator";

/// What a finished run looked like
#[derive(Debug, Clone)]
pub struct RunReport {
    pub final_state: WorkflowState,
    pub transitions: Vec<TransitionRecord>,
}

impl RunReport {
    /// Sessions that reached Idle through Disseminate
    pub fn completed_sessions(&self) -> usize {
        self.transitions
            .iter()
            .filter(|r| r.from == WorkflowState::Disseminate && r.to == WorkflowState::Idle)
            .count()
    }
}

/// Resolve the configured strategies, wire the five states and drive the
/// workflow until the front-end asks to exit or shutdown is requested.
pub async fn run_workflow(ctx: &ExecutionContext, loader: Box<dyn ModuleLoader>) -> Result<RunReport> {
    let config = ctx.config.clone();
    let mut registry = StrategyRegistry::new(&config.plugins, loader);

    let method = config.input.method.strategy_name();
    let input = InputInterface::connect(ctx, &mut registry, method)
        .with_context(|| format!("failed to start the '{method}' input front-end"))?
        .shared();
    let output = OutputInterface::connect(ctx, &mut registry, RECEIPT_STRATEGY)
        .context("failed to start the receipt generator")?
        .shared();

    let storage = LabStorage::from_config(&config.data_paths);
    for catalog in [&storage.clients, &storage.concrete_classes] {
        match catalog.load().await {
            Ok(entries) => info!(path = %catalog.path().display(), entries = entries.len(), "Catalog loaded"),
            Err(e) => warn!(error = %e, "Catalog unavailable, continuing without it"),
        }
    }

    let instruments = Arc::new(SimulatedInstruments::new(&config.acquisition));
    let reconnector = Arc::new(SimulatedReconnector::new(Duration::from_millis(
        config.acquisition.reconnect_delay_ms,
    )));

    let states = StateSet {
        idle: Box::new(IdleState::new(input.clone())),
        collect_input: Box::new(CollectInputState::new(input.clone())),
        acquire: Box::new(AcquireState::new(instruments)),
        disseminate: Box::new(DisseminateState::new(input.clone(), output.clone(), storage)),
        error: Box::new(ErrorState::new(reconnector)),
    };
    let mut orchestrator = Orchestrator::new(states)?;

    ctx.logger.info(LogTarget::User, "Malg Acta ready");
    let outcome = orchestrator.start(ctx).await;

    input.lock().await.close();
    output.lock().await.cleanup();
    registry.cleanup();

    outcome.context("workflow aborted")?;
    let report = RunReport {
        final_state: orchestrator.current_state(),
        transitions: orchestrator.history().to_vec(),
    };
    info!(
        final_state = %report.final_state,
        transitions = report.transitions.len(),
        completed = report.completed_sessions(),
        "Run finished"
    );
    Ok(report)
}
