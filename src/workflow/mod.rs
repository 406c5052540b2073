// Testing workflow: state contract, the five states and the orchestrator

pub mod orchestrator;
pub mod states;
pub mod strategy;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod mocks;

#[cfg(test)]
mod tests;

pub use orchestrator::{is_legal, legal_targets, Orchestrator, StateSet};
pub use strategy::StateStrategy;
pub use types::{
    CompletionSummary, ErrorEnvelope, IdleNotice, Transition, TransitionPayload, TransitionRecord,
    WorkflowState,
};
