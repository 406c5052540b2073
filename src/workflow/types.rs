// Core types for the testing workflow state machine

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Protocol, RawSubmission, SessionParameters, TestSession};
use crate::errors::WorkflowError;

/// The five workflow states. Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Idle,
    CollectInput,
    Acquire,
    Disseminate,
    Error,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 5] = [
        WorkflowState::Idle,
        WorkflowState::CollectInput,
        WorkflowState::Acquire,
        WorkflowState::Disseminate,
        WorkflowState::Error,
    ];
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Idle => "Idle",
            WorkflowState::CollectInput => "CollectInput",
            WorkflowState::Acquire => "Acquire",
            WorkflowState::Disseminate => "Disseminate",
            WorkflowState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// What a state's `execute` hands back to the orchestrator
#[derive(Debug)]
pub enum Transition {
    Goto {
        target: WorkflowState,
        payload: TransitionPayload,
    },
    /// Terminal sentinel: leave the loop
    Stop,
}

impl Transition {
    pub fn to(target: WorkflowState, payload: TransitionPayload) -> Self {
        Transition::Goto { target, payload }
    }

    pub fn target(&self) -> Option<WorkflowState> {
        match self {
            Transition::Goto { target, .. } => Some(*target),
            Transition::Stop => None,
        }
    }
}

/// Data moved across a transition. The orchestrator never inspects it.
#[derive(Debug)]
pub enum TransitionPayload {
    Empty,
    /// Raw data already pushed by an asynchronous front-end
    Submission(RawSubmission),
    /// Validation failure to show again before re-prompting
    RetryInput { error: String },
    Parameters(SessionParameters),
    Session(TestSession),
    Failure(Box<ErrorEnvelope>),
    Completed(CompletionSummary),
    Notice(IdleNotice),
}

impl TransitionPayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TransitionPayload::Empty => "empty",
            TransitionPayload::Submission(_) => "submission",
            TransitionPayload::RetryInput { .. } => "retry-input",
            TransitionPayload::Parameters(_) => "parameters",
            TransitionPayload::Session(_) => "session",
            TransitionPayload::Failure(_) => "failure",
            TransitionPayload::Completed(_) => "completed",
            TransitionPayload::Notice(_) => "notice",
        }
    }

    pub fn failure(envelope: ErrorEnvelope) -> Self {
        TransitionPayload::Failure(Box::new(envelope))
    }

    /// Session carried along, directly or as partial data of a failure
    pub fn session(&self) -> Option<&TestSession> {
        match self {
            TransitionPayload::Session(session) => Some(session),
            TransitionPayload::Failure(envelope) => envelope.partial_data.as_ref(),
            _ => None,
        }
    }
}

/// Structured payload carried into the Error state
#[derive(Debug, Clone)]
pub struct ErrorEnvelope {
    pub error: WorkflowError,
    pub source_state: WorkflowState,
    pub recoverable: bool,
    pub partial_data: Option<TestSession>,
}

impl ErrorEnvelope {
    pub fn new(error: WorkflowError, source_state: WorkflowState, recoverable: bool) -> Self {
        Self {
            error,
            source_state,
            recoverable,
            partial_data: None,
        }
    }

    pub fn with_partial_data(mut self, session: TestSession) -> Self {
        self.partial_data = Some(session);
        self
    }

    /// Transition into Error carrying this envelope
    pub fn into_transition(self) -> Transition {
        Transition::to(WorkflowState::Error, TransitionPayload::failure(self))
    }
}

/// Why the workflow came back to Idle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleNotice {
    Cancelled,
    RecoveredFromError,
    PartialDataSaved { specimens: usize },
    TestingFailed,
    CriticalFallback,
}

/// Result of a finished session, reported by Idle on entry
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSummary {
    pub set_id: String,
    pub protocol: Protocol,
    pub specimen_count: usize,
    pub receipts: Vec<std::path::PathBuf>,
}

/// One executed transition, kept in the orchestrator history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub payload: &'static str,
    pub forced: bool,
}
