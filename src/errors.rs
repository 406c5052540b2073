// Error taxonomy for the testing workflow
//
// Every failure that crosses a state boundary is a `WorkflowError`. The kind
// decides how the Error state recovers from it.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::WorkflowState;

/// Classes of failure, independent of the concrete cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Setup or configuration is invalid. Fatal, no automatic recovery.
    Configuration,
    /// Front-end or measurement device unavailable. Recoverable by reconnecting.
    Device,
    /// User-supplied data rejected. Recoverable by prompting again.
    Validation,
    /// Unknown or misconfigured testing protocol. Fatal for the session.
    Protocol,
    /// Strategy registry could not resolve a strategy. Fatal.
    Plugin,
    /// Receipt generation failed. Recoverable, session preserved.
    Output,
    /// Transition or contract violation.
    StateMachine,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Device => "DeviceError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Protocol => "ProtocolError",
            ErrorKind::Plugin => "PluginError",
            ErrorKind::Output => "OutputError",
            ErrorKind::StateMachine => "StateMachineError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("{0}")]
    Validation(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("plugin error: {0}")]
    Plugin(String),
    #[error("output error: {0}")]
    Output(String),
    #[error("state machine error: {0}")]
    StateMachine(String),
    #[error("{state} cannot be entered with a {received} payload (expected {expected})")]
    InvalidEntryPayload {
        state: WorkflowState,
        expected: &'static str,
        received: &'static str,
    },
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Configuration(_) => ErrorKind::Configuration,
            WorkflowError::Device(_) => ErrorKind::Device,
            WorkflowError::Validation(_) => ErrorKind::Validation,
            WorkflowError::Protocol(_) => ErrorKind::Protocol,
            WorkflowError::Plugin(_) => ErrorKind::Plugin,
            WorkflowError::Output(_) => ErrorKind::Output,
            WorkflowError::StateMachine(_) | WorkflowError::InvalidEntryPayload { .. } => {
                ErrorKind::StateMachine
            }
        }
    }

    /// The bare message without the kind prefix, as shown to operators
    pub fn message(&self) -> String {
        match self {
            WorkflowError::Configuration(msg)
            | WorkflowError::Device(msg)
            | WorkflowError::Validation(msg)
            | WorkflowError::Protocol(msg)
            | WorkflowError::Plugin(msg)
            | WorkflowError::Output(msg)
            | WorkflowError::StateMachine(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_device(&self) -> bool {
        self.kind() == ErrorKind::Device
    }
}
