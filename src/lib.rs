// Malg Acta Library - Concrete Specimen Testing Workflow
// This exposes the core components for testing and integration

pub mod acquisition;
pub mod app;
pub mod cli;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod input;
pub mod output;
pub mod plugins;
pub mod shutdown;
pub mod storage;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use app::{run_workflow, RunReport};
pub use config::{AppConfig, InputMethod};
pub use context::{ExecutionContext, LogLevel, LogTarget, Logger, UserSink};
pub use domain::{Protocol, SessionParameters, TestSession};
pub use errors::{ErrorKind, WorkflowError};
pub use plugins::{BuiltinModules, StrategyRegistry};
pub use shutdown::ShutdownSignal;
pub use telemetry::{create_cycle_span, generate_correlation_id, init_telemetry};
pub use workflow::{Orchestrator, Transition, TransitionPayload, WorkflowState};
