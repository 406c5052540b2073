// Input façade and the capability every input strategy provides

pub mod queue;
pub mod terminal;

use std::sync::Arc;

use chrono::Local;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::domain::{RawSubmission, SessionParameters};
use crate::errors::WorkflowError;
use crate::plugins::StrategyRegistry;

/// What Idle learns from polling the front-end
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Begin a cycle, optionally with data the front-end already collected
    Start(Option<RawSubmission>),
    /// The operator is done; stop the workflow
    Exit,
    /// Nothing yet
    Wait,
}

/// Outcome of a blocking collection call
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Submitted(RawSubmission),
    Cancelled,
}

/// Capability set of an input front-end.
///
/// `unlock_interface` differs by kind: request/response front-ends reset and
/// wait, interactive ones ask the operator whether to continue.
pub trait InputStrategy: Send {
    fn setup(&mut self, ctx: &ExecutionContext) -> Result<(), WorkflowError>;
    /// Non-blocking check for a start or exit request
    fn poll(&mut self) -> Result<Trigger, WorkflowError>;
    /// Blocks until the operator submits or cancels
    fn get_user_input(&mut self) -> Result<RawInput, WorkflowError>;
    fn unlock_interface(&mut self) -> Result<(), WorkflowError>;
    fn cleanup(&mut self);
}

/// Façade shared by Idle, CollectInput and Disseminate
pub type SharedInput = Arc<Mutex<InputInterface>>;

pub struct InputInterface {
    method: String,
    strategy: Box<dyn InputStrategy>,
    closed: bool,
}

impl InputInterface {
    /// Resolve the named input strategy through the registry and set it up
    pub fn connect(
        ctx: &ExecutionContext,
        registry: &mut StrategyRegistry,
        method: &str,
    ) -> Result<Self, WorkflowError> {
        let strategy = registry.instantiate_input(method)?;
        Self::with_strategy(ctx, method, strategy)
    }

    pub fn with_strategy(
        ctx: &ExecutionContext,
        method: &str,
        mut strategy: Box<dyn InputStrategy>,
    ) -> Result<Self, WorkflowError> {
        strategy.setup(ctx)?;
        info!(method = method, "Input interface ready");
        Ok(Self {
            method: method.to_string(),
            strategy,
            closed: false,
        })
    }

    pub fn shared(self) -> SharedInput {
        Arc::new(Mutex::new(self))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn poll_trigger(&mut self) -> Result<Trigger, WorkflowError> {
        if self.closed {
            return Ok(Trigger::Exit);
        }
        self.strategy.poll()
    }

    pub fn collect(&mut self) -> Result<RawInput, WorkflowError> {
        if self.closed {
            return Err(WorkflowError::Device(format!(
                "input interface '{}' is closed",
                self.method
            )));
        }
        self.strategy.get_user_input()
    }

    /// Validate raw data into session parameters, protocol ceilings included
    pub fn normalize(&self, raw: &RawSubmission) -> Result<SessionParameters, WorkflowError> {
        let parameters = SessionParameters::from_raw(raw, Local::now().date_naive())?;
        parameters.check_protocol_limits()?;
        Ok(parameters)
    }

    /// Release the front-end for a new cycle
    pub fn unlock(&mut self) -> Result<(), WorkflowError> {
        if self.closed {
            return Ok(());
        }
        self.strategy.unlock_interface()
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.strategy.cleanup();
        info!(method = %self.method, "Input interface closed");
    }
}

impl Drop for InputInterface {
    fn drop(&mut self) {
        if !self.closed {
            warn!(method = %self.method, "Input interface dropped without close");
            self.close();
        }
    }
}
