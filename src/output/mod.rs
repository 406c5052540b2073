// Output façade and the capability every receipt generator provides

pub mod receipts;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::OutputConfig;
use crate::context::ExecutionContext;
use crate::domain::{OutputFormat, TestSession};
use crate::errors::WorkflowError;
use crate::plugins::StrategyRegistry;

pub trait OutputStrategy: Send {
    fn setup(&mut self, ctx: &ExecutionContext, config: &OutputConfig) -> Result<(), WorkflowError>;
    /// Produce one receipt and return where it was written
    fn generate_receipt(
        &mut self,
        session: &TestSession,
        format: OutputFormat,
    ) -> Result<PathBuf, WorkflowError>;
    fn cleanup(&mut self);
}

/// Owned by Disseminate, released by the process on shutdown
pub type SharedOutput = Arc<Mutex<OutputInterface>>;

pub struct OutputInterface {
    name: String,
    strategy: Box<dyn OutputStrategy>,
    closed: bool,
}

impl OutputInterface {
    pub fn connect(
        ctx: &ExecutionContext,
        registry: &mut StrategyRegistry,
        name: &str,
    ) -> Result<Self, WorkflowError> {
        let strategy = registry.instantiate_output(name)?;
        Self::with_strategy(ctx, name, strategy)
    }

    pub fn with_strategy(
        ctx: &ExecutionContext,
        name: &str,
        mut strategy: Box<dyn OutputStrategy>,
    ) -> Result<Self, WorkflowError> {
        strategy.setup(ctx, &ctx.config.output)?;
        info!(strategy = name, "Output interface ready");
        Ok(Self {
            name: name.to_string(),
            strategy,
            closed: false,
        })
    }

    pub fn shared(self) -> SharedOutput {
        Arc::new(Mutex::new(self))
    }

    /// One receipt per requested format, in the requested order
    pub fn generate_receipts(&mut self, session: &TestSession) -> Result<Vec<PathBuf>, WorkflowError> {
        if self.closed {
            return Err(WorkflowError::Output(format!(
                "output interface '{}' is closed",
                self.name
            )));
        }
        let mut receipts = Vec::with_capacity(session.parameters.output_formats.len());
        for format in &session.parameters.output_formats {
            let path = self.strategy.generate_receipt(session, *format)?;
            info!(format = %format, path = %path.display(), "Receipt generated");
            receipts.push(path);
        }
        Ok(receipts)
    }

    pub fn cleanup(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.strategy.cleanup();
        info!(strategy = %self.name, "Output interface closed");
    }
}

impl Drop for OutputInterface {
    fn drop(&mut self) {
        if !self.closed {
            warn!(strategy = %self.name, "Output interface dropped without cleanup");
            self.cleanup();
        }
    }
}
