// Module loading: maps (module, class) references to constructors

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::input::queue::QueueInput;
use crate::input::terminal::TerminalInput;
use crate::input::InputStrategy;
use crate::output::receipts::ReceiptGenerator;
use crate::output::OutputStrategy;

/// A freshly constructed strategy of either kind
pub enum StrategyInstance {
    Input(Box<dyn InputStrategy>),
    Output(Box<dyn OutputStrategy>),
}

impl StrategyInstance {
    pub fn kind(&self) -> &'static str {
        match self {
            StrategyInstance::Input(_) => "input",
            StrategyInstance::Output(_) => "output",
        }
    }
}

impl fmt::Debug for StrategyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrategyInstance::{}", self.kind())
    }
}

/// Zero-argument constructor; configuration arrives later through `setup`
pub type StrategyConstructor = Arc<dyn Fn() -> StrategyInstance + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadFailure {
    #[error("module '{0}' not found")]
    ModuleNotFound(String),
    #[error("module '{module}' does not expose '{symbol}'")]
    SymbolNotFound { module: String, symbol: String },
}

pub trait ModuleLoader: Send + Sync {
    fn load(&self, module: &str, class: &str) -> Result<StrategyConstructor, LoadFailure>;
}

/// Symbol table of the strategies compiled into this binary
#[derive(Default)]
pub struct BuiltinModules {
    modules: HashMap<String, HashMap<String, StrategyConstructor>>,
}

impl BuiltinModules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every strategy shipped with the binary
    pub fn standard() -> Self {
        Self::empty()
            .with_symbol("input::terminal", "TerminalInput", || {
                StrategyInstance::Input(Box::new(TerminalInput::new()))
            })
            .with_symbol("input::queue", "QueueInput", || {
                StrategyInstance::Input(Box::new(QueueInput::new()))
            })
            .with_symbol("output::receipts", "ReceiptGenerator", || {
                StrategyInstance::Output(Box::new(ReceiptGenerator::new()))
            })
    }

    pub fn with_symbol<F>(mut self, module: &str, class: &str, constructor: F) -> Self
    where
        F: Fn() -> StrategyInstance + Send + Sync + 'static,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(class.to_string(), Arc::new(constructor));
        self
    }
}

impl ModuleLoader for BuiltinModules {
    fn load(&self, module: &str, class: &str) -> Result<StrategyConstructor, LoadFailure> {
        let symbols = self
            .modules
            .get(module)
            .ok_or_else(|| LoadFailure::ModuleNotFound(module.to_string()))?;
        symbols
            .get(class)
            .cloned()
            .ok_or_else(|| LoadFailure::SymbolNotFound {
                module: module.to_string(),
                symbol: class.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinguishes_missing_module_from_missing_symbol() {
        let modules = BuiltinModules::standard();
        assert!(modules.load("input::queue", "QueueInput").is_ok());
        assert_eq!(
            modules.load("input::gui", "GuiInput").err(),
            Some(LoadFailure::ModuleNotFound("input::gui".into()))
        );
        assert!(matches!(
            modules.load("input::queue", "GuiInput"),
            Err(LoadFailure::SymbolNotFound { .. })
        ));
    }
}
