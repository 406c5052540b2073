pub mod loader;
pub mod registry;

pub use loader::{BuiltinModules, LoadFailure, ModuleLoader, StrategyConstructor, StrategyInstance};
pub use registry::{RegistryError, StrategyDescription, StrategyDescriptor, StrategyRegistry};
