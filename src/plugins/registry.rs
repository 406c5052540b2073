// Strategy registry: declarative descriptors resolved lazily to constructors

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::loader::{LoadFailure, ModuleLoader, StrategyConstructor, StrategyInstance};
use crate::config::PluginSeed;
use crate::errors::WorkflowError;
use crate::input::InputStrategy;
use crate::output::OutputStrategy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown strategy category '{0}'")]
    UnknownCategory(String),
    #[error("unknown strategy '{name}' in category '{category}'")]
    UnknownStrategy { category: String, name: String },
    #[error("strategy '{category}.{name}' is missing its {missing} reference")]
    MissingDescriptorFields {
        category: String,
        name: String,
        missing: &'static str,
    },
    #[error("failed to load strategy '{category}.{name}': {reason}")]
    LoadFailure {
        category: String,
        name: String,
        reason: LoadFailure,
    },
    #[error("strategy '{category}.{name}' is not an {expected} strategy")]
    KindMismatch {
        category: String,
        name: String,
        expected: &'static str,
    },
}

impl From<RegistryError> for WorkflowError {
    fn from(err: RegistryError) -> Self {
        WorkflowError::Plugin(err.to_string())
    }
}

/// Declarative, data-only description of a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyDescriptor {
    pub category: String,
    pub name: String,
    pub module_ref: Option<String>,
    pub class_ref: Option<String>,
    pub description: String,
    pub runtime_registered: bool,
}

/// Introspection view returned by [`StrategyRegistry::describe`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyDescription {
    #[serde(flatten)]
    pub descriptor: StrategyDescriptor,
    /// Whether the constructor is already cached
    pub loaded: bool,
}

pub struct StrategyRegistry {
    descriptors: HashMap<String, HashMap<String, StrategyDescriptor>>,
    constructors: HashMap<String, StrategyConstructor>,
    loader: Box<dyn ModuleLoader>,
}

fn cache_key(category: &str, name: &str) -> String {
    format!("{category}.{name}")
}

impl StrategyRegistry {
    /// Build the descriptor map from a configuration seed. Nothing is loaded yet.
    pub fn new(
        seed: &HashMap<String, HashMap<String, PluginSeed>>,
        loader: Box<dyn ModuleLoader>,
    ) -> Self {
        let mut descriptors: HashMap<String, HashMap<String, StrategyDescriptor>> = HashMap::new();
        for (category, strategies) in seed {
            let entries = descriptors.entry(category.clone()).or_default();
            for (name, plugin) in strategies {
                entries.insert(
                    name.clone(),
                    StrategyDescriptor {
                        category: category.clone(),
                        name: name.clone(),
                        module_ref: plugin.module.clone(),
                        class_ref: plugin.class.clone(),
                        description: plugin.description.clone(),
                        runtime_registered: false,
                    },
                );
            }
        }

        let count: usize = descriptors.values().map(HashMap::len).sum();
        info!(
            categories = descriptors.len(),
            strategies = count,
            "Strategy registry initialized"
        );

        Self {
            descriptors,
            constructors: HashMap::new(),
            loader,
        }
    }

    /// Resolve a strategy to its constructor, loading and caching it on first use
    pub fn resolve(&mut self, category: &str, name: &str) -> Result<StrategyConstructor, RegistryError> {
        let key = cache_key(category, name);
        if let Some(constructor) = self.constructors.get(&key) {
            debug!(strategy = %key, "Strategy resolved from cache");
            return Ok(constructor.clone());
        }

        let strategies = self
            .descriptors
            .get(category)
            .ok_or_else(|| RegistryError::UnknownCategory(category.to_string()))?;
        let descriptor = strategies
            .get(name)
            .ok_or_else(|| RegistryError::UnknownStrategy {
                category: category.to_string(),
                name: name.to_string(),
            })?;

        let missing = |field: &'static str| RegistryError::MissingDescriptorFields {
            category: category.to_string(),
            name: name.to_string(),
            missing: field,
        };
        let module = descriptor.module_ref.as_deref().ok_or_else(|| missing("module"))?;
        let class = descriptor.class_ref.as_deref().ok_or_else(|| missing("class"))?;

        let constructor =
            self.loader
                .load(module, class)
                .map_err(|reason| RegistryError::LoadFailure {
                    category: category.to_string(),
                    name: name.to_string(),
                    reason,
                })?;

        info!(strategy = %key, module = module, class = class, "Strategy loaded");
        self.constructors.insert(key, constructor.clone());
        Ok(constructor)
    }

    /// Resolve, then build a fresh instance
    pub fn instantiate(&mut self, category: &str, name: &str) -> Result<StrategyInstance, RegistryError> {
        let constructor = self.resolve(category, name)?;
        let instance = constructor();
        debug!(category = category, name = name, kind = instance.kind(), "Strategy instantiated");
        Ok(instance)
    }

    pub fn instantiate_input(&mut self, name: &str) -> Result<Box<dyn InputStrategy>, RegistryError> {
        match self.instantiate("input", name)? {
            StrategyInstance::Input(strategy) => Ok(strategy),
            StrategyInstance::Output(_) => Err(RegistryError::KindMismatch {
                category: "input".to_string(),
                name: name.to_string(),
                expected: "input",
            }),
        }
    }

    pub fn instantiate_output(&mut self, name: &str) -> Result<Box<dyn OutputStrategy>, RegistryError> {
        match self.instantiate("output", name)? {
            StrategyInstance::Output(strategy) => Ok(strategy),
            StrategyInstance::Input(_) => Err(RegistryError::KindMismatch {
                category: "output".to_string(),
                name: name.to_string(),
                expected: "output",
            }),
        }
    }

    /// Insert or overwrite a descriptor for the rest of this process
    pub fn register_runtime(
        &mut self,
        category: &str,
        name: &str,
        module_ref: &str,
        class_ref: &str,
        description: &str,
    ) {
        let key = cache_key(category, name);
        // an overwritten descriptor must not keep serving the old constructor
        self.constructors.remove(&key);
        self.descriptors.entry(category.to_string()).or_default().insert(
            name.to_string(),
            StrategyDescriptor {
                category: category.to_string(),
                name: name.to_string(),
                module_ref: Some(module_ref.to_string()),
                class_ref: Some(class_ref.to_string()),
                description: description.to_string(),
                runtime_registered: true,
            },
        );
        info!(strategy = %key, module = module_ref, class = class_ref, "Runtime strategy registered");
    }

    pub fn list_categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self.descriptors.keys().cloned().collect();
        categories.sort();
        categories
    }

    pub fn list_strategies(&self, category: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptors
            .get(category)
            .map(|strategies| strategies.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn exists(&self, category: &str, name: &str) -> bool {
        self.descriptors
            .get(category)
            .is_some_and(|strategies| strategies.contains_key(name))
    }

    pub fn describe(&self, category: &str, name: &str) -> Option<StrategyDescription> {
        let descriptor = self.descriptors.get(category)?.get(name)?.clone();
        Some(StrategyDescription {
            loaded: self.constructors.contains_key(&cache_key(category, name)),
            descriptor,
        })
    }

    /// Drop every cached constructor; descriptors stay
    pub fn cleanup(&mut self) {
        let released = self.constructors.len();
        self.constructors.clear();
        info!(released = released, "Strategy registry cleaned up");
    }
}
