// Persisted laboratory data: the testing registry and the catalogs

pub mod catalog;
pub mod registry;

use thiserror::Error;

use crate::config::DataPathsConfig;

pub use catalog::CatalogStore;
pub use registry::{RegistryEntry, TestingRegistry};

/// Files updated after every completed session
#[derive(Debug, Clone)]
pub struct LabStorage {
    pub registry: TestingRegistry,
    pub clients: CatalogStore,
    pub concrete_classes: CatalogStore,
}

impl LabStorage {
    pub fn from_config(paths: &DataPathsConfig) -> Self {
        Self {
            registry: TestingRegistry::new(&paths.registry_file),
            clients: CatalogStore::clients(&paths.clients_file),
            concrete_classes: CatalogStore::concrete_classes(&paths.concrete_classes_file),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed data in {path}: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn serde(path: &std::path::Path, source: serde_json::Error) -> Self {
        StorageError::Serde {
            path: path.display().to_string(),
            source,
        }
    }
}
