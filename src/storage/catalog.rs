// Known clients and concrete classes offered to the operator

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::StorageError;

pub const DEFAULT_CLIENTS: [&str; 4] = [
    "AGREMIN SRL",
    "CONSTRUCT DEMO SRL",
    "BETON QUALITY SA",
    "MATERIALS TEST LTD",
];

pub const DEFAULT_CONCRETE_CLASSES: [&str; 6] = [
    "C 16/20", "C 20/25", "C 25/30", "C 30/37", "C 35/45", "C 40/50",
];

/// JSON array of names, seeded with defaults when the file does not exist yet
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
    defaults: Vec<String>,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>, defaults: &[&str]) -> Self {
        Self {
            path: path.into(),
            defaults: defaults.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn clients(path: impl Into<PathBuf>) -> Self {
        Self::new(path, &DEFAULT_CLIENTS)
    }

    pub fn concrete_classes(path: impl Into<PathBuf>) -> Self {
        Self::new(path, &DEFAULT_CONCRETE_CLASSES)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<String>, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| StorageError::serde(&self.path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.save(&self.defaults).await?;
                info!(path = %self.path.display(), "Catalog seeded with defaults");
                Ok(self.defaults.clone())
            }
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }

    /// Add a name if it is new. Returns whether the catalog changed.
    pub async fn add(&self, name: &str) -> Result<bool, StorageError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(false);
        }
        let mut names = self.load().await?;
        if names.iter().any(|existing| existing == name) {
            return Ok(false);
        }
        names.push(name.to_string());
        self.save(&names).await?;
        debug!(path = %self.path.display(), name = name, "Catalog entry added");
        Ok(true)
    }

    async fn save(&self, names: &[String]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(names).map_err(|e| StorageError::serde(&self.path, e))?;
        fs::write(&self.path, content)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeds_defaults_and_adds_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::clients(dir.path().join("clients.json"));

        let names = store.load().await.unwrap();
        assert_eq!(names.len(), 4);
        assert!(store.path().exists());

        assert!(store.add("  NEW CLIENT SRL ").await.unwrap());
        assert!(!store.add("NEW CLIENT SRL").await.unwrap());
        assert!(!store.add("AGREMIN SRL").await.unwrap());
        assert!(!store.add("   ").await.unwrap());

        let names = store.load().await.unwrap();
        assert_eq!(names.last().map(String::as_str), Some("NEW CLIENT SRL"));
        assert_eq!(names.len(), 5);
    }
}
