use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::StorageError;
use crate::domain::TestSession;

/// One line of the append-only testing registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub timestamp: DateTime<Local>,
    pub client: String,
    pub set_id: String,
    pub protocol: String,
    pub concrete_class: String,
    pub specimen_count: usize,
    pub sample_age_days: i64,
}

impl RegistryEntry {
    pub fn from_session(session: &TestSession) -> Self {
        let p = &session.parameters;
        Self {
            timestamp: Local::now(),
            client: p.client.clone(),
            set_id: p.set_id.clone(),
            protocol: p.protocol.tag().to_string(),
            concrete_class: p.concrete_class.clone(),
            specimen_count: session.specimens().len(),
            sample_age_days: p.sample_age_days(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestingRegistry {
    path: PathBuf,
}

impl TestingRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a JSON line, creating the file if needed
    pub async fn append(&self, entry: &RegistryEntry) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let entry_json = serde_json::to_string(entry).map_err(|e| StorageError::serde(&self.path, e))?;
        let content = format!("{entry_json}\n");

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;

        debug!(path = %self.path.display(), set_id = %entry.set_id, "Registry entry appended");
        Ok(())
    }

    /// Every entry in file order; a missing file is an empty registry
    pub async fn entries(&self) -> Result<Vec<RegistryEntry>, StorageError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| StorageError::serde(&self.path, e)))
            .collect()
    }
}
