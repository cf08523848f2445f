//! JSON log of confirmed address changes
//!
//! The log stores old/new address pairs and timestamps only. Credentials
//! never reach this sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// One confirmed address change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressMapping {
    pub old: Ipv4Addr,
    pub new: Ipv4Addr,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    mappings: Vec<AddressMapping>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Address mapping log backed by a JSON file
#[derive(Debug)]
pub struct MappingLog {
    path: PathBuf,
    file: MappingFile,
}

impl MappingLog {
    /// Load the log, or start an empty one if the file doesn't exist
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MappingError> {
        let path = path.into();
        let file = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            MappingFile {
                version: default_version(),
                mappings: Vec::new(),
            }
        };
        debug!(path = %path.display(), entries = file.mappings.len(), "Loaded address mappings");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[AddressMapping] {
        &self.file.mappings
    }

    /// Append mappings not already present
    pub fn record<'a>(&mut self, mappings: impl IntoIterator<Item = &'a AddressMapping>) -> usize {
        let mut added = 0;
        for mapping in mappings {
            if !self.file.mappings.contains(mapping) {
                self.file.mappings.push(mapping.clone());
                added += 1;
            }
        }
        added
    }

    /// Most recent new address recorded for `old`
    pub fn resolve(&self, old: Ipv4Addr) -> Option<Ipv4Addr> {
        self.file
            .mappings
            .iter()
            .rev()
            .find(|m| m.old == old)
            .map(|m| m.new)
    }

    /// Write the log to disk
    pub fn save(&self) -> Result<(), MappingError> {
        let content = serde_json::to_string_pretty(&self.file)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
