//! One-key digest cache persisted beside the process (`.storage.json`).
//!
//! Holds only the most recently observed workflow-definition digest. The
//! cache is advisory: I/O failures are logged and never abort a run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CACHE_FILE: &str = ".storage.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(rename = "workflowFileHash", skip_serializing_if = "Option::is_none")]
    workflow_file_hash: Option<String>,
}

pub struct DigestCache {
    path: PathBuf,
}

impl DigestCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache at [`DEFAULT_CACHE_FILE`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEFAULT_CACHE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored digest, creating an empty document if none exists.
    pub fn load(&self) -> Option<String> {
        if !self.path.exists() {
            if let Err(e) = std::fs::write(&self.path, "{}") {
                tracing::warn!("Could not create {}: {}", self.path.display(), e);
                return None;
            }
        }
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("Error reading {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<CacheDocument>(&raw) {
            Ok(doc) => doc.workflow_file_hash,
            Err(e) => {
                tracing::error!("Error parsing {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn store(&self, digest: &str) {
        let doc = CacheDocument {
            workflow_file_hash: Some(digest.to_string()),
        };
        let written = serde_json::to_string(&doc)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(&self.path, json));
        if let Err(e) = written {
            tracing::error!("Error writing {}: {}", self.path.display(), e);
        }
    }

    /// Compares `digest` with the stored one and stores it when it differs.
    /// Returns `true` if the digest changed.
    pub fn observe(&self, digest: &str) -> bool {
        if self.load().as_deref() == Some(digest) {
            tracing::info!("Workflow file has not been changed.");
            false
        } else {
            tracing::info!("Workflow file has been changed.");
            self.store(digest);
            true
        }
    }
}
