//! The report document and its aggregation step.
//!
//! The dashboard reads the serialized report verbatim, so field names here are
//! a fixed contract: `last_check` plus one object per target keyed by
//! [`Target::as_str`].

use crate::{Target, TargetResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Unix seconds of the most recent successful run resolution.
    pub last_check: i64,
    #[serde(flatten)]
    pub results: BTreeMap<Target, TargetResult>,
}

impl Report {
    /// A report with an all-default (failing) entry for every target.
    pub fn new(targets: &[Target]) -> Self {
        let mut results = BTreeMap::new();
        for target in targets {
            let mut result = TargetResult::default();
            if target.is_extension() {
                result.version_state = Some(Default::default());
            }
            results.insert(*target, result);
        }
        Self {
            last_check: 0,
            results,
        }
    }

    /// Stamps the report with the current time.
    pub fn touch(&mut self) {
        self.last_check = chrono::Utc::now().timestamp();
    }

    pub fn result(&self, target: Target) -> Option<&TargetResult> {
        self.results.get(&target)
    }

    pub fn set(&mut self, target: Target, result: TargetResult) {
        self.results.insert(target, result);
    }

    /// Computes `status_ok` for every target.
    pub fn aggregate(&mut self) {
        for (target, result) in self.results.iter_mut() {
            result.status_ok = result.compute_status();
            tracing::info!(
                "{}: {} ({} files checked, {} unverified)",
                target,
                if result.status_ok { "PASS" } else { "FAIL" },
                result.deployed_files.len(),
                result.unverified_files.len()
            );
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the report so readers never observe a partially written file.
    pub fn write_atomic(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let json = self.to_json().context("Failed to serialize report")?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to stage report in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }
}
