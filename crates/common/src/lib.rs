//! # Common: Shared Verification Vocabulary
//!
//! Every crate in the workspace speaks in these types. They are constructed
//! fresh on each invocation; only the [`report::Report`] leaves the process.

pub mod cache;
pub mod config;
pub mod digest;
pub mod report;
pub mod traits;

pub use digest::content_digest;
pub use report::Report;
pub use traits::{FetchError, Fetcher};

use serde::Serialize;
use std::fmt;

/// Verification track a result belongs to.
///
/// Serialized names are the keys the dashboard reads from the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The primary web front end.
    Station,
    /// The companion block-explorer tool.
    Finder,
    /// Extension package as distributed by the Chrome Web Store.
    ExtensionChrome,
    /// Extension package as distributed by Edge Add-ons.
    ExtensionEdge,
}

impl Target {
    pub const ALL: [Target; 4] = [
        Target::Station,
        Target::Finder,
        Target::ExtensionChrome,
        Target::ExtensionEdge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Target::Station => "station",
            Target::Finder => "finder",
            Target::ExtensionChrome => "extension_chrome",
            Target::ExtensionEdge => "extension_edge",
        }
    }

    /// Returns `true` for the tracks verified by unpacking a store package.
    pub fn is_extension(self) -> bool {
        matches!(self, Target::ExtensionChrome | Target::ExtensionEdge)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One historical CI execution, resolved once and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDescriptor {
    pub run_id: u64,
    pub commit_sha: String,
    pub run_url: String,
    pub commit_url: String,
    /// Listing endpoint for the artifacts this run produced.
    pub artifacts_url: String,
    /// Digest of the workflow definition as it existed at `commit_sha`.
    pub workflow_hash_at_commit: String,
    /// Digest of the workflow definition at the default branch tip.
    pub workflow_hash_at_head: String,
}

impl RunDescriptor {
    /// `true` when the workflow definition was edited after this run's commit.
    pub fn workflow_changed(&self) -> bool {
        self.workflow_hash_at_commit != self.workflow_hash_at_head
    }
}

/// A single `<digest>  <url>` line of a checksum manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub expected_digest: String,
    pub canonical_url: String,
}

/// Two spaces, as written by `md5sum`.
const CHECKSUM_SEPARATOR: &str = "  ";

impl ChecksumEntry {
    /// Parses one manifest line. Blank or separator-less lines yield `None`.
    ///
    /// # Examples
    /// ```
    /// # use common::ChecksumEntry;
    /// let entry = ChecksumEntry::parse("d41d8cd98f00b204e9800998ecf8427e  https://host/app.js").unwrap();
    /// assert_eq!(entry.canonical_url, "https://host/app.js");
    /// assert!(ChecksumEntry::parse("").is_none());
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return None;
        }
        let (digest, url) = line.split_once(CHECKSUM_SEPARATOR)?;
        Some(Self {
            expected_digest: digest.trim().to_string(),
            canonical_url: url.to_string(),
        })
    }

    /// Parses every usable line, preserving manifest order and duplicates.
    pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> Vec<Self> {
        lines
            .iter()
            .filter_map(|line| {
                let line = line.as_ref();
                let parsed = Self::parse(line);
                if parsed.is_none() && !line.trim().is_empty() {
                    tracing::warn!("Skipping malformed checksum line: {:?}", line);
                }
                parsed
            })
            .collect()
    }
}

/// Outcome of checking one file. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCheckResult {
    #[serde(rename = "file")]
    pub identifier: String,
    #[serde(rename = "hash")]
    pub expected_digest: String,
    #[serde(rename = "deployed_hash")]
    pub observed_digest: String,
    #[serde(rename = "ok")]
    pub passed: bool,
}

impl FileCheckResult {
    pub fn new(identifier: impl Into<String>, expected: String, observed: String) -> Self {
        let passed = expected == observed;
        Self {
            identifier: identifier.into(),
            expected_digest: expected,
            observed_digest: observed,
            passed,
        }
    }

    /// A failing entry standing in for something that could not be inspected
    /// at all (unreadable container, missing manifest).
    pub fn synthetic_failure(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            expected_digest: String::new(),
            observed_digest: String::new(),
            passed: false,
        }
    }
}

/// Published-vs-deployed version state of an extension variant.
///
/// `updating` is sticky: the first mismatch observed during an invocation wins
/// and later observations never overwrite it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestVersionState {
    pub updating: bool,
    pub published_version: String,
    pub deployed_version: String,
}

impl ManifestVersionState {
    /// Records one published/deployed comparison. Returns `true` on a match.
    pub fn observe(&mut self, published: &str, deployed: &str) -> bool {
        let matched = published == deployed;
        if !self.updating {
            self.published_version = published.to_string();
            self.deployed_version = deployed.to_string();
            self.updating = !matched;
        }
        matched
    }
}

/// Workflow definition drift for the run a result was verified against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowFileState {
    pub changed: bool,
    #[serde(rename = "hash")]
    pub current_hash: String,
    #[serde(rename = "prev_hash")]
    pub previous_hash: String,
}

impl From<&RunDescriptor> for WorkflowFileState {
    fn from(run: &RunDescriptor) -> Self {
        Self {
            changed: run.workflow_changed(),
            current_hash: run.workflow_hash_at_head.clone(),
            previous_hash: run.workflow_hash_at_commit.clone(),
        }
    }
}

/// Everything the report records for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetResult {
    pub status_ok: bool,
    pub latest_run_url: String,
    pub latest_commit_url: String,
    pub workflow_file: WorkflowFileState,
    pub deployed_files: Vec<FileCheckResult>,
    /// URLs whose fetch failed; they are absent from `deployed_files`.
    pub unverified_files: Vec<String>,
    #[serde(rename = "manifest", skip_serializing_if = "Option::is_none")]
    pub version_state: Option<ManifestVersionState>,
}

impl TargetResult {
    /// Adopts `run` as the run this result was verified against.
    pub fn record_run(&mut self, run: &RunDescriptor) {
        self.latest_run_url = run.run_url.clone();
        self.latest_commit_url = run.commit_url.clone();
        self.workflow_file = WorkflowFileState::from(run);
    }

    /// Pass iff at least one file was checked and every check passed.
    pub fn compute_status(&self) -> bool {
        !self.deployed_files.is_empty() && self.deployed_files.iter().all(|f| f.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(at_commit: &str, at_head: &str) -> RunDescriptor {
        RunDescriptor {
            run_id: 7,
            commit_sha: "abc123".into(),
            run_url: "https://github.com/o/r/actions/runs/7".into(),
            commit_url: "https://github.com/o/r/commit/abc123".into(),
            artifacts_url: "https://api.github.com/repos/o/r/actions/runs/7/artifacts".into(),
            workflow_hash_at_commit: at_commit.into(),
            workflow_hash_at_head: at_head.into(),
        }
    }

    #[test]
    fn test_parse_checksum_line() {
        let entry = ChecksumEntry::parse("0cc175b9c0f1b6a831c399e269772661  https://host/app.js\r")
            .unwrap();
        assert_eq!(entry.expected_digest, "0cc175b9c0f1b6a831c399e269772661");
        assert_eq!(entry.canonical_url, "https://host/app.js");
    }

    #[test]
    fn test_parse_rejects_blank_and_malformed() {
        assert!(ChecksumEntry::parse("").is_none());
        assert!(ChecksumEntry::parse("   ").is_none());
        assert!(ChecksumEntry::parse("0cc175b9 https://host/app.js").is_none());
    }

    #[test]
    fn test_parse_lines_keeps_order_and_duplicates() {
        let lines = vec![
            "aaa  https://host/a.js",
            "",
            "garbage",
            "bbb  https://host/b.js",
            "ccc  https://host/a.js",
        ];
        let entries = ChecksumEntry::parse_lines(&lines);
        let urls: Vec<&str> = entries.iter().map(|e| e.canonical_url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://host/a.js", "https://host/b.js", "https://host/a.js"]
        );
        assert_eq!(entries[0].expected_digest, "aaa");
    }

    #[test]
    fn test_status_false_when_empty() {
        let result = TargetResult::default();
        assert!(!result.compute_status());
    }

    #[test]
    fn test_status_requires_every_pass() {
        let mut result = TargetResult::default();
        result
            .deployed_files
            .push(FileCheckResult::new("a", "x".into(), "x".into()));
        assert!(result.compute_status());

        result
            .deployed_files
            .push(FileCheckResult::new("b", "x".into(), "y".into()));
        assert!(!result.compute_status());
    }

    #[test]
    fn test_synthetic_failure_never_passes() {
        let check = FileCheckResult::synthetic_failure("chrome-extension://id/manifest.json");
        assert!(!check.passed);
        assert!(check.expected_digest.is_empty());
    }

    #[test]
    fn test_updating_flag_is_sticky() {
        let mut state = ManifestVersionState::default();
        assert!(!state.observe("1.2.0", "1.1.9"));
        assert!(state.updating);

        // A second, different mismatch must not overwrite the first.
        assert!(!state.observe("1.2.0", "1.1.8"));
        assert!(state.updating);
        assert_eq!(state.published_version, "1.2.0");
        assert_eq!(state.deployed_version, "1.1.9");

        // Nor does a later match reset it.
        assert!(state.observe("1.2.0", "1.2.0"));
        assert!(state.updating);
        assert_eq!(state.deployed_version, "1.1.9");
    }

    #[test]
    fn test_match_without_prior_mismatch() {
        let mut state = ManifestVersionState::default();
        assert!(state.observe("2.0.0", "2.0.0"));
        assert!(!state.updating);
        assert_eq!(state.published_version, "2.0.0");
        assert_eq!(state.deployed_version, "2.0.0");
    }

    #[test]
    fn test_record_run_sets_workflow_state() {
        let mut result = TargetResult::default();
        result.record_run(&run("old", "new"));
        assert!(result.workflow_file.changed);
        assert_eq!(result.workflow_file.previous_hash, "old");
        assert_eq!(result.workflow_file.current_hash, "new");
        assert_eq!(result.latest_commit_url, "https://github.com/o/r/commit/abc123");

        result.record_run(&run("same", "same"));
        assert!(!result.workflow_file.changed);
    }

    #[test]
    fn test_file_check_serializes_dashboard_keys() {
        let check = FileCheckResult::new("https://host/app.js", "a".into(), "a".into());
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["file"], "https://host/app.js");
        assert_eq!(json["hash"], "a");
        assert_eq!(json["deployed_hash"], "a");
        assert_eq!(json["ok"], true);
    }
}
