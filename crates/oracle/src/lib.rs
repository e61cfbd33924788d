//! # The Oracle: CI Provider Queries
//!
//! Answers two questions about a repository's build pipeline:
//! - which completed runs of the deploy workflow are the most recent, and
//!   whether the workflow definition changed since each of them
//!   ([`CiClient::resolve_runs`]);
//! - what checksum manifest a given run certified
//!   ([`CiClient::retrieve_artifact`]).

pub mod api;
pub mod http;

pub use http::HttpFetcher;

use base64::Engine;
use common::config::Config;
use common::{content_digest, ChecksumEntry, FetchError, Fetcher, RunDescriptor};
use lazarus::{ArchiveError, ArchiveReader};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Errors from CI provider operations.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no workflow matching {workflow:?} in {repo}")]
    WorkflowNotFound { repo: String, workflow: String },
    #[error("no completed runs for {repo}")]
    NoRuns { repo: String },
    #[error("run {run_url} has no artifact named {name:?}")]
    ArtifactNotFound { name: String, run_url: String },
    #[error("artifact {name:?}: {source}")]
    Archive {
        name: String,
        #[source]
        source: ArchiveError,
    },
    #[error("cannot decode {path} content: {reason}")]
    Content { path: String, reason: String },
}

/// The checksum manifest a run certified, line by line in stored order.
#[derive(Debug, Clone)]
pub struct RunArtifact {
    pub run: RunDescriptor,
    pub lines: Vec<String>,
}

impl RunArtifact {
    pub fn entries(&self) -> Vec<ChecksumEntry> {
        ChecksumEntry::parse_lines(&self.lines)
    }
}

/// Client for the CI provider's REST API.
pub struct CiClient {
    fetcher: Arc<dyn Fetcher>,
    owner: String,
    api_base: String,
    raw_base: String,
    web_base: String,
    workflow_file: String,
    workflow_path: String,
}

impl CiClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &Config) -> Self {
        Self {
            fetcher,
            owner: config.repo_owner.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            raw_base: config.raw_base.trim_end_matches('/').to_string(),
            web_base: config.web_base.trim_end_matches('/').to_string(),
            workflow_file: config.workflow_file.clone(),
            workflow_path: config.workflow_path(),
        }
    }

    fn repo_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.owner, repo)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, OracleError> {
        let body = self.fetcher.get(url).await?;
        serde_json::from_slice(&body).map_err(|source| OracleError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// The `k` most recent completed runs of the deploy workflow, newest first.
    ///
    /// # Errors
    /// Any transport failure, a missing workflow, or an empty run list. An
    /// empty result is never returned as success.
    pub async fn resolve_runs(
        &self,
        repo: &str,
        k: usize,
    ) -> Result<Vec<RunDescriptor>, OracleError> {
        let workflows: api::WorkflowList = self
            .get_json(&format!("{}/actions/workflows", self.repo_url(repo)))
            .await?;
        let workflow = workflows
            .workflows
            .into_iter()
            .find(|w| w.path.contains(&self.workflow_file))
            .ok_or_else(|| OracleError::WorkflowNotFound {
                repo: repo.to_string(),
                workflow: self.workflow_file.clone(),
            })?;

        let runs: api::RunList = self
            .get_json(&format!(
                "{}/actions/workflows/{}/runs?status=completed&per_page={}",
                self.repo_url(repo),
                workflow.id,
                k
            ))
            .await?;
        let selected: Vec<api::WorkflowRun> = runs
            .workflow_runs
            .into_iter()
            .filter(api::WorkflowRun::is_completed)
            .take(k)
            .collect();
        if selected.is_empty() {
            return Err(OracleError::NoRuns {
                repo: repo.to_string(),
            });
        }

        let at_head = self.workflow_hash_at_head(repo).await?;
        tracing::info!("{}: workflow definition digest at head: {}", repo, at_head);

        let mut descriptors = Vec::with_capacity(selected.len());
        for run in selected {
            let at_commit = self.workflow_hash_at_commit(repo, &run.head_sha).await?;
            if at_commit == at_head {
                tracing::info!("{}: workflow file unchanged since run {}", repo, run.id);
            } else {
                tracing::warn!(
                    "{}: workflow file changed since run {}: {} != {}",
                    repo,
                    run.id,
                    at_commit,
                    at_head
                );
            }
            descriptors.push(RunDescriptor {
                run_id: run.id,
                commit_url: format!(
                    "{}/{}/{}/commit/{}",
                    self.web_base, self.owner, repo, run.head_sha
                ),
                commit_sha: run.head_sha,
                run_url: run.html_url,
                artifacts_url: run.artifacts_url,
                workflow_hash_at_commit: at_commit,
                workflow_hash_at_head: at_head.clone(),
            });
        }
        Ok(descriptors)
    }

    /// Digest of the workflow definition as it existed at `sha`.
    pub async fn workflow_hash_at_commit(
        &self,
        repo: &str,
        sha: &str,
    ) -> Result<String, OracleError> {
        let url = format!(
            "{}/contents/{}?ref={}",
            self.repo_url(repo),
            self.workflow_path,
            sha
        );
        let file: api::FileContent = self.get_json(&url).await?;
        let content = decode_content(&file, &self.workflow_path)?;
        Ok(content_digest(&content))
    }

    /// Digest of the workflow definition at the default branch tip.
    pub async fn workflow_hash_at_head(&self, repo: &str) -> Result<String, OracleError> {
        let repository: api::Repository = self.get_json(&self.repo_url(repo)).await?;
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_base, self.owner, repo, repository.default_branch, self.workflow_path
        );
        let body = self.fetcher.get(&url).await?;
        Ok(content_digest(&body))
    }

    /// Downloads the artifact named exactly `name` and returns its single file.
    ///
    /// A run without such an artifact is an error: an empty manifest would
    /// otherwise pass for a clean result.
    pub async fn fetch_artifact_file(
        &self,
        run: &RunDescriptor,
        name: &str,
    ) -> Result<Vec<u8>, OracleError> {
        let listing: api::ArtifactList = self.get_json(&run.artifacts_url).await?;
        let artifact = listing
            .artifacts
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| OracleError::ArtifactNotFound {
                name: name.to_string(),
                run_url: run.run_url.clone(),
            })?;

        let archive = self.fetcher.get(&artifact.archive_download_url).await?;
        let archive_error = |source: ArchiveError| OracleError::Archive {
            name: name.to_string(),
            source,
        };
        let mut reader = ArchiveReader::open(&archive).map_err(archive_error)?;
        let (path, content) = reader.first_file().map_err(archive_error)?;
        tracing::debug!(
            "Artifact {} of run {}: {} ({} bytes)",
            name,
            run.run_id,
            path,
            content.len()
        );
        Ok(content)
    }

    /// The checksum manifest certified by `run`, as raw lines.
    pub async fn retrieve_artifact(
        &self,
        run: &RunDescriptor,
        name: &str,
    ) -> Result<RunArtifact, OracleError> {
        let content = self.fetch_artifact_file(run, name).await?;
        Ok(RunArtifact {
            run: run.clone(),
            lines: lazarus::split_lines(&content),
        })
    }
}

fn decode_content(file: &api::FileContent, path: &str) -> Result<Vec<u8>, OracleError> {
    if let Some(encoding) = file.encoding.as_deref() {
        if encoding != "base64" {
            return Err(OracleError::Content {
                path: path.to_string(),
                reason: format!("unsupported encoding {encoding:?}"),
            });
        }
    }
    let compact: String = file.content.split_whitespace().collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| OracleError::Content {
            path: path.to_string(),
            reason: e.to_string(),
        })
}
