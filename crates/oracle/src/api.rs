//! Response shapes of the CI provider REST API. Only consumed fields are modelled.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WorkflowList {
    pub workflows: Vec<Workflow>,
}

#[derive(Debug, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct RunList {
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub head_sha: String,
    pub html_url: String,
    pub artifacts_url: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl WorkflowRun {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref().map_or(true, |s| s == "completed")
    }
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub default_branch: String,
}

#[derive(Debug, Deserialize)]
pub struct FileContent {
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArtifactList {
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub archive_download_url: String,
}
