//! Builders for in-memory CI providers, store packages and deployed sites.

use base64::Engine;
use common::config::Config;
use common::traits::MemoryFetcher;
use serde_json::json;
use std::collections::HashMap;
use std::io::{Cursor, Write};

pub const API: &str = "https://api.github.com/repos/classic-terra";
pub const WORKFLOW: &[u8] = b"on: push\njobs:\n  deploy: {}\n";
pub const CHROME_ID: &str = "abcdefghijklmnop";
pub const CHROME_STORE_URL: &str = "https://store.example/abcdefghijklmnop.crx";
pub const CHROME_PREFIX: &str = "chrome-extension://abcdefghijklmnop/";

pub fn zip_files(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (name, content) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add directory");
        } else {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(content).expect("write file");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

pub fn crx3(payload: &[u8]) -> Vec<u8> {
    let header = b"\x12\x34signed-header-proto";
    let mut out = Vec::new();
    out.extend_from_slice(b"Cr24");
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(header);
    out.extend_from_slice(payload);
    out
}

pub fn config(extra: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = HashMap::new();
    env.insert("WARDEN_RUN_DEPTH".into(), "3".into());
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| env.get(key).cloned()).expect("fixture config")
}

pub fn chrome_config() -> Config {
    config(&[
        ("WARDEN_CHROME_EXTENSION_ID", CHROME_ID),
        ("WARDEN_CHROME_UPDATE_URL", "https://store.example/{id}.crx"),
    ])
}

/// One completed run and the single-file artifacts it produced.
pub struct FixtureRun {
    pub id: u64,
    pub sha: &'static str,
    pub artifacts: Vec<(&'static str, Vec<u8>)>,
}

pub fn run_url(repo: &str, id: u64) -> String {
    format!("https://github.com/classic-terra/{repo}/actions/runs/{id}")
}

/// Registers a repository whose deploy workflow produced `runs` (newest first).
pub fn with_ci(
    mut fetcher: MemoryFetcher,
    repo: &str,
    per_page: usize,
    runs: &[FixtureRun],
) -> MemoryFetcher {
    let encoded = base64::engine::general_purpose::STANDARD.encode(WORKFLOW);
    fetcher = fetcher
        .with(
            format!("{API}/{repo}/actions/workflows"),
            json!({"workflows": [{"id": 9, "path": ".github/workflows/deploy.yml"}]}).to_string(),
        )
        .with(
            format!("{API}/{repo}"),
            json!({"default_branch": "main"}).to_string(),
        )
        .with(
            format!(
                "https://raw.githubusercontent.com/classic-terra/{repo}/main/.github/workflows/deploy.yml"
            ),
            WORKFLOW.to_vec(),
        );

    let listed: Vec<serde_json::Value> = runs
        .iter()
        .map(|run| {
            json!({
                "id": run.id,
                "head_sha": run.sha,
                "status": "completed",
                "html_url": run_url(repo, run.id),
                "artifacts_url": format!("{API}/{repo}/actions/runs/{}/artifacts", run.id),
            })
        })
        .collect();
    fetcher = fetcher.with(
        format!("{API}/{repo}/actions/workflows/9/runs?status=completed&per_page={per_page}"),
        json!({ "workflow_runs": listed }).to_string(),
    );

    for run in runs {
        fetcher = fetcher.with(
            format!(
                "{API}/{repo}/contents/.github/workflows/deploy.yml?ref={}",
                run.sha
            ),
            json!({"content": encoded, "encoding": "base64"}).to_string(),
        );
        let listing: Vec<serde_json::Value> = run
            .artifacts
            .iter()
            .map(|(name, _)| {
                json!({
                    "name": name,
                    "archive_download_url": format!("https://artifacts.example/{repo}/{}/{name}", run.id),
                })
            })
            .collect();
        fetcher = fetcher.with(
            format!("{API}/{repo}/actions/runs/{}/artifacts", run.id),
            json!({ "artifacts": listing }).to_string(),
        );
        for (name, content) in &run.artifacts {
            fetcher = fetcher.with(
                format!("https://artifacts.example/{repo}/{}/{name}", run.id),
                zip_files(&[("payload.txt", content.as_slice())]),
            );
        }
    }
    fetcher
}

pub fn manifest(version: &str) -> Vec<u8> {
    json!({
        "manifest_version": 3,
        "name": "Station Wallet",
        "version": version,
        "background": {"service_worker": "background.js"},
        "permissions": ["storage"]
    })
    .to_string()
    .into_bytes()
}

/// The manifest as a store rewrites it: injected keys, different formatting.
pub fn store_manifest(version: &str) -> Vec<u8> {
    let mut value: serde_json::Value =
        serde_json::from_slice(&manifest(version)).expect("fixture manifest");
    value["update_url"] = json!("https://clients2.google.com/service/update2/crx");
    value["key"] = json!("MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA");
    serde_json::to_vec_pretty(&value).expect("fixture manifest")
}

pub fn checksum_line(prefix: &str, path: &str, content: &[u8]) -> String {
    format!("{}  {}{}", common::content_digest(content), prefix, path)
}
