//! Runtime configuration, read from the environment (after `.env` loading).
//!
//! Extension variants are opt-in: a variant without an extension id has no
//! update endpoint and is skipped entirely.

use crate::Target;

const DEFAULT_REPO_OWNER: &str = "classic-terra";
const DEFAULT_WORKFLOW_FILE: &str = "deploy.yml";
const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";
const DEFAULT_WEB_BASE: &str = "https://github.com";
const DEFAULT_RUN_DEPTH: usize = 5;
const DEFAULT_FETCH_CONCURRENCY: usize = 8;
const DEFAULT_PRODVERSION: &str = "120.0";

const CHROME_UPDATE_URL: &str = "https://clients2.google.com/service/update2/crx?response=redirect&prodversion={prodversion}&acceptformat=crx2,crx3&x=id%3D{id}%26uc";
const EDGE_UPDATE_URL: &str = "https://edge.microsoft.com/extensionwebstorebase/v1/crx?response=redirect&prodversion={prodversion}&x=id%3D{id}%26installsource%3Dondemand%26uc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

/// A plainly deployed site: one run, one checksum artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub repo: String,
    pub artifact: String,
}

/// One store distribution of the browser extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionConfig {
    pub repo: String,
    pub extension_id: String,
    /// Fully resolved update endpoint (redirects to the current package).
    pub update_url: String,
    /// Installed location; manifest lines are `<prefix><path in package>`.
    pub install_prefix: String,
    pub checksum_artifact: String,
    pub manifest_artifact: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: Option<String>,
    pub repo_owner: String,
    pub workflow_file: String,
    pub api_base: String,
    pub raw_base: String,
    pub web_base: String,
    /// Candidate runs scanned per extension variant.
    pub run_depth: usize,
    /// Upper bound on concurrent deployed-file fetches.
    pub fetch_concurrency: usize,
    pub station: SiteConfig,
    pub finder: SiteConfig,
    pub chrome: Option<ExtensionConfig>,
    pub edge: Option<ExtensionConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |key: &'static str, default: usize| -> Result<usize, ConfigError> {
            match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                None => Ok(default),
                Some(raw) => match raw.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(ConfigError::InvalidNumber { key, value: raw }),
                },
            }
        };

        let extension_repo = var("WARDEN_EXTENSION_REPO", "station-extension");
        let prodversion = var("WARDEN_PRODVERSION", DEFAULT_PRODVERSION);
        let extension = |id_key: &str, url_key: &str, default_url: &str, scheme: &str, name: &str| {
            let id = lookup(id_key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())?;
            let template = var(url_key, default_url);
            Some(ExtensionConfig {
                repo: extension_repo.clone(),
                update_url: template
                    .replace("{id}", &id)
                    .replace("{prodversion}", &prodversion),
                install_prefix: format!("{scheme}://{id}/"),
                checksum_artifact: format!("{name}-checksums"),
                manifest_artifact: format!("{name}-manifest"),
                extension_id: id,
            })
        };

        Ok(Self {
            github_token: lookup("GITHUB_TOKEN").filter(|t| !t.trim().is_empty()),
            repo_owner: var("WARDEN_REPO_OWNER", DEFAULT_REPO_OWNER),
            workflow_file: var("WARDEN_WORKFLOW_FILE", DEFAULT_WORKFLOW_FILE),
            api_base: var("WARDEN_API_BASE", DEFAULT_API_BASE),
            raw_base: var("WARDEN_RAW_BASE", DEFAULT_RAW_BASE),
            web_base: var("WARDEN_WEB_BASE", DEFAULT_WEB_BASE),
            run_depth: number("WARDEN_RUN_DEPTH", DEFAULT_RUN_DEPTH)?,
            fetch_concurrency: number("WARDEN_FETCH_CONCURRENCY", DEFAULT_FETCH_CONCURRENCY)?,
            station: SiteConfig {
                repo: var("WARDEN_STATION_REPO", "station"),
                artifact: var("WARDEN_STATION_ARTIFACT", "checksums"),
            },
            finder: SiteConfig {
                repo: var("WARDEN_FINDER_REPO", "finder"),
                artifact: var("WARDEN_FINDER_ARTIFACT", "checksums"),
            },
            chrome: extension(
                "WARDEN_CHROME_EXTENSION_ID",
                "WARDEN_CHROME_UPDATE_URL",
                CHROME_UPDATE_URL,
                "chrome-extension",
                "chrome",
            ),
            edge: extension(
                "WARDEN_EDGE_EXTENSION_ID",
                "WARDEN_EDGE_UPDATE_URL",
                EDGE_UPDATE_URL,
                "extension",
                "edge",
            ),
        })
    }

    /// Repository path of the workflow definition.
    pub fn workflow_path(&self) -> String {
        format!(".github/workflows/{}", self.workflow_file)
    }

    pub fn site(&self, target: Target) -> Option<&SiteConfig> {
        match target {
            Target::Station => Some(&self.station),
            Target::Finder => Some(&self.finder),
            _ => None,
        }
    }

    pub fn extension(&self, target: Target) -> Option<&ExtensionConfig> {
        match target {
            Target::ExtensionChrome => self.chrome.as_ref(),
            Target::ExtensionEdge => self.edge.as_ref(),
            _ => None,
        }
    }

    /// Targets with enough configuration to be verified, in processing order.
    pub fn enabled_targets(&self) -> Vec<Target> {
        Target::ALL
            .into_iter()
            .filter(|t| self.site(*t).is_some() || self.extension(*t).is_some())
            .collect()
    }
}
