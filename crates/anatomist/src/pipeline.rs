//! Verification pipeline over every enabled target.
//!
//! Stages per target:
//! - **Resolve**: newest completed deploy run(s) and workflow drift ([`CiClient::resolve_runs`]).
//! - **Retrieve**: the checksum manifest the run certified.
//! - **Verify**: plain sites re-fetch every listed URL ([`reaper::verify_all`]);
//!   extensions unpack the store package ([`crate::extension`]).
//! - **Aggregate**: compute `status_ok` for every target.
//!
//! Targets run one after another. Each stage returns a fresh value; the
//! [`Report`] is only written by the orchestrator.

use crate::extension::verify_extension;
use crate::TargetOutcome;
use common::cache::DigestCache;
use common::config::{Config, SiteConfig};
use common::{Fetcher, Report, Target, TargetResult};
use oracle::CiClient;
use std::sync::Arc;

pub struct Pipeline {
    config: Config,
    ci: CiClient,
    /// Reads deployed content; never carries CI credentials.
    web: Arc<dyn Fetcher>,
    cache: Option<DigestCache>,
}

impl Pipeline {
    pub fn new(config: Config, ci_fetcher: Arc<dyn Fetcher>, web: Arc<dyn Fetcher>) -> Self {
        let ci = CiClient::new(ci_fetcher, &config);
        Self {
            config,
            ci,
            web,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: DigestCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Verifies every enabled target and returns the aggregated report.
    pub async fn run(&self) -> Report {
        let targets = self.config.enabled_targets();
        let mut report = Report::new(&targets);

        for target in targets {
            tracing::info!("Verifying {}", target);
            let outcome = self.verify_target(target).await;
            if outcome.resolved {
                report.touch();
                if let Some(cache) = &self.cache {
                    cache.observe(&outcome.result.workflow_file.current_hash);
                }
            }
            report.set(target, outcome.result);
        }

        report.aggregate();
        report
    }

    pub async fn verify_target(&self, target: Target) -> TargetOutcome {
        if let Some(site) = self.config.site(target) {
            return verify_site(
                &self.ci,
                Arc::clone(&self.web),
                site,
                self.config.fetch_concurrency,
            )
            .await;
        }
        match self.config.extension(target) {
            Some(extension) => {
                verify_extension(
                    &self.ci,
                    self.web.as_ref(),
                    extension,
                    self.config.run_depth,
                )
                .await
            }
            None => TargetOutcome::unresolved(TargetResult::default()),
        }
    }
}

/// Verifies a plainly deployed site against its most recent completed run.
pub async fn verify_site(
    ci: &CiClient,
    web: Arc<dyn Fetcher>,
    site: &SiteConfig,
    concurrency: usize,
) -> TargetOutcome {
    let run = match ci.resolve_runs(&site.repo, 1).await {
        Ok(runs) => match runs.into_iter().next() {
            Some(run) => run,
            None => return TargetOutcome::unresolved(TargetResult::default()),
        },
        Err(e) => {
            tracing::error!("{}: cannot resolve latest run: {}", site.repo, e);
            return TargetOutcome::unresolved(TargetResult::default());
        }
    };

    let mut result = TargetResult::default();
    result.record_run(&run);

    let artifact = match ci.retrieve_artifact(&run, &site.artifact).await {
        Ok(artifact) => artifact,
        Err(e) => {
            tracing::error!("{}: {}", site.repo, e);
            return TargetOutcome::resolved(result);
        }
    };
    let entries = artifact.entries();
    tracing::info!(
        "{}: run {} certified {} files",
        site.repo,
        run.run_id,
        entries.len()
    );

    let verification = reaper::verify_all(web, entries, concurrency).await;
    result.deployed_files = verification.checked;
    result.unverified_files = verification.unverified;
    TargetOutcome::resolved(result)
}
