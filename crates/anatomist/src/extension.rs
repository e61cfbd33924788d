//! Extension track: verify a store-distributed package against the CI run
//! that built the same version.
//!
//! Stores re-sign packages and rewrite `manifest.json`, so the package as a
//! whole never matches the build. Instead each file is compared with the
//! run's checksum manifest, and the manifest itself is compared structurally
//! after projecting the store's copy onto the shape of the one the run built.

use crate::TargetOutcome;
use common::config::ExtensionConfig;
use common::{
    content_digest, ChecksumEntry, FetchError, Fetcher, FileCheckResult, ManifestVersionState,
    RunDescriptor, TargetResult,
};
use forge::{ProjectionError, Tree};
use lazarus::{ArchiveError, ArchiveReader};
use oracle::{CiClient, OracleError};
use vault::ContainerError;

pub const MANIFEST_PATH: &str = "manifest.json";
/// Store signature metadata, added after the build.
pub const SIGNED_METADATA_PATH: &str = "_metadata/verified_contents.json";

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("cannot download package: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid container: {0}")]
    Container(#[from] ContainerError),
    #[error("invalid package archive: {0}")]
    Archive(#[from] ArchiveError),
    #[error("invalid manifest: {0}")]
    Manifest(#[from] ProjectionError),
    #[error("manifest has no version")]
    MissingVersion,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployedManifestError {
    #[error(transparent)]
    Ci(#[from] OracleError),
    #[error("invalid deployed manifest: {0}")]
    Manifest(#[from] ProjectionError),
}

/// The package a store currently serves, unpacked just enough to compare.
#[derive(Debug, Clone)]
pub struct PublishedPackage {
    /// Zip payload with the container header removed.
    pub archive: Vec<u8>,
    pub manifest: Tree,
    pub version: String,
}

impl PublishedPackage {
    /// Strips the container header and reads the top-level manifest.
    pub fn from_container(container: &[u8]) -> Result<Self, PackageError> {
        let payload = vault::extract_payload(container)?;
        let mut reader = ArchiveReader::open(payload)?;
        let entry = reader.find(MANIFEST_PATH)?;
        let manifest = Tree::from_json(&reader.read(&entry)?)?;
        let version = manifest
            .version()
            .ok_or(PackageError::MissingVersion)?
            .to_string();
        Ok(Self {
            archive: payload.to_vec(),
            manifest,
            version,
        })
    }
}

/// Downloads the current package from the store's update endpoint.
pub async fn fetch_published(
    fetcher: &dyn Fetcher,
    update_url: &str,
) -> Result<PublishedPackage, PackageError> {
    let container = fetcher.get(update_url).await?;
    PublishedPackage::from_container(&container)
}

/// The manifest `run` built, from its single-file manifest artifact.
pub async fn fetch_deployed_manifest(
    ci: &CiClient,
    run: &RunDescriptor,
    artifact: &str,
) -> Result<Tree, DeployedManifestError> {
    let content = ci.fetch_artifact_file(run, artifact).await?;
    Ok(Tree::from_json(&content)?)
}

/// Compares every file of `package` with what the run certified.
///
/// Files are visited in archive order. A file with no certified line means
/// package and manifest disagree on the file set: it is recorded as failing
/// and the remaining files are not compared.
pub fn compare_files(
    package: &PublishedPackage,
    deployed_manifest: &Tree,
    entries: &[ChecksumEntry],
    install_prefix: &str,
) -> Result<Vec<FileCheckResult>, ArchiveError> {
    let mut reader = ArchiveReader::open(&package.archive)?;
    let mut checks = Vec::new();

    for file in reader.files()? {
        if file.path == SIGNED_METADATA_PATH {
            tracing::debug!("Skipping {}", file.path);
            continue;
        }
        let identifier = format!("{install_prefix}{}", file.path);

        if file.path == MANIFEST_PATH {
            let projected = forge::project(deployed_manifest, &package.manifest);
            let check =
                FileCheckResult::new(identifier, deployed_manifest.digest(), projected.digest());
            if !check.passed {
                tracing::warn!(
                    "{}: published manifest differs from the built one",
                    check.identifier
                );
            }
            checks.push(check);
            continue;
        }

        let content = reader.read(&file)?;
        let observed = content_digest(&content);
        let Some(entry) = entries.iter().find(|e| e.canonical_url == identifier) else {
            tracing::error!(
                "{} is not in the certified manifest; stopping file comparison",
                identifier
            );
            checks.push(FileCheckResult::new(identifier, String::new(), observed));
            break;
        };
        let check = FileCheckResult::new(identifier, entry.expected_digest.clone(), observed);
        if check.passed {
            tracing::info!("Verifying {}: OK", check.identifier);
        } else {
            tracing::warn!(
                "Verifying {}: MISMATCH (expected {}, published {})",
                check.identifier,
                check.expected_digest,
                check.observed_digest
            );
        }
        checks.push(check);
    }
    Ok(checks)
}

/// Verifies one store distribution against the newest run that built the
/// version it serves.
///
/// Runs are scanned newest first. A run whose deployed manifest carries a
/// different version marks the variant as updating (the first mismatch is
/// kept) and the scan moves on; the first matching run is verified and ends
/// the scan.
pub async fn verify_extension(
    ci: &CiClient,
    web: &dyn Fetcher,
    extension: &ExtensionConfig,
    run_depth: usize,
) -> TargetOutcome {
    let runs = match ci.resolve_runs(&extension.repo, run_depth).await {
        Ok(runs) => runs,
        Err(e) => {
            tracing::error!("{}: cannot resolve runs: {}", extension.repo, e);
            return TargetOutcome::unresolved(TargetResult {
                version_state: Some(ManifestVersionState::default()),
                ..Default::default()
            });
        }
    };

    let mut result = TargetResult::default();
    let mut state = ManifestVersionState::default();
    if let Some(newest) = runs.first() {
        result.record_run(newest);
    }

    let manifest_id = format!("{}{}", extension.install_prefix, MANIFEST_PATH);
    let package = match fetch_published(web, &extension.update_url).await {
        Ok(package) => package,
        Err(e) => {
            tracing::error!("{}: {}", extension.extension_id, e);
            result
                .deployed_files
                .push(FileCheckResult::synthetic_failure(manifest_id));
            result.version_state = Some(state);
            return TargetOutcome::resolved(result);
        }
    };
    tracing::info!(
        "{}: store serves version {}",
        extension.extension_id,
        package.version
    );

    let mut matched = false;
    for run in &runs {
        let deployed = match fetch_deployed_manifest(ci, run, &extension.manifest_artifact).await {
            Ok(deployed) => deployed,
            Err(e) => {
                tracing::warn!("Run {}: no usable deployed manifest: {}", run.run_id, e);
                continue;
            }
        };
        let deployed_version = deployed.version().unwrap_or_default();
        if !state.observe(&package.version, deployed_version) {
            tracing::info!(
                "Run {} built {}, store serves {}; store is still updating",
                run.run_id,
                deployed_version,
                package.version
            );
            continue;
        }

        matched = true;
        result.record_run(run);
        let artifact = match ci.retrieve_artifact(run, &extension.checksum_artifact).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!("Run {}: {}", run.run_id, e);
                break;
            }
        };
        match compare_files(&package, &deployed, &artifact.entries(), &extension.install_prefix) {
            Ok(checks) => result.deployed_files = checks,
            Err(e) => {
                tracing::error!("{}: {}", extension.extension_id, e);
                result.deployed_files = vec![FileCheckResult::synthetic_failure(manifest_id)];
            }
        }
        break;
    }

    if !matched {
        tracing::warn!(
            "{}: no recent run built version {}",
            extension.extension_id,
            package.version
        );
    }
    result.version_state = Some(state);
    TargetOutcome::resolved(result)
}
