//! # The Reaper: Deployed Content Verification
//!
//! Re-fetches every URL listed in a checksum manifest and recomputes its
//! digest.
//!
//! ## Failure policy
//! A fetch that fails at the transport level produces **no** check result:
//! availability problems must not read as tampering. The URL is returned in
//! [`Verification::unverified`] instead, so the gap stays visible.
//!
//! ## Concurrency
//! Fetches run on a [`JoinSet`] bounded by a [`Semaphore`]. Completion order
//! is arbitrary; results are returned in manifest order.

use common::{content_digest, ChecksumEntry, FetchError, Fetcher, FileCheckResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Outcome of verifying a whole manifest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Verification {
    /// One result per fetched URL, in manifest order.
    pub checked: Vec<FileCheckResult>,
    /// URLs that could not be fetched.
    pub unverified: Vec<String>,
}

/// Fetches `entry.canonical_url` and compares its digest with the expected one.
pub async fn verify_entry(
    fetcher: &dyn Fetcher,
    entry: &ChecksumEntry,
) -> Result<FileCheckResult, FetchError> {
    let body = fetcher.get(&entry.canonical_url).await?;
    let check = FileCheckResult::new(
        entry.canonical_url.clone(),
        entry.expected_digest.clone(),
        content_digest(&body),
    );
    if check.passed {
        tracing::info!("Verifying {}: OK", check.identifier);
    } else {
        tracing::warn!(
            "Verifying {}: MISMATCH (expected {}, deployed {})",
            check.identifier,
            check.expected_digest,
            check.observed_digest
        );
    }
    Ok(check)
}

/// Verifies every entry with at most `concurrency` fetches in flight.
pub async fn verify_all(
    fetcher: Arc<dyn Fetcher>,
    entries: Vec<ChecksumEntry>,
    concurrency: usize,
) -> Verification {
    let urls: Vec<String> = entries.iter().map(|e| e.canonical_url.clone()).collect();
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            (index, verify_entry(fetcher.as_ref(), &entry).await)
        });
    }

    let mut outcomes: Vec<Option<FileCheckResult>> = vec![None; urls.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(check))) => outcomes[index] = Some(check),
            Ok((_, Err(e))) => tracing::warn!("Error verifying file: {}", e),
            Err(e) => tracing::error!("Verification task failed: {}", e),
        }
    }

    let mut verification = Verification::default();
    for (outcome, url) in outcomes.into_iter().zip(urls) {
        match outcome {
            Some(check) => verification.checked.push(check),
            None => verification.unverified.push(url),
        }
    }
    verification
}
