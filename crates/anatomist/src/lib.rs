//! # The Anatomist: Target Verification
//!
//! Composes the CI queries of [`oracle`], the deployed-file checks of
//! [`reaper`] and the package inspection of [`vault`], [`lazarus`] and
//! [`forge`] into one pass over every enabled target.
//!
//! - [`pipeline`]: the per-target orchestrator producing a [`common::Report`].
//! - [`extension`]: the store-package track for browser extensions.

pub mod extension;
pub mod pipeline;

#[cfg(test)]
mod fixtures;

pub use pipeline::Pipeline;

use common::TargetResult;

/// What verifying one target produced.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub result: TargetResult,
    /// `true` once the target's CI runs were resolved, even if verification
    /// failed afterwards.
    pub resolved: bool,
}

impl TargetOutcome {
    pub fn resolved(result: TargetResult) -> Self {
        Self {
            result,
            resolved: true,
        }
    }

    pub fn unresolved(result: TargetResult) -> Self {
        Self {
            result,
            resolved: false,
        }
    }
}
