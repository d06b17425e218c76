//! Per-commit package metadata extraction.

use std::future::Future;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::executor::Executor;
use crate::core::outcome::into_results;
use crate::core::types::{Commit, Package};
use crate::io::git::Git;
use crate::io::process::OutputTruncated;

pub const MANIFEST_PATH: &str = "package.json";

/// Parse `package.json` at `hash`.
///
/// A missing or unparsable manifest is not an error: it yields `None`.
/// A manifest cut off at the output limit is.
pub async fn read_package(git: &Git, hash: &str) -> Result<Option<Package>> {
    let raw = match git.show_file(hash, MANIFEST_PATH).await {
        Ok(raw) => raw,
        Err(err) if err.downcast_ref::<OutputTruncated>().is_some() => {
            return Err(err.context(format!("read {MANIFEST_PATH} at {hash}")));
        }
        Err(err) => {
            debug!(hash, error = %err, "no manifest at revision");
            return Ok(None);
        }
    };
    match serde_json::from_str(&raw) {
        Ok(pkg) => Ok(Some(pkg)),
        Err(err) => {
            debug!(hash, error = %err, "unparsable manifest");
            Ok(None)
        }
    }
}

/// Read the manifest at every hash, keeping hash order.
///
/// Fails if a manifest exceeds the output limit or the batch is cancelled
/// before every commit was read.
#[instrument(skip_all, fields(commits = hashes.len(), limit = executor.limit()))]
pub async fn collect_commits<C>(
    git: &Git,
    hashes: &[String],
    executor: &Executor<'_>,
    cancel: C,
) -> Result<Vec<Commit>>
where
    C: Future<Output = ()>,
{
    let tasks = hashes.iter().map(|hash| {
        move || async move {
            let pkg = read_package(git, hash).await?;
            Ok::<_, anyhow::Error>(Commit {
                hash: hash.clone(),
                pkg,
            })
        }
    });
    let outcomes = executor.run_until(tasks, cancel).await;
    let commits = into_results(outcomes).context("collect commit metadata")?;
    info!(
        with_manifest = commits.iter().filter(|c| c.pkg.is_some()).count(),
        total = commits.len(),
        "collected commit metadata"
    );
    Ok(commits)
}
