//! Fetch CI status for every listed version of a repository.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::executor::ProgressSink;
use crate::core::types::{RepoInfo, RepoStatuses};
use crate::io::cache::{REPO_STATUS_FILE, RepoCache};
use crate::io::github::StatusSource;

/// Query the status of each `(version, hash)` in listing order and write
/// `repoStatus.json`.
///
/// Requests are sequential with `interval` between them to stay under the API
/// rate limit. Any request failure aborts the repository.
#[instrument(skip_all, fields(repo = %info.repo_name, versions = info.versions.len()))]
pub async fn collect_statuses(
    info: &RepoInfo,
    source: &dyn StatusSource,
    cache: &RepoCache,
    progress: &dyn ProgressSink,
    interval: Duration,
) -> Result<RepoStatuses> {
    let mut statuses = RepoStatuses::new();
    for (i, (version, hash)) in info.versions.iter().enumerate() {
        if i > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        let record = source
            .commit_status(&info.repo_name, hash)
            .await
            .with_context(|| format!("status of {} {version} ({hash})", info.repo_name))?;
        statuses.insert(version.clone(), record);
        progress.advance();
    }
    let path = cache.store(&info.repo_name, REPO_STATUS_FILE, &statuses)?;
    info!(path = %path.display(), "wrote statuses");
    Ok(statuses)
}
