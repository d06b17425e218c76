//! Collect version → commit listings for many repositories.

use std::future::Future;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::executor::Executor;
use crate::core::outcome::Outcome;
use crate::core::types::{RepoError, RepoInfoResult};
use crate::core::versions::parse_version_listing;
use crate::io::cache::{REPO_INFO_FILE, RepoCache};
use crate::io::docker::VersionSource;

/// Listing for one repository, reusing `repoInfo.json` when it exists.
///
/// A failed listing is recorded as a [`RepoError`] and returned as a value;
/// only cache I/O errors are propagated.
#[instrument(skip(source, cache))]
pub async fn fetch_repo_info(
    repo: &str,
    source: &dyn VersionSource,
    cache: &RepoCache,
) -> Result<RepoInfoResult> {
    if let Some(cached) = cache.load::<RepoInfoResult>(repo, REPO_INFO_FILE)? {
        return Ok(cached);
    }
    let result = match source.version_listing(repo).await {
        Ok(listing) => {
            let info = parse_version_listing(repo, &listing);
            info!(versions = info.versions.len(), "listed versions");
            RepoInfoResult::Info(info)
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "version listing failed");
            RepoInfoResult::Error(RepoError {
                repo_name: repo.to_string(),
                err: format!("{err:#}"),
            })
        }
    };
    cache.store(repo, REPO_INFO_FILE, &result)?;
    Ok(result)
}

/// Run [`fetch_repo_info`] for every repository through `executor`.
pub async fn collect_repo_infos<C>(
    repos: &[String],
    source: &dyn VersionSource,
    cache: &RepoCache,
    executor: &Executor<'_>,
    cancel: C,
) -> Vec<Outcome<RepoInfoResult>>
where
    C: Future<Output = ()>,
{
    let tasks = repos
        .iter()
        .map(|repo| move || fetch_repo_info(repo, source, cache));
    executor.run_until(tasks, cancel).await
}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use anyhow::anyhow;

    use super::*;
    use crate::core::types::RepoInfo;
    use crate::test_support::{CountingSink, ScriptedVersionSource};

    #[tokio::test]
    async fn records_listing_and_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = RepoCache::new(temp.path());
        let source = ScriptedVersionSource::new()
            .with("a/ok", Ok("1.0.0 aaa\n1.0.0 zzz\n1.1.0 bbb\n".to_string()))
            .with("a/bad", Err(anyhow!("container exited 1")));
        let sink = CountingSink::default();
        let executor = Executor::new(2).expect("executor").with_progress(&sink);

        let repos = vec!["a/ok".to_string(), "a/bad".to_string()];
        let outcomes = collect_repo_infos(&repos, &source, &cache, &executor, pending()).await;

        let info = outcomes[0].success().and_then(RepoInfoResult::info).expect("info");
        assert_eq!(info.versions.get("1.0.0").map(String::as_str), Some("aaa"));
        assert_eq!(info.versions.len(), 2);

        let err = outcomes[1].success().expect("recorded error");
        assert!(matches!(err, RepoInfoResult::Error(e) if e.err.contains("container exited 1")));
        assert_eq!(sink.count(), 2);

        let stored: Option<RepoInfoResult> = cache.load("a/bad", REPO_INFO_FILE).expect("load");
        assert_eq!(stored.as_ref(), Some(err));
    }

    #[tokio::test]
    async fn cached_result_skips_source() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = RepoCache::new(temp.path());
        let cached = RepoInfoResult::Info(RepoInfo {
            repo_name: "a/b".to_string(),
            versions: [("0.1.0".to_string(), "abc".to_string())].into_iter().collect(),
        });
        cache.store("a/b", REPO_INFO_FILE, &cached).expect("store");

        let source = ScriptedVersionSource::new();
        let result = fetch_repo_info("a/b", &source, &cache).await.expect("fetch");
        assert_eq!(result, cached);
        assert_eq!(source.calls(), 0);
    }
}
