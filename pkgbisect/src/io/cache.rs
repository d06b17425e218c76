//! Per-repository JSON output under `<output_dir>/<owner>/<repo>/`.
//!
//! `repoInfo.json` doubles as a cache: when present, repo-info collection
//! reuses it instead of starting another container.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

pub const REPO_INFO_FILE: &str = "repoInfo.json";
pub const REPO_STATUS_FILE: &str = "repoStatus.json";

#[derive(Debug, Clone)]
pub struct RepoCache {
    root: PathBuf,
}

impl RepoCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_dir(&self, repo: &str) -> PathBuf {
        self.root.join(repo)
    }

    pub fn path(&self, repo: &str, file: &str) -> PathBuf {
        self.repo_dir(repo).join(file)
    }

    /// Load `file` for `repo`, or `None` if it has not been written yet.
    pub fn load<T: DeserializeOwned>(&self, repo: &str, file: &str) -> Result<Option<T>> {
        let path = self.path(repo, file);
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "cache hit");
        read_json(&path).map(Some)
    }

    pub fn store<T: Serialize>(&self, repo: &str, file: &str, value: &T) -> Result<PathBuf> {
        let path = self.path(repo, file);
        write_json(&path, value)?;
        Ok(path)
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
///
/// Parent directories are created and the file is replaced atomically
/// (temp file + rename), so a crash never leaves a truncated cache entry.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    debug!(path = %path.display(), "wrote json");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoError;

    #[test]
    fn path_nests_owner_and_repo() {
        let cache = RepoCache::new("/out");
        let path = cache.path("octo/widget", REPO_INFO_FILE);
        assert!(path.ends_with("octo/widget/repoInfo.json"));
    }

    #[test]
    fn load_missing_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = RepoCache::new(temp.path());
        let loaded: Option<RepoError> = cache.load("a/b", REPO_INFO_FILE).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn store_creates_dirs_and_loads_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = RepoCache::new(temp.path());
        let value = RepoError {
            repo_name: "a/b".to_string(),
            err: "boom".to_string(),
        };
        let path = cache.store("a/b", REPO_INFO_FILE, &value).expect("store");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.ends_with('\n'));
        let loaded: Option<RepoError> = cache.load("a/b", REPO_INFO_FILE).expect("load");
        assert_eq!(loaded, Some(value));
    }
}
