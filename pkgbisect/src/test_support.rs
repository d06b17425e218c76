//! Test-only helpers: a scratch git repository, a counting progress sink,
//! and scripted stand-ins for the Docker and GitHub backends.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow};
use futures::future::{BoxFuture, FutureExt, ready};
use tempfile::TempDir;

use crate::core::executor::ProgressSink;
use crate::core::types::CommitStatusRecord;
use crate::io::docker::VersionSource;
use crate::io::github::StatusSource;

/// A throwaway git repository with a fixed committer identity.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `rel`, commit everything, and return the new HEAD hash.
    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Result<String> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "-m", message])?;
        let head = self.git(&["rev-parse", "HEAD"])?;
        Ok(head.trim().to_string())
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args([
                "-c",
                "user.name=pkgbisect",
                "-c",
                "user.email=pkgbisect@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Progress sink that only counts notifications.
#[derive(Debug, Default)]
pub struct CountingSink {
    count: AtomicUsize,
}

impl CountingSink {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ProgressSink for CountingSink {
    fn advance(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Version source returning canned listings per repository.
#[derive(Debug, Default)]
pub struct ScriptedVersionSource {
    listings: HashMap<String, std::result::Result<String, String>>,
    calls: AtomicUsize,
}

impl ScriptedVersionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, repo: &str, listing: Result<String>) -> Self {
        self.listings
            .insert(repo.to_string(), listing.map_err(|e| format!("{e:#}")));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VersionSource for ScriptedVersionSource {
    fn version_listing<'a>(&'a self, repo: &'a str) -> BoxFuture<'a, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.listings.get(repo) {
            Some(Ok(listing)) => Ok(listing.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("no scripted listing for {repo}")),
        };
        ready(result).boxed()
    }
}

/// Status source returning canned responses per commit hash.
#[derive(Debug, Default)]
pub struct ScriptedStatusSource {
    responses: HashMap<String, std::result::Result<CommitStatusRecord, String>>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hash: &str, response: Result<CommitStatusRecord>) -> Self {
        self.responses
            .insert(hash.to_string(), response.map_err(|e| format!("{e:#}")));
        self
    }

    /// `repo@hash` for every request, in request order.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl StatusSource for ScriptedStatusSource {
    fn commit_status<'a>(
        &'a self,
        repo: &'a str,
        hash: &'a str,
    ) -> BoxFuture<'a, Result<CommitStatusRecord>> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(format!("{repo}@{hash}"));
        }
        let result = match self.responses.get(hash) {
            Some(Ok(record)) => Ok(record.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("no scripted status for {hash}")),
        };
        ready(result).boxed()
    }
}

/// A 200 response whose body carries `state`.
pub fn status_record(state: &str) -> CommitStatusRecord {
    CommitStatusRecord {
        status: 200,
        headers: Default::default(),
        data: serde_json::json!({ "state": state }),
    }
}
