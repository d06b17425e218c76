//! Git adapter for bisect commands.
//!
//! Every operation is a `git` subprocess run through
//! [`run_command_with_timeout`], so a hung clone or checkout cannot stall a
//! whole batch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::io::process::{CommandOutput, DEFAULT_OUTPUT_LIMIT_BYTES, run_command_with_timeout};

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn with_limits(mut self, timeout: Duration, output_limit_bytes: usize) -> Self {
        self.timeout = timeout;
        self.output_limit_bytes = output_limit_bytes;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Clone `url` into `dest` and return a wrapper rooted there.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn clone_into(
        url: &str,
        dest: impl Into<PathBuf>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<Self> {
        let dest = dest.into();
        info!(dest = %dest.display(), "cloning repository");
        let mut cmd = Command::new("git");
        cmd.arg("clone").arg(url).arg(&dest);
        run_command_with_timeout(cmd, None, timeout, output_limit_bytes)
            .await
            .with_context(|| format!("spawn git clone {url}"))?
            .check(&format!("git clone {url}"))?;
        Ok(Self::new(dest).with_limits(timeout, output_limit_bytes))
    }

    /// All commit hashes, oldest first, in date order.
    #[instrument(skip_all)]
    pub async fn commit_hashes(&self) -> Result<Vec<String>> {
        let out = self
            .run_capture(&["log", "--reverse", "--date-order", "--pretty=%H"])
            .await?;
        let hashes: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        debug!(count = hashes.len(), "listed commits");
        Ok(hashes)
    }

    /// Contents of `path` at revision `rev` (`git show <rev>:<path>`).
    pub async fn show_file(&self, rev: &str, path: &str) -> Result<String> {
        let spec = format!("{rev}:{path}");
        self.run_capture(&["show", &spec]).await
    }

    /// Move HEAD and the work tree to `rev`, discarding local changes.
    #[instrument(skip_all, fields(rev = %rev))]
    pub async fn reset_hard(&self, rev: &str) -> Result<()> {
        debug!(rev, "hard reset");
        self.run_checked(&["reset", rev, "--hard"]).await?;
        Ok(())
    }

    /// Stdout of a successful command; output past the limit is an error.
    async fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args).await?;
        output.complete_stdout(&format!("git {}", args.join(" ")), self.output_limit_bytes)
    }

    async fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run(args)
            .await?
            .check(&format!("git {}", args.join(" ")))
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .await
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
