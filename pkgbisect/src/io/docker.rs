//! Docker adapter used to list version tags of a repository.
//!
//! The [`VersionSource`] trait decouples repo-info collection from the
//! container backend. Tests use scripted sources that return canned listings
//! without spawning `docker`.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::io::config::DockerConfig;
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command_with_timeout};

/// Produces the raw `<version> <hash>` listing for a repository.
pub trait VersionSource: Send + Sync {
    fn version_listing<'a>(&'a self, repo: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Runs throwaway containers (`docker run --rm <image> ...`).
#[derive(Debug, Clone)]
pub struct Docker {
    program: String,
    image: String,
    repo_info_script: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl Docker {
    pub fn new(image: impl Into<String>) -> Self {
        let defaults = DockerConfig::default();
        Self {
            program: defaults.program,
            image: image.into(),
            repo_info_script: defaults.repo_info_script,
            timeout: Duration::from_secs(30 * 60),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn from_config(cfg: &DockerConfig, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            program: cfg.program.clone(),
            image: cfg.image.clone(),
            repo_info_script: cfg.repo_info_script.clone(),
            timeout,
            output_limit_bytes,
        }
    }

    /// Override the container CLI (e.g. `podman`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Run `args` in a fresh container and return its stdout.
    #[instrument(skip_all, fields(image = %self.image))]
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("run").arg("--rm").arg(&self.image).args(args);
        debug!(args = ?args, "docker run");
        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .await
            .with_context(|| format!("spawn {} run", self.program))?
            .check(&format!("{} run {}", self.program, self.image))?;
        Ok(output.stdout_lossy())
    }
}

impl VersionSource for Docker {
    fn version_listing<'a>(&'a self, repo: &'a str) -> BoxFuture<'a, Result<String>> {
        async move { self.run(&[self.repo_info_script.as_str(), repo]).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_image_and_args_to_program() {
        let docker = Docker::new("example/runner").with_program("echo");
        let out = docker.run(&["./list.sh", "a/b"]).await.expect("run");
        assert_eq!(out.trim(), "run --rm example/runner ./list.sh a/b");
    }

    #[tokio::test]
    async fn listing_runs_configured_script() {
        let docker = Docker::new("example/runner").with_program("echo");
        let out = docker.version_listing("a/b").await.expect("listing");
        assert_eq!(out.trim(), "run --rm example/runner ./getRepoInfo.sh a/b");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let docker = Docker::new("example/runner").with_program("false");
        assert!(docker.run(&[]).await.is_err());
    }
}
