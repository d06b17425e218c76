//! Run the project's test command against checked-out revisions.

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::core::executor::{Executor, ProgressSink};
use crate::core::outcome::Outcome;
use crate::core::types::TestRunResult;
use crate::io::config::BisectConfig;
use crate::io::git::Git;
use crate::io::process::run_command_with_timeout;

/// Test command plus the limits it runs under.
#[derive(Debug, Clone)]
pub struct TestCommand {
    pub argv: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl TestCommand {
    pub fn from_config(cfg: &BisectConfig) -> Self {
        Self {
            argv: cfg.test.command.clone(),
            timeout: cfg.command_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn describe(&self) -> String {
        self.argv.join(" ")
    }
}

/// Reset the work tree to `hash` and run the test command there.
///
/// Never fails: reset errors, spawn errors, timeouts and non-zero exits all
/// become `ok: false` with the error message.
#[instrument(skip_all, fields(hash = %hash))]
pub async fn run_test(git: &Git, hash: &str, command: &TestCommand) -> TestRunResult {
    match try_run_test(git, hash, command).await {
        Ok(()) => {
            info!(hash, "tests passed");
            TestRunResult {
                hash: hash.to_string(),
                ok: true,
                err: None,
            }
        }
        Err(err) => {
            let message = format!("{err:#}");
            warn!(hash, error = %message, "tests failed");
            TestRunResult {
                hash: hash.to_string(),
                ok: false,
                err: Some(message),
            }
        }
    }
}

async fn try_run_test(git: &Git, hash: &str, command: &TestCommand) -> Result<()> {
    git.reset_hard(hash).await?;
    let (program, args) = command
        .argv
        .split_first()
        .ok_or_else(|| anyhow!("empty test command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(git.workdir());
    run_command_with_timeout(cmd, None, command.timeout, command.output_limit_bytes)
        .await?
        .check(&command.describe())?;
    Ok(())
}

/// Test every hash in order.
///
/// The revisions share one work tree, so they run strictly one at a time.
pub async fn run_tests<C>(
    git: &Git,
    hashes: &[String],
    command: &TestCommand,
    progress: Option<&dyn ProgressSink>,
    cancel: C,
) -> Vec<Outcome<TestRunResult>>
where
    C: Future<Output = ()>,
{
    let mut executor = Executor::sequential();
    if let Some(progress) = progress {
        executor = executor.with_progress(progress);
    }
    let tasks = hashes.iter().map(|hash| {
        move || async move { Ok::<_, anyhow::Error>(run_test(git, hash, command).await) }
    });
    executor.run_until(tasks, cancel).await
}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use super::*;
    use crate::test_support::TestRepo;

    fn sh(script: &str) -> TestCommand {
        TestCommand {
            argv: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout: Duration::from_secs(30),
            output_limit_bytes: 4096,
        }
    }

    #[tokio::test]
    async fn runs_command_at_each_revision() {
        let repo = TestRepo::new().expect("repo");
        let good = repo.commit_file("status", "pass", "good").expect("commit");
        let bad = repo.commit_file("status", "fail", "bad").expect("commit");

        let git = Git::new(repo.path());
        let command = sh("test \"$(cat status)\" = pass");
        let hashes = [good.clone(), bad.clone()];
        let outcomes = run_tests(&git, &hashes, &command, None, pending()).await;

        let results: Vec<TestRunResult> = outcomes
            .into_iter()
            .filter_map(Outcome::into_success)
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].hash, good);
        assert!(results[0].ok);
        assert_eq!(results[1].hash, bad);
        assert!(!results[1].ok);
        assert!(results[1].err.is_some());
    }

    #[tokio::test]
    async fn unknown_revision_is_a_failed_run() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file("a", "a", "a").expect("commit");
        let git = Git::new(repo.path());

        let result = run_test(&git, "0000000000000000000000000000000000000000", &sh("true")).await;
        assert!(!result.ok);
        assert!(result.err.expect("err").contains("git reset"));
    }
}
