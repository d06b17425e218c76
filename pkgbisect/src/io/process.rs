//! Helpers for running child processes with timeouts and bounded output.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

/// Default cap on captured stdout/stderr per stream.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// How long to keep draining pipes after killing a timed-out child.
///
/// Grandchildren (e.g. `npm` under `sh -c`) can hold the pipes open after the
/// direct child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Stdout was cut off at the capture limit where the caller needs all of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{label} printed more than {limit} bytes of output ({dropped} bytes dropped)")]
pub struct OutputTruncated {
    pub label: String,
    pub limit: usize,
    pub dropped: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Turn a timeout or non-zero exit into an error mentioning `label`.
    pub fn check(self, label: &str) -> Result<Self> {
        if self.timed_out {
            return Err(anyhow!("{label} timed out"));
        }
        if !self.status.success() {
            let stderr = self.stderr_lossy();
            let detail = if stderr.trim().is_empty() {
                self.stdout_lossy()
            } else {
                stderr
            };
            return Err(anyhow!(
                "{label} failed with status {:?}: {}",
                self.status.code(),
                detail.trim()
            ));
        }
        Ok(self)
    }

    /// Stdout as text, or [`OutputTruncated`] if any of it was discarded.
    pub fn complete_stdout(&self, label: &str, limit: usize) -> Result<String> {
        if self.stdout_truncated > 0 {
            return Err(OutputTruncated {
                label: label.to_string(),
                limit,
                dropped: self.stdout_truncated,
            }
            .into());
        }
        Ok(self.stdout_lossy())
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// The child is killed if the returned future is dropped before it finishes.
#[instrument(
    skip_all,
    fields(timeout_secs = timeout.as_secs(), output_limit_bytes = output_limit_bytes)
)]
pub async fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = tokio::spawn(read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = tokio::spawn(read_stream_limited(stderr, output_limit_bytes));

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).await.context("write stdin")?;
    }

    let mut timed_out = false;
    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status.context("wait for command")?,
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().await.context("kill command")?;
            child.wait().await.context("wait command after kill")?
        }
    };

    let grace = timed_out.then_some(DRAIN_GRACE);
    let (stdout, stdout_truncated) = join_output(stdout_handle, grace)
        .await
        .context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle, grace)
        .await
        .context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

async fn join_output(
    mut handle: JoinHandle<Result<(Vec<u8>, usize)>>,
    grace: Option<Duration>,
) -> Result<(Vec<u8>, usize)> {
    let joined = match grace {
        None => (&mut handle).await,
        Some(grace) => match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                warn!("pipe still open after kill, discarding output");
                return Ok((Vec::new(), 0));
            }
        },
    };
    match joined {
        Ok(result) => result,
        Err(e) => Err(anyhow!("output reader task failed: {e}")),
    }
}

async fn read_stream_limited<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await.context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_and_status() {
        let out = run_command_with_timeout(sh("echo hello"), None, Duration::from_secs(10), 1024)
            .await
            .expect("run");
        assert!(out.status.success());
        assert!(!out.timed_out);
        assert_eq!(out.stdout_lossy(), "hello\n");
    }

    #[tokio::test]
    async fn truncates_output_beyond_limit() {
        let cmd = sh("printf 0123456789");
        let out = run_command_with_timeout(cmd, None, Duration::from_secs(10), 4)
            .await
            .expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
    }

    #[tokio::test]
    async fn complete_stdout_rejects_truncated_output() {
        let cmd = sh("printf 0123456789");
        let out = run_command_with_timeout(cmd, None, Duration::from_secs(10), 4)
            .await
            .expect("run");
        let err = out.complete_stdout("printf", 4).expect_err("truncated");
        let truncated = err.downcast_ref::<OutputTruncated>().expect("typed error");
        assert_eq!(truncated.dropped, 6);

        let whole = run_command_with_timeout(sh("printf 0123"), None, Duration::from_secs(10), 4)
            .await
            .expect("run");
        assert_eq!(whole.complete_stdout("printf", 4).expect("complete"), "0123");
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let out = run_command_with_timeout(
            Command::new("cat"),
            Some(b"piped input"),
            Duration::from_secs(10),
            1024,
        )
        .await
        .expect("run");
        assert_eq!(out.stdout_lossy(), "piped input");
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let out = run_command_with_timeout(sh("sleep 5"), None, Duration::from_millis(100), 1024)
            .await
            .expect("run");
        assert!(out.timed_out);
        let err = out.check("sleep").expect_err("timed out");
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn check_reports_stderr_on_failure() {
        let out = run_command_with_timeout(
            sh("echo broken >&2; exit 3"),
            None,
            Duration::from_secs(10),
            1024,
        )
        .await
        .expect("run");
        let err = out.check("script").expect_err("non-zero exit");
        let msg = err.to_string();
        assert!(msg.contains("Some(3)"), "{msg}");
        assert!(msg.contains("broken"), "{msg}");
    }
}
