//! Tool configuration stored in `pkgbisect.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::DEFAULT_OUTPUT_LIMIT_BYTES;

pub const DEFAULT_CONFIG_FILE: &str = "pkgbisect.toml";

/// Tool configuration (TOML).
///
/// Missing fields default to the values the tool was tuned with; CLI flags
/// override individual fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BisectConfig {
    /// Concurrent `git show` calls when extracting package metadata.
    pub concurrency: usize,

    /// Concurrent containers when listing repository versions.
    pub repo_info_concurrency: usize,

    /// Root of the per-repository JSON output (`<output_dir>/<owner>/<repo>/`).
    pub output_dir: PathBuf,

    /// Wall-clock budget for any single subprocess.
    pub command_timeout_secs: u64,

    /// Cap on captured stdout/stderr per stream. Git output that exceeds it
    /// is an error rather than a silently shortened listing.
    pub output_limit_bytes: usize,

    pub docker: DockerConfig,
    pub github: GitHubConfig,
    pub test: TestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DockerConfig {
    /// Container CLI to invoke.
    pub program: String,
    pub image: String,
    /// Script inside the image that prints `<version> <hash>` lines.
    pub repo_info_script: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            image: "kazuki-m/runner".to_string(),
            repo_info_script: "./getRepoInfo.sh".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Pause between status requests.
    pub request_interval_ms: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token_env: "GH_TOKEN".to_string(),
            request_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestConfig {
    /// Command run in the checked-out work tree (e.g. `["npm","test"]`).
    pub command: Vec<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "npm install && npm run test".to_string(),
            ],
        }
    }
}

impl Default for BisectConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            repo_info_concurrency: 4,
            output_dir: PathBuf::from("output"),
            command_timeout_secs: 30 * 60,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            docker: DockerConfig::default(),
            github: GitHubConfig::default(),
            test: TestConfig::default(),
        }
    }
}

impl BisectConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(anyhow!("concurrency must be > 0"));
        }
        if self.repo_info_concurrency == 0 {
            return Err(anyhow!("repo_info_concurrency must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.docker.program.trim().is_empty() || self.docker.image.trim().is_empty() {
            return Err(anyhow!("docker.program and docker.image must be non-empty"));
        }
        if self.test.command.is_empty() || self.test.command[0].trim().is_empty() {
            return Err(anyhow!("test.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.github.request_interval_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BisectConfig::default()`.
pub fn load_config(path: &Path) -> Result<BisectConfig> {
    if !path.exists() {
        let cfg = BisectConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BisectConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BisectConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
