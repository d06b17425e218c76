//! `pkgbisect` CLI.
//!
//! Clones a repository and extracts `package.json` per commit, runs the test
//! command at chosen revisions, lists released versions of many repositories
//! through a container, and fetches GitHub CI status for each version.

use std::future::{Future, pending};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use pkgbisect::commits::collect_commits;
use pkgbisect::core::executor::Executor;
use pkgbisect::core::outcome::{BatchSummary, Outcome};
use pkgbisect::core::types::RepoInfoResult;
use pkgbisect::exit_codes;
use pkgbisect::io::cache::{REPO_INFO_FILE, RepoCache, write_json};
use pkgbisect::io::config::{BisectConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use pkgbisect::io::docker::Docker;
use pkgbisect::io::git::Git;
use pkgbisect::io::github::GitHubClient;
use pkgbisect::io::progress::ProgressBarSink;
use pkgbisect::logging;
use pkgbisect::repo_info::collect_repo_infos;
use pkgbisect::statuses::collect_statuses;
use pkgbisect::test_run::{TestCommand, run_tests};

#[derive(Parser)]
#[command(
    name = "pkgbisect",
    version,
    about = "Bisect a package's history across commits and released versions"
)]
struct Cli {
    /// TOML config file (defaults apply when it does not exist).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Hide progress bars.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Clone a repository and read `package.json` at every commit.
    Commits {
        /// Repository URL (anything `git clone` accepts).
        url: String,
        /// Clone destination; an existing clone there is reused.
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Concurrent `git show` calls.
        #[arg(long)]
        concurrency: Option<usize>,
        /// Write the JSON here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the test command at each revision of an existing clone.
    Test {
        /// Work tree to reset and test in.
        dir: PathBuf,
        /// Revisions to test, in order.
        #[arg(required = true)]
        hashes: Vec<String>,
    },
    /// List version tags of repositories via the runner container.
    RepoInfo {
        /// Repositories in `owner/name` form.
        #[arg(required = true)]
        repos: Vec<String>,
        /// Concurrent containers.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Fetch GitHub CI status for every listed version.
    Statuses {
        /// Repositories with an existing `repoInfo.json`.
        #[arg(required = true)]
        repos: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    if let Command::InitConfig { force } = cli.command {
        return cmd_init_config(&cli.config, force);
    }
    let cfg = load_config(&cli.config)?;
    match cli.command {
        Command::InitConfig { .. } => Ok(exit_codes::OK),
        Command::Commits {
            url,
            dir,
            concurrency,
            out,
        } => cmd_commits(&cfg, cli.quiet, &url, dir, concurrency, out).await,
        Command::Test { dir, hashes } => cmd_test(&cfg, cli.quiet, dir, &hashes).await,
        Command::RepoInfo { repos, concurrency } => {
            cmd_repo_info(&cfg, cli.quiet, &repos, concurrency).await
        }
        Command::Statuses { repos } => cmd_statuses(&cfg, cli.quiet, &repos).await,
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    write_config(path, &BisectConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

async fn cmd_commits(
    cfg: &BisectConfig,
    quiet: bool,
    url: &str,
    dir: Option<PathBuf>,
    concurrency: Option<usize>,
    out: Option<PathBuf>,
) -> Result<i32> {
    let executor = Executor::new(concurrency.unwrap_or(cfg.concurrency))?;
    let dir = dir.unwrap_or_else(|| PathBuf::from(clone_dir_name(url)));
    let git = if dir.join(".git").exists() {
        info!(dir = %dir.display(), "reusing existing clone");
        Git::new(&dir).with_limits(cfg.command_timeout(), cfg.output_limit_bytes)
    } else {
        Git::clone_into(url, &dir, cfg.command_timeout(), cfg.output_limit_bytes).await?
    };
    let hashes = git.commit_hashes().await?;

    let bar = progress_bar(quiet, hashes.len(), "commits");
    let executor = executor.with_progress(&bar);
    let commits = collect_commits(&git, &hashes, &executor, interrupted()).await;
    bar.finish();
    let commits = commits?;

    match out {
        Some(path) => {
            write_json(&path, &commits)?;
            println!("{}", path.display());
        }
        None => print_json(&commits)?,
    }
    Ok(exit_codes::OK)
}

async fn cmd_test(cfg: &BisectConfig, quiet: bool, dir: PathBuf, hashes: &[String]) -> Result<i32> {
    let git = Git::new(dir).with_limits(cfg.command_timeout(), cfg.output_limit_bytes);
    let command = TestCommand::from_config(cfg);

    let bar = progress_bar(quiet, hashes.len(), "tests");
    let outcomes = run_tests(&git, hashes, &command, Some(&bar), interrupted()).await;
    bar.finish();

    let summary = BatchSummary::from_outcomes(&outcomes);
    let results: Vec<_> = outcomes.into_iter().filter_map(Outcome::into_success).collect();
    print_json(&results)?;

    if summary.cancelled > 0 {
        return Ok(exit_codes::INTERRUPTED);
    }
    if results.iter().all(|r| r.ok) {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::PARTIAL)
    }
}

async fn cmd_repo_info(
    cfg: &BisectConfig,
    quiet: bool,
    repos: &[String],
    concurrency: Option<usize>,
) -> Result<i32> {
    let cache = RepoCache::new(&cfg.output_dir);
    let docker = Docker::from_config(&cfg.docker, cfg.command_timeout(), cfg.output_limit_bytes);

    let bar = progress_bar(quiet, repos.len(), "repo-info");
    let executor =
        Executor::new(concurrency.unwrap_or(cfg.repo_info_concurrency))?.with_progress(&bar);
    let outcomes = collect_repo_infos(repos, &docker, &cache, &executor, interrupted()).await;
    bar.finish();

    let summary = BatchSummary::from_outcomes(&outcomes);
    let mut listing_errors = 0usize;
    let mut report = Vec::with_capacity(outcomes.len());
    for (repo, outcome) in repos.iter().zip(&outcomes) {
        let entry = match outcome {
            Outcome::Success(RepoInfoResult::Info(info)) => RepoReport {
                repo,
                versions: Some(info.versions.len()),
                error: None,
            },
            Outcome::Success(RepoInfoResult::Error(err)) => {
                listing_errors += 1;
                RepoReport {
                    repo,
                    versions: None,
                    error: Some(err.err.clone()),
                }
            }
            Outcome::Failure(failure) => RepoReport {
                repo,
                versions: None,
                error: Some(failure.message.clone()),
            },
            Outcome::Cancelled => RepoReport {
                repo,
                versions: None,
                error: Some("cancelled".to_string()),
            },
        };
        report.push(entry);
    }
    print_json(&report)?;

    if summary.cancelled > 0 {
        Ok(exit_codes::INTERRUPTED)
    } else if summary.failed > 0 || listing_errors > 0 {
        Ok(exit_codes::PARTIAL)
    } else {
        Ok(exit_codes::OK)
    }
}

#[derive(Serialize)]
struct RepoReport<'a> {
    repo: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    versions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn cmd_statuses(cfg: &BisectConfig, quiet: bool, repos: &[String]) -> Result<i32> {
    let cache = RepoCache::new(&cfg.output_dir);
    let client = GitHubClient::from_config(&cfg.github)?;

    let mut infos = Vec::with_capacity(repos.len());
    for repo in repos {
        let cached: Option<RepoInfoResult> = cache.load(repo, REPO_INFO_FILE)?;
        match cached {
            Some(RepoInfoResult::Info(info)) => infos.push(info),
            Some(RepoInfoResult::Error(err)) => {
                warn!(repo = %repo, error = %err.err, "skipping repo whose listing failed");
            }
            None => {
                return Err(anyhow!(
                    "no {} for {repo} (run `pkgbisect repo-info {repo}` first)",
                    cache.path(repo, REPO_INFO_FILE).display()
                ));
            }
        }
    }

    let total = infos.iter().map(|i| i.versions.len()).sum();
    let bar = progress_bar(quiet, total, "statuses");
    let fetch_all = async {
        for info in &infos {
            collect_statuses(info, &client, &cache, &bar, cfg.request_interval()).await?;
        }
        Ok::<_, anyhow::Error>(())
    };
    let result = tokio::select! {
        result = fetch_all => Some(result),
        () = interrupted() => None,
    };
    bar.finish();

    match result {
        Some(result) => {
            result?;
            if infos.len() == repos.len() {
                Ok(exit_codes::OK)
            } else {
                Ok(exit_codes::PARTIAL)
            }
        }
        None => Ok(exit_codes::INTERRUPTED),
    }
}

/// Resolves on Ctrl-C; never resolves if the signal cannot be installed.
fn interrupted() -> impl Future<Output = ()> {
    async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            pending::<()>().await;
        }
        warn!("interrupted, cancelling outstanding tasks");
    }
}

fn progress_bar(quiet: bool, len: usize, label: &str) -> ProgressBarSink {
    if quiet {
        ProgressBarSink::hidden(len)
    } else {
        ProgressBarSink::new(len, label)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

/// Directory name `git clone` would pick for `url`.
fn clone_dir_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        "repo".to_string()
    } else {
        name.to_string()
    }
}
