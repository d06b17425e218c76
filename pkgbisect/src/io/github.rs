//! GitHub commit-status client.
//!
//! Only `GET /repos/{repo}/commits/{ref}/status` is needed. The
//! [`StatusSource`] trait lets status collection run against scripted
//! responses in tests.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::types::CommitStatusRecord;
use crate::io::config::GitHubConfig;

const USER_AGENT: &str = concat!("pkgbisect/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches the combined status of one commit.
pub trait StatusSource: Send + Sync {
    fn commit_status<'a>(
        &'a self,
        repo: &'a str,
        hash: &'a str,
    ) -> BoxFuture<'a, Result<CommitStatusRecord>>;
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client whose token comes from `cfg.token_env`.
    pub fn from_config(cfg: &GitHubConfig) -> Result<Self> {
        let token = std::env::var(&cfg.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        if token.is_none() {
            warn!(env = %cfg.token_env, "no GitHub token set, requests are unauthenticated");
        }
        Self::new(cfg.api_base.clone(), token)
    }

    pub fn status_url(&self, repo: &str, hash: &str) -> String {
        format!("{}/repos/{repo}/commits/{hash}/status", self.api_base)
    }

    #[instrument(skip_all, fields(repo = %repo, hash = %hash))]
    async fn fetch_status(&self, repo: &str, hash: &str) -> Result<CommitStatusRecord> {
        let url = self.status_url(repo, hash);
        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        let headers = header_map(response.headers());
        let body = response
            .text()
            .await
            .with_context(|| format!("read body of {url}"))?;
        let data = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));

        if !status.is_success() {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message");
            return Err(anyhow!("GET {url} returned {status}: {message}"));
        }
        debug!(status = status.as_u16(), "fetched commit status");
        Ok(CommitStatusRecord {
            status: status.as_u16(),
            headers,
            data,
        })
    }
}

impl StatusSource for GitHubClient {
    fn commit_status<'a>(
        &'a self,
        repo: &'a str,
        hash: &'a str,
    ) -> BoxFuture<'a, Result<CommitStatusRecord>> {
        self.fetch_status(repo, hash).boxed()
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
