//! Shared data types written to and read from the per-repository JSON files.
//!
//! Field names follow the on-disk format (`repoName`, `pkg`, ...), so these
//! types must stay stable across runs.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Repository identifier in `owner/name` form.
pub type RepoName = String;

/// The subset of `package.json` the tool cares about, plus everything else verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// A commit hash with the package manifest found at that revision, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub pkg: Option<Package>,
}

/// Result of running the test command at one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub hash: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// Version tag → commit hash listing for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    #[serde(rename = "repoName")]
    pub repo_name: RepoName,
    /// Insertion order is listing order; the first hash seen per version wins.
    pub versions: IndexMap<String, String>,
}

/// Recorded failure to list versions for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoError {
    #[serde(rename = "repoName")]
    pub repo_name: RepoName,
    pub err: String,
}

/// Either shape of `repoInfo.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepoInfoResult {
    Info(RepoInfo),
    Error(RepoError),
}

impl RepoInfoResult {
    pub fn repo_name(&self) -> &str {
        match self {
            RepoInfoResult::Info(info) => &info.repo_name,
            RepoInfoResult::Error(err) => &err.repo_name,
        }
    }

    pub fn info(&self) -> Option<&RepoInfo> {
        match self {
            RepoInfoResult::Info(info) => Some(info),
            RepoInfoResult::Error(_) => None,
        }
    }
}

/// One commit-status API response, as stored in `repoStatus.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitStatusRecord {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub data: Value,
}

/// Version → status response, in version listing order.
pub type RepoStatuses = IndexMap<String, CommitStatusRecord>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_keeps_unknown_fields() {
        let raw = r#"{"name":"left-pad","version":"1.3.0","license":"WTFPL"}"#;
        let pkg: Package = serde_json::from_str(raw).expect("parse");
        assert_eq!(pkg.version.as_deref(), Some("1.3.0"));
        assert_eq!(pkg.rest.get("license"), Some(&Value::from("WTFPL")));
    }

    #[test]
    fn repo_info_result_reads_both_shapes() {
        let info: RepoInfoResult =
            serde_json::from_str(r#"{"repoName":"a/b","versions":{"1.0.0":"abc"}}"#)
                .expect("info");
        assert_eq!(info.repo_name(), "a/b");
        assert!(info.info().is_some());

        let err: RepoInfoResult =
            serde_json::from_str(r#"{"repoName":"a/b","err":"docker failed"}"#).expect("err");
        assert_eq!(
            err,
            RepoInfoResult::Error(RepoError {
                repo_name: "a/b".to_string(),
                err: "docker failed".to_string(),
            })
        );
    }

    #[test]
    fn commit_without_manifest_serializes_null() {
        let commit = Commit {
            hash: "abc".to_string(),
            pkg: None,
        };
        assert_eq!(
            serde_json::to_string(&commit).expect("json"),
            r#"{"hash":"abc","pkg":null}"#
        );
    }
}
