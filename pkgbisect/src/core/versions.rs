//! Parsing of the `<version> <hash>` listing produced by the repo-info script.

use indexmap::IndexMap;

use crate::core::types::RepoInfo;

/// Build a [`RepoInfo`] from listing output.
///
/// Each non-blank line is `<version> <hash>`; lines without both fields are
/// skipped. When a version appears more than once, the first hash wins.
pub fn parse_version_listing(repo_name: &str, listing: &str) -> RepoInfo {
    let mut versions = IndexMap::new();
    for line in listing.lines() {
        let mut fields = line.split_whitespace();
        let (Some(version), Some(hash)) = (fields.next(), fields.next()) else {
            continue;
        };
        versions
            .entry(version.to_string())
            .or_insert_with(|| hash.to_string());
    }
    RepoInfo {
        repo_name: repo_name.to_string(),
        versions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_hash_for_a_version_wins() {
        let info = parse_version_listing("a/b", "1.0.0 aaa\n1.1.0 bbb\n1.0.0 ccc\n");
        let pairs: Vec<(&str, &str)> = info
            .versions
            .iter()
            .map(|(v, h)| (v.as_str(), h.as_str()))
            .collect();
        assert_eq!(pairs, vec![("1.0.0", "aaa"), ("1.1.0", "bbb")]);
    }

    #[test]
    fn blank_and_malformed_lines_are_skipped() {
        let info = parse_version_listing("a/b", "\n  \nlonely\n2.0.0 ddd\n");
        assert_eq!(info.versions.len(), 1);
        assert_eq!(info.versions.get("2.0.0").map(String::as_str), Some("ddd"));
    }

    #[test]
    fn empty_listing_yields_no_versions() {
        let info = parse_version_listing("a/b", "");
        assert_eq!(info.repo_name, "a/b");
        assert!(info.versions.is_empty());
    }
}
