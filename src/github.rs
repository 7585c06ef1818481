//! GitHub repository references
//!
//! Parses pasted GitHub URLs into an `owner`/`name` pair for the repo intake
//! path, deduplicates against already-tracked repositories, and builds
//! pre-filled new-issue URLs for features.

use crate::db::Repository;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Max length of a GitHub owner or repository name we accept.
const MAX_SEGMENT_LEN: usize = 100;

/// A validated owner/name pair with its canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    /// Always `https://github.com/{owner}/{name}`, regardless of how the
    /// input was spelled.
    pub url: String,
}

/// Parse a pasted GitHub repository URL.
///
/// Accepts the URL with or without a scheme, with a `www.` prefix, with a
/// trailing slash, with extra path segments after the repository name, and
/// with a `.git` suffix on the name. Anything that is not recognizably a
/// GitHub repository returns `None`; there are no partial results.
pub fn parse_repo_url(input: &str) -> Option<RepoRef> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    // Scheme is optional: "github.com/acme/widgets" works as well as the
    // full https URL.
    let rest = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed,
    };

    let (host, path) = rest.split_once('/')?;

    // Host check: github.com or www.github.com, any case, optional port.
    let host = host.to_ascii_lowercase();
    let host = host.split(':').next().unwrap_or(&host);
    if host != "github.com" && host != "www.github.com" {
        return None;
    }

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let name = segments.next()?;
    let name = name.strip_suffix(".git").unwrap_or(name);

    if !is_valid_segment(owner) || !is_valid_segment(name) {
        return None;
    }

    Some(RepoRef {
        owner: owner.to_string(),
        name: name.to_string(),
        url: format!("https://github.com/{}/{}", owner, name),
    })
}

/// Owner/name validation: leading alphanumeric, then word chars, dots, and
/// hyphens, at most 100 characters total.
fn is_valid_segment(segment: &str) -> bool {
    if segment.is_empty() || segment.len() > MAX_SEGMENT_LEN {
        return false;
    }
    match Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$") {
        Ok(re) => re.is_match(segment),
        Err(_) => false,
    }
}

/// Case-insensitive duplicate lookup over tracked repositories.
pub fn find_existing<'a>(
    repositories: &'a [Repository],
    owner: &str,
    name: &str,
) -> Option<&'a Repository> {
    repositories
        .iter()
        .find(|r| r.owner.eq_ignore_ascii_case(owner) && r.name.eq_ignore_ascii_case(name))
}

/// Pre-filled new-issue URL for a repository.
pub fn new_issue_url(owner: &str, name: &str, title: &str, body: &str) -> String {
    let query =
        serde_urlencoded::to_string([("title", title), ("body", body)]).unwrap_or_default();
    format!("https://github.com/{}/{}/issues/new?{}", owner, name, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Repository;

    fn repo(owner: &str, name: &str) -> Repository {
        Repository {
            id: format!("{}-{}", owner, name),
            name: name.to_string(),
            owner: owner.to_string(),
            url: format!("https://github.com/{}/{}", owner, name),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_parse_plain_https_url() {
        let parsed = parse_repo_url("https://github.com/acme/widgets").unwrap();
        assert_eq!(parsed.owner, "acme");
        assert_eq!(parsed.name, "widgets");
        assert_eq!(parsed.url, "https://github.com/acme/widgets");
    }

    #[test]
    fn test_parse_without_scheme() {
        let parsed = parse_repo_url("github.com/acme/widgets/").unwrap();
        assert_eq!(parsed.owner, "acme");
        assert_eq!(parsed.name, "widgets");
    }

    #[test]
    fn test_parse_strips_git_suffix_and_extra_segments() {
        let parsed = parse_repo_url("https://www.github.com/acme/widgets.git/issues").unwrap();
        assert_eq!(parsed.owner, "acme");
        assert_eq!(parsed.name, "widgets");
        assert_eq!(parsed.url, "https://github.com/acme/widgets");
    }

    #[test]
    fn test_parse_host_is_case_insensitive_and_port_is_ignored() {
        assert!(parse_repo_url("HTTPS://GitHub.COM/acme/widgets").is_some());
        assert!(parse_repo_url("https://github.com:443/acme/widgets").is_some());
    }

    #[test]
    fn test_parse_rejects_other_hosts() {
        assert!(parse_repo_url("https://gitlab.com/acme/widgets").is_none());
        assert!(parse_repo_url("https://notgithub.com/acme/widgets").is_none());
    }

    #[test]
    fn test_parse_rejects_incomplete_paths() {
        assert!(parse_repo_url("https://github.com").is_none());
        assert!(parse_repo_url("https://github.com/acme").is_none());
        assert!(parse_repo_url("").is_none());
        assert!(parse_repo_url("   ").is_none());
    }

    #[test]
    fn test_parse_rejects_invalid_segments() {
        // Leading separator characters are not valid owner/name starts
        assert!(parse_repo_url("https://github.com/-acme/widgets").is_none());
        assert!(parse_repo_url("https://github.com/acme/.widgets").is_none());
        // Over the length cap
        let long = "a".repeat(101);
        assert!(parse_repo_url(&format!("https://github.com/{}/widgets", long)).is_none());
        // Exactly at the cap is fine
        let max = "a".repeat(100);
        assert!(parse_repo_url(&format!("https://github.com/{}/widgets", max)).is_some());
    }

    #[test]
    fn test_parse_accepts_dots_underscores_hyphens() {
        let parsed = parse_repo_url("github.com/my-org/some_repo.js").unwrap();
        assert_eq!(parsed.owner, "my-org");
        assert_eq!(parsed.name, "some_repo.js");
    }

    #[test]
    fn test_find_existing_is_case_insensitive() {
        let repos = vec![repo("Acme", "Widgets"), repo("other", "thing")];
        let found = find_existing(&repos, "acme", "widgets").unwrap();
        assert_eq!(found.owner, "Acme");
        assert!(find_existing(&repos, "acme", "gadgets").is_none());
    }

    #[test]
    fn test_new_issue_url_encodes_query() {
        let url = new_issue_url("acme", "widgets", "Dark mode", "Add a dark theme & toggle");
        assert!(url.starts_with("https://github.com/acme/widgets/issues/new?"));
        assert!(url.contains("title=Dark+mode"));
        assert!(url.contains("body=Add+a+dark+theme+%26+toggle"));
    }
}
