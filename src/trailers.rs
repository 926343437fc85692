//! The commit message trailer pair that ties a local commit to a remote PR
//! (§6): `ghstack-source-id: <40-hex>` and `Pull Request resolved: <url>`.
//!
//! Both trailers must round-trip byte-exact across amends; only the URL is
//! used to resolve a PR, the hex id is a human diagnostic (§4.1).

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrId {
    pub source_id: String,
    pub url: String,
}

impl PrId {
    /// Render the trailer pair to append to a commit body.
    pub fn render(&self) -> String {
        format!(
            "ghstack-source-id: {}\nPull Request resolved: {}",
            self.source_id, self.url
        )
    }

    /// PR number parsed out of the trailing path segment of `url`.
    pub fn pr_number(&self) -> Option<u64> {
        self.url.rsplit('/').next()?.parse().ok()
    }
}

fn source_id_re() -> Regex {
    Regex::new(r"(?m)^ghstack-source-id:\s*([0-9a-fA-F]{40})\s*$").expect("valid regex")
}

fn resolved_url_re() -> Regex {
    Regex::new(r"(?m)^Pull Request resolved:\s*(\S+)\s*$").expect("valid regex")
}

/// Parse the `pr_id` trailer pair out of a full commit message, if present.
/// Returns `None` when neither trailer is present (the commit is "new").
///
/// # Errors
/// Returns an error when exactly one of the two trailers is present, or
/// when the source-id trailer is present but not well-formed 40-hex — a
/// half-written or hand-edited trailer pair should fail loudly rather than
/// silently behave like an untracked commit.
pub fn parse(message: &str) -> anyhow::Result<Option<PrId>> {
    let source = source_id_re().captures(message).map(|c| c[1].to_string());
    let url = resolved_url_re().captures(message).map(|c| c[1].to_string());
    match (source, url) {
        (Some(source_id), Some(url)) => Ok(Some(PrId { source_id, url })),
        (None, None) => Ok(None),
        (Some(_), None) => anyhow::bail!(
            "commit has a ghstack-source-id trailer but no matching \"Pull Request resolved:\" trailer"
        ),
        (None, Some(_)) => anyhow::bail!(
            "commit has a \"Pull Request resolved:\" trailer but no matching ghstack-source-id"
        ),
    }
}

/// Strip both trailers (and the blank line that separated them from the
/// rest of the body, if any) from a commit message, used by Unlinker.
pub fn strip(message: &str) -> String {
    let without_source = source_id_re().replace_all(message, "");
    let without_url = resolved_url_re().replace_all(&without_source, "");
    let mut out = String::new();
    let mut blank_run = 0usize;
    for line in without_url.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_end_matches('\n').to_string()
}

/// Generate a fresh, opaque 40-hex source id. Two v4 UUIDs provide more
/// than enough entropy; their hex digits are concatenated and truncated to
/// the 40 characters the wire format requires.
pub fn new_source_id() -> String {
    let a = uuid::Uuid::new_v4().simple().to_string();
    let b = uuid::Uuid::new_v4().simple().to_string();
    format!("{a}{b}")[..40].to_string()
}

pub fn pr_url(github_url: &str, owner: &str, repo: &str, number: u64) -> String {
    format!("https://{github_url}/{owner}/{repo}/pull/{number}")
}
