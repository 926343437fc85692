//! StackParser (§4.1): walks `default..HEAD`, validates the range is linear,
//! and yields the ordered `LocalCommit` list callers classify.

use anyhow::Result;

use crate::error::Error;
use crate::gitops::GitOps;
use crate::model::LocalCommit;
use crate::trailers;

fn split_title_body(message: &str) -> (String, String) {
    match message.split_once("\n\n") {
        Some((title, body)) => (title.trim_end().to_string(), body.to_string()),
        None => (message.trim_end().to_string(), String::new()),
    }
}

/// Parse `default..HEAD` into an ordered, bottom-first `LocalCommit` list.
///
/// `remote_default_ref` is the already-resolved `<remote>/<default-branch>`
/// ref (e.g. `origin/main`); StackParser itself never decides what the
/// default branch is, that's `GitOps::default_branch` plus the config's
/// `remote_name`.
pub fn parse_stack(git: &dyn GitOps, remote_default_ref: &str) -> Result<Vec<LocalCommit>> {
    match git.current_branch()? {
        Some(_) => {}
        None => {
            let head = git.rev_parse("HEAD").unwrap_or_else(|_| "HEAD".to_string());
            return Err(Error::NotOnBranch(head[..head.len().min(12)].to_string()).into());
        }
    }

    let head = git.rev_parse("HEAD")?;
    let base = git.merge_base("HEAD", remote_default_ref)?;

    if base == head {
        return Err(Error::EmptyStack { base, head }.into());
    }

    let range = format!("{base}..{head}");
    let commits = git.log_range(&range)?;
    if commits.is_empty() {
        return Err(Error::EmptyStack { base, head }.into());
    }

    let mut out = Vec::with_capacity(commits.len());
    for raw in commits {
        if raw.parents.len() > 1 {
            return Err(Error::NonLinearStack(raw.oid).into());
        }
        let pr_id = trailers::parse(&raw.message)?;
        let (title, body) = split_title_body(&trailers::strip(&raw.message));
        out.push(LocalCommit {
            oid: raw.oid,
            tree: raw.tree,
            parents: raw.parents,
            title,
            body,
            pr_id,
            author_name: raw.author.name,
            author_email: raw.author.email,
            author_date: raw.author.date,
            committer_name: raw.committer.name,
            committer_email: raw.committer.email,
            committer_date: raw.committer.date,
        });
    }
    Ok(out)
}
