//! Unlinker (§4.6): strips the embedded `pr_id` trailers from every commit
//! in `default..HEAD` and rewrites `HEAD` to the result. No remote
//! interaction; a subsequent `submit` treats these commits as new.

use anyhow::Result;

use crate::config::Config;
use crate::gitops::{GitOps, Identity};
use crate::stack::parse_stack;
use crate::trailers;

/// Fetch the default branch and unlink against it — the entry point
/// `main.rs` calls, so callers never have to resolve `remote_default_ref`
/// themselves.
pub fn run_unlink(git: &dyn GitOps, cfg: &Config, dry: bool) -> Result<String> {
    let default_branch = git.default_branch(&cfg.remote_name)?;
    let default_ref = format!("{}/{}", cfg.remote_name, default_branch);
    let default_refspec =
        format!("+refs/heads/{b}:refs/remotes/{r}/{b}", b = default_branch, r = cfg.remote_name);
    git.fetch_refspecs(dry, &cfg.remote_name, &[default_refspec])?;
    unlink(git, dry, &default_ref)
}

pub fn unlink(git: &dyn GitOps, dry: bool, remote_default_ref: &str) -> Result<String> {
    let stack = parse_stack(git, remote_default_ref)?;
    let mut rolling_parent = git.merge_base("HEAD", remote_default_ref)?;

    for commit in &stack {
        let stripped = trailers::strip(&commit.message());
        let author = Identity {
            name: commit.author_name.clone(),
            email: commit.author_email.clone(),
            date: commit.author_date.clone(),
        };
        let committer = Identity {
            name: commit.committer_name.clone(),
            email: commit.committer_email.clone(),
            date: commit.committer_date.clone(),
        };
        rolling_parent = git.commit_tree(
            dry,
            &commit.tree,
            &[&rolling_parent],
            &stripped,
            Some(&author),
            Some(&committer),
        )?;
    }

    git.reset_hard(dry, &rolling_parent)?;
    Ok(rolling_parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitops::RawCommit;
    use std::cell::RefCell;

    struct FakeGitOps {
        commits: Vec<RawCommit>,
        reset_to: RefCell<Option<String>>,
    }

    impl GitOps for FakeGitOps {
        fn rev_parse(&self, _rev: &str) -> Result<String> {
            Ok("headoid".to_string())
        }
        fn merge_base(&self, _a: &str, _b: &str) -> Result<String> {
            Ok("base0".to_string())
        }
        fn log_range(&self, _range: &str) -> Result<Vec<RawCommit>> {
            Ok(self.commits.clone())
        }
        fn show_commit(&self, oid: &str) -> Result<RawCommit> {
            self.commits.iter().find(|c| c.oid == oid).cloned().ok_or_else(|| anyhow::anyhow!("missing"))
        }
        fn tree_of(&self, rev: &str) -> Result<String> {
            Ok(format!("tree-of-{rev}"))
        }
        fn commit_tree(
            &self,
            _dry: bool,
            tree: &str,
            parents: &[&str],
            message: &str,
            _author: Option<&Identity>,
            _committer: Option<&Identity>,
        ) -> Result<String> {
            assert!(!message.contains("ghstack-source-id"));
            Ok(format!("new-{tree}-{}", parents.join(",")))
        }
        fn update_ref(&self, _dry: bool, _refname: &str, _oid: &str) -> Result<()> {
            Ok(())
        }
        fn fetch_refspecs(&self, _dry: bool, _remote: &str, _refspecs: &[String]) -> Result<()> {
            Ok(())
        }
        fn push_atomic(&self, _dry: bool, _remote: &str, _refspecs: &[String]) -> Result<()> {
            Ok(())
        }
        fn push_refspec(&self, _dry: bool, _remote: &str, _refspec: &str) -> Result<()> {
            Ok(())
        }
        fn reset_hard(&self, _dry: bool, target: &str) -> Result<()> {
            *self.reset_to.borrow_mut() = Some(target.to_string());
            Ok(())
        }
        fn current_branch(&self) -> Result<Option<String>> {
            Ok(Some("feature".to_string()))
        }
        fn repo_root(&self) -> Result<Option<String>> {
            Ok(None)
        }
        fn remote_owner_and_name(&self, _remote: &str) -> Result<(String, String)> {
            Ok((String::new(), String::new()))
        }
        fn default_branch(&self, _remote: &str) -> Result<String> {
            Ok("main".to_string())
        }
        fn is_ancestor(&self, _ancestor: &str, _descendant: &str) -> Result<bool> {
            Ok(true)
        }
        fn list_remote_tracking_refs_with_prefix(&self, _remote: &str, _prefix: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[test]
    fn strips_trailers_and_resets_head_to_new_tip() {
        let id = trailers::PrId {
            source_id: "a".repeat(40),
            url: "https://github.com/acme/widgets/pull/500".to_string(),
        };
        let message = format!("Commit 1\n\nBody\n\n{}", id.render());
        let commit = RawCommit {
            oid: "c1".to_string(),
            tree: "t1".to_string(),
            parents: vec!["base0".to_string()],
            message,
            author: Identity::default(),
            committer: Identity::default(),
        };
        let git = FakeGitOps { commits: vec![commit], reset_to: RefCell::new(None) };
        let new_tip = unlink(&git, false, "origin/main").unwrap();
        assert_eq!(new_tip, "new-t1-base0");
        assert_eq!(git.reset_to.borrow().as_deref(), Some("new-t1-base0"));
    }
}
