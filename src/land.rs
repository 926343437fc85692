//! Lander (§4.5): ships one approved stack entry into the default branch,
//! fast-forwarding when the whole prefix below it is already linear on the
//! current upstream tip, rebuilding via `commit-tree` otherwise.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::error::Error;
use crate::gitops::GitOps;
use crate::model::RemotePR;
use crate::remote::{Remote, RemoteClient};
use crate::trailers;

/// One entry's tracking state as Lander needs it: the `orig` commit's oid
/// and tree, and the tree its `base` ref pointed to at the time `orig` was
/// authored (used for the three-way check before a rebuild `commit-tree`).
pub struct LandEntry {
    pub pr: RemotePR,
    pub orig_oid: String,
    pub orig_tree: String,
    pub base_tree_at_orig: String,
}

pub enum LandOutcome {
    FastForward { pushed_oids: Vec<String> },
    Rebuilt { pushed_oids: Vec<String> },
}

/// Land index `i`: entries `1..=i` of `stack`, bottom-first, ordered the
/// same way StackParser produces them.
pub fn land(
    git: &dyn GitOps,
    dry: bool,
    remote_name: &str,
    default_branch: &str,
    stack: &[LandEntry],
    target_index: usize,
) -> Result<LandOutcome> {
    if target_index == 0 || target_index > stack.len() {
        return Err(Error::Internal(format!(
            "land target index {target_index} is out of range for a {}-entry stack",
            stack.len()
        ))
        .into());
    }

    let prefix = &stack[..target_index];
    let default_ref = format!("{remote_name}/{default_branch}");
    let upstream_tip = git.rev_parse(&default_ref)?;
    let upstream_tree = git.tree_of(&default_ref)?;

    if fast_forward_possible(git, prefix, &upstream_tip)? {
        let orig_tip = prefix.last().expect("target_index > 0").orig_oid.clone();
        git.push_refspec(dry, remote_name, &format!("{orig_tip}:{default_branch}"))?;
        return Ok(LandOutcome::FastForward {
            pushed_oids: prefix.iter().map(|e| e.orig_oid.clone()).collect(),
        });
    }

    let mut rolling_parent = upstream_tip;
    let mut rolling_tree = upstream_tree;
    let mut pushed = Vec::with_capacity(prefix.len());
    for entry in prefix {
        if entry.base_tree_at_orig != rolling_tree {
            return Err(Error::LandConflict {
                number: entry.pr.number,
                commit: entry.orig_oid.clone(),
            }
            .into());
        }
        let raw = git.show_commit(&entry.orig_oid)?;
        let new_oid = git.commit_tree(
            dry,
            &entry.orig_tree,
            &[&rolling_parent],
            &raw.message,
            Some(&raw.author),
            Some(&raw.committer),
        )?;
        rolling_tree = entry.orig_tree.clone();
        rolling_parent = new_oid.clone();
        pushed.push(new_oid);
    }

    git.push_refspec(dry, remote_name, &format!("{rolling_parent}:{default_branch}"))?;
    Ok(LandOutcome::Rebuilt { pushed_oids: pushed })
}

/// Resolve a PR URL to its stack index, rebuild the `LandEntry` chain for
/// every index below and including it straight from the remote tracking
/// refs, and land it. The only `Remote` call this makes is the one needed
/// to recover the target's stack index from its head branch name; every
/// other entry is resolved purely from git, including each entry's own PR
/// number, read back off its `orig` commit's `pr_id` trailer.
pub fn run_land(git: &dyn GitOps, remote: &dyn Remote, cfg: &Config, dry: bool, pr_url: &str) -> Result<LandOutcome> {
    let default_branch = git.default_branch(&cfg.remote_name)?;
    let default_refspec =
        format!("+refs/heads/{b}:refs/remotes/{r}/{b}", b = default_branch, r = cfg.remote_name);
    let tracking_refspec = format!(
        "+refs/heads/gh/{u}/*/*:refs/remotes/{r}/gh/{u}/*/*",
        u = cfg.user,
        r = cfg.remote_name
    );
    git.fetch_refspecs(dry, &cfg.remote_name, &[default_refspec, tracking_refspec])?;

    let number = RemoteClient::resolve_pr_number_from_url(pr_url)?;
    let rc = RemoteClient::new(remote, &cfg.repo_owner, &cfg.repo_name);
    let records = rc.fetch_pr_records(&[number])?;
    let record = records
        .get(&number)
        .ok_or_else(|| Error::Internal(format!("PR #{number} not found on the remote")))?;
    let target_index = RemotePR::index_from_head_ref(&cfg.user, &record.head_ref_name).ok_or_else(|| {
        Error::Internal(format!("could not recover a stack index from head ref {:?}", record.head_ref_name))
    })?;

    let mut entries = Vec::with_capacity(target_index);
    for index in 1..=target_index {
        let head_branch = RemotePR::head_branch(&cfg.user, index);
        let base_branch = RemotePR::base_branch(&cfg.user, index);
        let orig_branch = RemotePR::orig_branch(&cfg.user, index);
        let head_tracking = format!("{}/{}", cfg.remote_name, head_branch);
        let base_tracking = format!("{}/{}", cfg.remote_name, base_branch);
        let orig_tracking = format!("{}/{}", cfg.remote_name, orig_branch);

        let orig_oid = git.rev_parse(&orig_tracking)?;
        let orig_tree = git.tree_of(&orig_tracking)?;
        let base_tree_at_orig = git.tree_of(&base_tracking)?;
        let head_oid = git.rev_parse(&head_tracking)?;
        let head_tree = git.tree_of(&head_tracking)?;
        let base_oid = git.rev_parse(&base_tracking)?;

        let orig_commit = git.show_commit(&orig_oid)?;
        let pr_id = trailers::parse(&orig_commit.message)?.ok_or_else(|| {
            Error::Internal(format!("orig commit for stack index {index} carries no pr_id trailer"))
        })?;
        let entry_number = pr_id.pr_number().unwrap_or(number);

        entries.push(LandEntry {
            pr: RemotePR {
                number: entry_number,
                index,
                title: String::new(),
                body: String::new(),
                head_ref: head_branch,
                base_ref: base_branch,
                orig_ref: orig_branch,
                head_oid,
                base_oid,
                orig_oid: orig_oid.clone(),
                head_tree,
                base_tree: base_tree_at_orig.clone(),
                orig_tree: orig_tree.clone(),
                head_source_id: Some(pr_id.source_id.clone()),
            },
            orig_oid,
            orig_tree,
            base_tree_at_orig,
        });
    }

    land(git, dry, &cfg.remote_name, &default_branch, &entries, target_index)
}

/// Fast-forward is possible iff the upstream tip equals the base of the
/// lowest entry being landed, and every entry's `orig` is already an
/// ancestor chain ending there — i.e. the `orig` chain for the whole prefix
/// is already linear on `U` (§4.5).
fn fast_forward_possible(git: &dyn GitOps, prefix: &[LandEntry], upstream_tip: &str) -> Result<bool> {
    let Some(first) = prefix.first() else {
        bail!("empty landing prefix");
    };
    if first.base_tree_at_orig != git.tree_of(upstream_tip)? {
        return Ok(false);
    }
    for entry in prefix {
        if !git.is_ancestor(upstream_tip, &entry.orig_oid)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitops::{Identity, RawCommit};
    use std::cell::RefCell;

    struct FakeGitOps {
        trees: RefCell<std::collections::HashMap<String, String>>,
        ancestors: RefCell<std::collections::HashSet<(String, String)>>,
        pushed: RefCell<Vec<String>>,
        commit_tree_calls: RefCell<u32>,
    }

    impl GitOps for FakeGitOps {
        fn rev_parse(&self, rev: &str) -> Result<String> {
            Ok(rev.to_string())
        }
        fn merge_base(&self, _a: &str, _b: &str) -> Result<String> {
            unimplemented!()
        }
        fn log_range(&self, _range: &str) -> Result<Vec<RawCommit>> {
            unimplemented!()
        }
        fn show_commit(&self, oid: &str) -> Result<RawCommit> {
            Ok(RawCommit {
                oid: oid.to_string(),
                tree: self.trees.borrow().get(oid).cloned().unwrap_or_default(),
                parents: vec![],
                message: format!("Commit for {oid}"),
                author: Identity::default(),
                committer: Identity::default(),
            })
        }
        fn tree_of(&self, rev: &str) -> Result<String> {
            Ok(self.trees.borrow().get(rev).cloned().unwrap_or_else(|| format!("tree-of-{rev}")))
        }
        fn commit_tree(
            &self,
            _dry: bool,
            tree: &str,
            parents: &[&str],
            _message: &str,
            _author: Option<&Identity>,
            _committer: Option<&Identity>,
        ) -> Result<String> {
            *self.commit_tree_calls.borrow_mut() += 1;
            Ok(format!("rebuilt-{tree}-{}", parents.join(",")))
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
        fn push_refspec(&self, _dry: bool, _remote: &str, refspec: &str) -> Result<()> {
            self.pushed.borrow_mut().push(refspec.to_string());
            Ok(())
        }
        fn reset_hard(&self, _dry: bool, _target: &str) -> Result<()> {
            Ok(())
        }
        fn current_branch(&self) -> Result<Option<String>> {
            Ok(Some("main".to_string()))
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
        fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
            Ok(self.ancestors.borrow().contains(&(ancestor.to_string(), descendant.to_string())))
        }
        fn list_remote_tracking_refs_with_prefix(&self, _remote: &str, _prefix: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn pr(number: u64, index: usize) -> RemotePR {
        RemotePR {
            number,
            index,
            title: "t".to_string(),
            body: String::new(),
            head_ref: format!("gh/u/{index}/head"),
            base_ref: format!("gh/u/{index}/base"),
            orig_ref: format!("gh/u/{index}/orig"),
            head_oid: "h".to_string(),
            base_oid: "b".to_string(),
            orig_oid: format!("orig{index}"),
            head_tree: "t".to_string(),
            base_tree: "t".to_string(),
            orig_tree: format!("tree{index}"),
            head_source_id: None,
        }
    }

    #[test]
    fn fast_forwards_when_orig_chain_already_linear_on_upstream() {
        let git = FakeGitOps {
            trees: RefCell::new(
                [("rINI0".to_string(), "tree0".to_string())].into_iter().collect(),
            ),
            ancestors: RefCell::new([("rINI0".to_string(), "orig1".to_string())].into_iter().collect()),
            pushed: RefCell::new(vec![]),
            commit_tree_calls: RefCell::new(0),
        };
        let stack = vec![LandEntry {
            pr: pr(500, 1),
            orig_oid: "orig1".to_string(),
            orig_tree: "tree1".to_string(),
            base_tree_at_orig: "tree0".to_string(),
        }];
        let outcome = land(&git, false, "origin", "rINI0", &stack, 1).unwrap();
        assert!(matches!(outcome, LandOutcome::FastForward { .. }));
        assert_eq!(*git.commit_tree_calls.borrow(), 0);
        assert_eq!(git.pushed.borrow()[0], "orig1:rINI0");
    }

    #[test]
    fn rebuilds_and_detects_conflict_on_stale_base() {
        let git = FakeGitOps {
            trees: RefCell::new(
                [("rINI0".to_string(), "tree0".to_string())].into_iter().collect(),
            ),
            ancestors: RefCell::new(std::collections::HashSet::new()),
            pushed: RefCell::new(vec![]),
            commit_tree_calls: RefCell::new(0),
        };
        let stack = vec![LandEntry {
            pr: pr(500, 1),
            orig_oid: "orig1".to_string(),
            orig_tree: "tree1".to_string(),
            base_tree_at_orig: "stale-tree".to_string(),
        }];
        let err = land(&git, false, "origin", "rINI0", &stack, 1).unwrap_err();
        assert!(err.to_string().contains("conflicts"));
    }
}
