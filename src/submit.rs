//! Submitter (§4.4): orchestrates the whole pipeline for one `stackpr submit`
//! run — fetch, parse, classify, synthesize, push, update remote PR
//! metadata, then rewrite local `HEAD` onto the `orig` chain.
//!
//! Ordering follows the 9 steps in the spec exactly; each step is a small
//! helper below so the top-level `submit` reads as the pipeline itself.

use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::body;
use crate::classify;
use crate::config::Config;
use crate::error::Error;
use crate::gitops::{GitOps, Identity};
use crate::model::{Action, LocalCommit, RemotePR, SynthesisResult};
use crate::remote::{PrRecord, Remote, RemoteClient};
use crate::stack::parse_stack;
use crate::trailers::{self, PrId};
use crate::treesynth::{self, PrevHead};

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub message: Option<String>,
    pub update_fields: bool,
    pub short: bool,
    pub no_skip: bool,
}

#[derive(Debug, Clone)]
pub struct DiffMeta {
    pub index: usize,
    pub pr_number: u64,
    pub pr_url: String,
    pub head_oid: String,
    pub skipped: bool,
}

/// Everything the later pipeline steps need about one stack entry, collected
/// during the bottom-to-top synthesis pass (step 6) so steps 7-9 never have
/// to re-derive it.
struct Entry {
    index: usize,
    commit: LocalCommit,
    pr_id: PrId,
    pr_number: u64,
    remote_title: String,
    remote_body: String,
    head_oid_after: String,
    synth: Option<SynthesisResult>,
}

pub fn submit(
    git: &dyn GitOps,
    remote: &dyn Remote,
    cfg: &Config,
    dry: bool,
    reason: &str,
    opts: &SubmitOptions,
) -> Result<Vec<DiffMeta>> {
    // Step 1: fetch the default branch and every tracking ref in one call.
    let default_branch = git.default_branch(&cfg.remote_name)?;
    let default_ref = format!("{}/{}", cfg.remote_name, default_branch);
    let default_refspec =
        format!("+refs/heads/{b}:refs/remotes/{r}/{b}", b = default_branch, r = cfg.remote_name);
    let tracking_refspec = format!(
        "+refs/heads/gh/{u}/*/*:refs/remotes/{r}/gh/{u}/*/*",
        u = cfg.user,
        r = cfg.remote_name
    );
    git.fetch_refspecs(dry, &cfg.remote_name, &[default_refspec, tracking_refspec])?;

    // Step 2: parse the local stack.
    let commits = parse_stack(git, &default_ref)?;

    // Step 3: batch-load remote state for every commit that already has a pr_id.
    let numbers: Vec<u64> = commits
        .iter()
        .filter_map(|c| c.pr_id.as_ref().and_then(PrId::pr_number))
        .collect();
    let rc = RemoteClient::new(remote, &cfg.repo_owner, &cfg.repo_name);
    let records = rc.fetch_pr_records(&numbers)?;

    let mut resolved_prs: Vec<Option<RemotePR>> = Vec::with_capacity(commits.len());
    for c in &commits {
        match &c.pr_id {
            None => resolved_prs.push(None),
            Some(pid) => {
                let number = pid
                    .pr_number()
                    .ok_or_else(|| Error::Internal(format!("malformed PR url: {}", pid.url)))?;
                let record = records.get(&number).cloned().unwrap_or_default();
                resolved_prs.push(Some(resolve_remote_pr(git, &cfg.remote_name, &cfg.user, &record)?));
            }
        }
    }

    // Step 5 (checked ahead of any mutation, per the ordering guarantee in
    // §5: a reader sees either the pre-submit or post-submit state, never a
    // half-advanced one caused by a race this check should have caught).
    for (commit, pr) in commits.iter().zip(resolved_prs.iter()) {
        if let (Some(pid), Some(pr)) = (&commit.pr_id, pr) {
            let found = pr.head_source_id.clone().unwrap_or_default();
            if found != pid.source_id {
                return Err(Error::OutOfDate {
                    branch: pr.head_ref.clone(),
                    expected: pid.source_id.clone(),
                    found,
                }
                .into());
            }
        }
    }

    let default_branch_tip = git.rev_parse(&default_ref)?;
    let default_branch_tree = git.tree_of(&default_ref)?;

    // §4.4 step 6: the first CreateNew gets index N+1, where N is the
    // highest stack index already assigned anywhere in the repository (not
    // just among commits in this stack), so indices are never reused.
    let existing = git.list_remote_tracking_refs_with_prefix(&cfg.remote_name, &format!("gh/{}/*/*", cfg.user))?;
    let mut next_new_index = existing
        .iter()
        .filter_map(|r| index_from_any_ref(&cfg.user, r))
        .max()
        .unwrap_or(0)
        + 1;

    let mut prev_head: Option<PrevHead> = None;
    let mut entries: Vec<Entry> = Vec::with_capacity(commits.len());

    for (mut commit, pr) in commits.into_iter().zip(resolved_prs.into_iter()) {
        let desired_base_tree = prev_head
            .as_ref()
            .map(|p| p.tree.clone())
            .unwrap_or_else(|| default_branch_tree.clone());

        let index = pr.as_ref().map(|p| p.index).unwrap_or_else(|| {
            let i = next_new_index;
            next_new_index += 1;
            i
        });

        if let Some(msg) = &opts.message {
            if pr.is_none() && commit.body.trim().is_empty() {
                commit.body = msg.clone();
            }
        }

        let action = classify::classify(index, commit.clone(), pr.clone(), &desired_base_tree, opts.no_skip);

        if matches!(action, Action::Skip { .. }) {
            let pr = pr.expect("Skip always pairs with an existing remote PR");
            prev_head = Some(PrevHead { oid: pr.head_oid.clone(), tree: pr.head_tree.clone() });
            let pr_id = commit.pr_id.clone().expect("Skip implies an already-tracked commit");
            entries.push(Entry {
                index,
                pr_id,
                pr_number: pr.number,
                remote_title: pr.title,
                remote_body: pr.body,
                head_oid_after: pr.head_oid,
                synth: None,
                commit,
            });
            continue;
        }

        if matches!(action, Action::CreateNew { .. }) {
            let head_branch = RemotePR::head_branch(&cfg.user, index);
            let base_branch = RemotePR::base_branch(&cfg.user, index);
            let number = rc.open_pr(&head_branch, &base_branch, &commit.title, &commit.body)?;
            let pr_id = PrId {
                source_id: trailers::new_source_id(),
                url: trailers::pr_url(&cfg.github_url, &cfg.repo_owner, &cfg.repo_name, number),
            };
            let result = treesynth::synthesize(
                git,
                dry,
                &action,
                &cfg.user,
                prev_head.as_ref(),
                &default_branch_tip,
                &default_branch_tree,
                reason,
                Some(&pr_id),
            )?;
            let head_oid_after = result.refs[1].oid.clone();
            prev_head = Some(PrevHead { oid: head_oid_after.clone(), tree: result.head_tree.clone() });
            entries.push(Entry {
                index,
                pr_id,
                pr_number: number,
                remote_title: commit.title.clone(),
                remote_body: commit.body.clone(),
                head_oid_after,
                synth: Some(result),
                commit,
            });
            continue;
        }

        // UpdateHead / UpdateBase / UpdateBoth.
        let pr = pr.expect("non-Create actions always carry an existing remote PR");
        let pr_id = commit.pr_id.clone().expect("update actions act on an already-tracked commit");
        let result = treesynth::synthesize(
            git,
            dry,
            &action,
            &cfg.user,
            prev_head.as_ref(),
            &default_branch_tip,
            &default_branch_tree,
            reason,
            Some(&pr_id),
        )?;
        let head_oid_after = result
            .refs
            .last()
            .expect("UpdateHead/UpdateBase/UpdateBoth always synthesize at least a head")
            .oid
            .clone();
        prev_head = Some(PrevHead { oid: head_oid_after.clone(), tree: result.head_tree.clone() });
        entries.push(Entry {
            index,
            pr_id,
            pr_number: pr.number,
            remote_title: pr.title,
            remote_body: pr.body,
            head_oid_after,
            synth: Some(result),
            commit,
        });
    }

    // Step 7: one atomic push. Either every changed ref advances or none do.
    let mut refspecs: Vec<String> = Vec::new();
    for e in &entries {
        if let Some(synth) = &e.synth {
            for r in &synth.refs {
                refspecs.push(format!("{}:refs/heads/{}", r.oid, r.refname));
            }
        }
    }
    git.push_atomic(dry, &cfg.remote_name, &refspecs)?;

    // Step 8: PR metadata, bottom-to-top, idempotent on normalized content.
    let siblings: Vec<u64> = entries.iter().map(|e| e.pr_number).collect();
    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} updating PR descriptions {pos}/{len}…")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    for e in &entries {
        pb.inc(1);
        let stack_prefix = body::render_stack_block(&siblings, e.pr_number);
        let diff_revision = extract_differential_revision(&e.remote_body);

        let new_title = if opts.update_fields { e.commit.title.clone() } else { e.remote_title.clone() };

        let new_body = if opts.update_fields {
            let mut b = e.commit.body.clone();
            if let Some(dr) = &diff_revision {
                if !b.contains("Differential Revision:") {
                    if !b.trim().is_empty() {
                        b.push_str("\n\n");
                    }
                    b.push_str(dr);
                }
            }
            body::replace_stack_prefix(&b, &stack_prefix)
        } else {
            body::replace_stack_prefix(&e.remote_body, &stack_prefix)
        };

        let title_changed = new_title != e.remote_title;
        let body_changed = body::normalize_for_comparison(&new_body) != body::normalize_for_comparison(&e.remote_body);

        if title_changed || body_changed {
            rc.patch_pr_fields(
                e.pr_number,
                if title_changed { Some(&new_title) } else { None },
                if body_changed { Some(&new_body) } else { None },
            )?;
        }
    }
    pb.finish_and_clear();

    // Step 9: rewrite HEAD onto the orig chain. Every entry is rebuilt (even
    // Skip ones) since an earlier entry's orig oid may have changed and a
    // later commit's parent must point at the current chain, not the stale
    // local one; commit-tree is content-addressed so an entry whose parent,
    // tree and message are all unchanged reproduces its original oid.
    let mut rolling_parent = git.merge_base("HEAD", &default_ref)?;
    for e in &entries {
        let message = format!("{}\n\n{}", e.commit.message(), e.pr_id.render());
        let author = Identity {
            name: e.commit.author_name.clone(),
            email: e.commit.author_email.clone(),
            date: e.commit.author_date.clone(),
        };
        let committer = Identity {
            name: e.commit.committer_name.clone(),
            email: e.commit.committer_email.clone(),
            date: e.commit.committer_date.clone(),
        };
        rolling_parent =
            treesynth::rebuild_message(git, dry, &e.commit.tree, &[&rolling_parent], &message, &author, &committer)?;
    }
    git.reset_hard(dry, &rolling_parent)?;

    Ok(entries
        .iter()
        .map(|e| DiffMeta {
            index: e.index,
            pr_number: e.pr_number,
            pr_url: e.pr_id.url.clone(),
            head_oid: e.head_oid_after.clone(),
            skipped: e.synth.is_none(),
        })
        .collect())
}

fn index_from_any_ref(user: &str, short_ref: &str) -> Option<usize> {
    let rest = short_ref.strip_prefix(&format!("gh/{user}/"))?;
    rest.split('/').next()?.parse().ok()
}

fn resolve_remote_pr(git: &dyn GitOps, remote_name: &str, user: &str, record: &PrRecord) -> Result<RemotePR> {
    let index = RemotePR::index_from_head_ref(user, &record.head_ref_name).ok_or_else(|| {
        Error::Internal(format!(
            "could not recover a stack index from head ref {:?} for PR #{}",
            record.head_ref_name, record.number
        ))
    })?;
    let head_branch = RemotePR::head_branch(user, index);
    let base_branch = RemotePR::base_branch(user, index);
    let orig_branch = RemotePR::orig_branch(user, index);

    let head_tracking = format!("{remote_name}/{head_branch}");
    let base_tracking = format!("{remote_name}/{base_branch}");
    let orig_tracking = format!("{remote_name}/{orig_branch}");

    let head_oid = git.rev_parse(&head_tracking)?;
    let base_oid = git.rev_parse(&base_tracking)?;
    let orig_oid = git.rev_parse(&orig_tracking)?;
    let head_tree = git.tree_of(&head_tracking)?;
    let base_tree = git.tree_of(&base_tracking)?;
    let orig_tree = git.tree_of(&orig_tracking)?;

    let head_commit = git.show_commit(&head_oid)?;
    let head_source_id = trailers::parse(&head_commit.message)?.map(|p| p.source_id);

    Ok(RemotePR {
        number: record.number,
        index,
        title: record.title.clone(),
        body: record.body.clone(),
        head_ref: head_branch,
        base_ref: base_branch,
        orig_ref: orig_branch,
        head_oid,
        base_oid,
        orig_oid,
        head_tree,
        base_tree,
        orig_tree,
        head_source_id,
    })
}

fn extract_differential_revision(body: &str) -> Option<String> {
    body.lines()
        .find(|l| l.trim_start().starts_with("Differential Revision:"))
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_from_any_ref_reads_either_suffix() {
        assert_eq!(index_from_any_ref("alice", "gh/alice/4/head"), Some(4));
        assert_eq!(index_from_any_ref("alice", "gh/alice/4/base"), Some(4));
        assert_eq!(index_from_any_ref("bob", "gh/alice/4/head"), None);
    }

    #[test]
    fn extract_differential_revision_finds_trailer_line() {
        let body = "Some body.\n\nDifferential Revision: D12345\n";
        assert_eq!(extract_differential_revision(body).as_deref(), Some("Differential Revision: D12345"));
        assert_eq!(extract_differential_revision("no trailer here"), None);
    }
}
