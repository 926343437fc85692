//! TreeSynth (§4.3): builds the exact commit objects each non-Skip action
//! requires, without mutating any ref. Submitter performs all ref mutation
//! in one atomic push afterwards (§4.4 step 7).

use anyhow::Result;

use crate::gitops::{GitOps, Identity};
use crate::model::{Action, RemotePR, SynthesisResult, SynthesizedRef};
use crate::trailers::PrId;

/// The head tracking branch tip and tree of the previous stack entry, once
/// that entry's own synthesis has run. `None` for index 0, where the
/// "previous entry" is the remote default branch.
pub struct PrevHead {
    pub oid: String,
    pub tree: String,
}

/// Rewrite a commit's message while keeping its tree and author/committer
/// identity, used both to embed trailers (`CreateNew`'s `orig`) and to strip
/// them (Unlinker) — the one commit-tree shape the spec calls out as shared
/// (§4.6).
pub fn rebuild_message(
    git: &dyn GitOps,
    dry: bool,
    tree: &str,
    parents: &[&str],
    message: &str,
    author: &Identity,
    committer: &Identity,
) -> Result<String> {
    git.commit_tree(dry, tree, parents, message, Some(author), Some(committer))
}

fn bookkeeping_identity(user: &str) -> Identity {
    let now = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    Identity {
        name: user.to_string(),
        email: format!("{user}@users.noreply.github.com"),
        date: now,
    }
}

/// `CreateNew(i)`: the commit has never been submitted.
pub fn synthesize_create_new(
    git: &dyn GitOps,
    dry: bool,
    action: &Action,
    user: &str,
    prev_head: Option<&PrevHead>,
    default_branch_tip: &str,
    default_branch_tree: &str,
    pr_id: &PrId,
) -> Result<SynthesisResult> {
    let Action::CreateNew { index, commit } = action else {
        anyhow::bail!("synthesize_create_new called with a non-CreateNew action");
    };

    let (parent_ref, parent_tree) = match prev_head {
        Some(p) => (p.oid.as_str(), p.tree.as_str()),
        None => (default_branch_tip, default_branch_tree),
    };

    let bookkeeping = bookkeeping_identity(user);

    let base_0 = git.commit_tree(
        dry,
        parent_tree,
        &[parent_ref],
        &format!("Update base for {}", commit.title),
        Some(&bookkeeping),
        Some(&bookkeeping),
    )?;

    // The head tip also carries the source-id trailer (not just `orig`), so
    // the out-of-date check in §4.4 step 5 can read it straight off the
    // tracking ref it actually guards.
    let head_message = format!("{}\n\n{}", commit.title, pr_id.render());
    let head_0 = git.commit_tree(
        dry,
        &commit.tree,
        &[&base_0],
        &head_message,
        Some(&Identity {
            name: commit.author_name.clone(),
            email: commit.author_email.clone(),
            date: commit.author_date.clone(),
        }),
        Some(&Identity {
            name: commit.committer_name.clone(),
            email: commit.committer_email.clone(),
            date: commit.committer_date.clone(),
        }),
    )?;

    let orig_parent = commit.parents.first().map(String::as_str).unwrap_or(parent_ref);
    let orig_message = format!("{}\n\n{}", commit.message(), pr_id.render());
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
    let orig_0 = rebuild_message(git, dry, &commit.tree, &[orig_parent], &orig_message, &author, &committer)?;

    let prefix = RemotePR::branch_prefix(user, *index);
    Ok(SynthesisResult {
        index: *index,
        refs: vec![
            SynthesizedRef { refname: format!("{prefix}base"), oid: base_0.clone() },
            SynthesizedRef { refname: format!("{prefix}head"), oid: head_0.clone() },
            SynthesizedRef { refname: format!("{prefix}orig"), oid: orig_0.clone() },
        ],
        pr_title: commit.title.clone(),
        pr_body_base: commit.body.clone(),
        head_tree: commit.tree.clone(),
        orig_for_local: Some(orig_0),
    })
}

/// `UpdateHead(i)`: tree changed, base unchanged. `base_oid` is the base
/// tracking branch tip to reference as the new head's second parent — the
/// current one for a pure `UpdateHead`, or the freshly synthesized one when
/// called as the tail of `UpdateBase`/`UpdateBoth`.
fn synthesize_update_head(
    git: &dyn GitOps,
    dry: bool,
    user: &str,
    index: usize,
    pr: &RemotePR,
    local_tree: &str,
    base_oid: &str,
    reason: &str,
    pr_id: &PrId,
) -> Result<SynthesizedRef> {
    let message = format!("{reason} on \"{}\"\n\n{}", pr.title, pr_id.render());
    let head_new = git.commit_tree(dry, local_tree, &[&pr.head_oid, base_oid], &message, None, None)?;
    Ok(SynthesizedRef { refname: format!("{}head", RemotePR::branch_prefix(user, index)), oid: head_new })
}

/// `UpdateBase(i)`: base changed, tree unchanged. Composes a new `base`
/// commit from `prev_head`, then delegates to `UpdateHead`'s shape so the new
/// head embeds the new base.
fn synthesize_update_base(
    git: &dyn GitOps,
    dry: bool,
    user: &str,
    index: usize,
    pr: &RemotePR,
    prev_head: &PrevHead,
    reason: &str,
) -> Result<SynthesizedRef> {
    let message = format!("Update base for {reason} on \"{}\"", pr.title);
    let base_new = git.commit_tree(dry, &prev_head.tree, &[&pr.base_oid, &prev_head.oid], &message, None, None)?;
    let prefix = RemotePR::branch_prefix(user, index);
    Ok(SynthesizedRef { refname: format!("{prefix}base"), oid: base_new })
}

/// Dispatch synthesis for any non-`CreateNew` action, following the ordering
/// constraint in §4.3 (entries must be synthesized bottom-to-top, so
/// `prev_head` always reflects the already-synthesized previous entry when
/// one exists).
pub fn synthesize(
    git: &dyn GitOps,
    dry: bool,
    action: &Action,
    user: &str,
    prev_head: Option<&PrevHead>,
    default_branch_tip: &str,
    default_branch_tree: &str,
    reason: &str,
    pr_id: Option<&PrId>,
) -> Result<SynthesisResult> {
    match action {
        Action::CreateNew { .. } => {
            let pr_id = pr_id
                .ok_or_else(|| anyhow::anyhow!("CreateNew synthesis requires a freshly minted pr_id"))?;
            synthesize_create_new(git, dry, action, user, prev_head, default_branch_tip, default_branch_tree, pr_id)
        }
        Action::Skip { .. } => anyhow::bail!("Skip actions are never synthesized"),
        Action::UpdateHead { index, commit, pr } => {
            let pr_id = pr_id
                .ok_or_else(|| anyhow::anyhow!("UpdateHead synthesis requires the commit's existing pr_id"))?;
            let head_ref =
                synthesize_update_head(git, dry, user, *index, pr, &commit.tree, &pr.base_oid, reason, pr_id)?;
            Ok(SynthesisResult {
                index: *index,
                refs: vec![head_ref],
                pr_title: pr.title.clone(),
                pr_body_base: pr.body.clone(),
                head_tree: commit.tree.clone(),
                orig_for_local: None,
            })
        }
        Action::UpdateBase { index, commit, pr } => {
            let prev = prev_head.ok_or_else(|| {
                anyhow::anyhow!("UpdateBase at index {index} requires the previous entry's synthesized head")
            })?;
            let pr_id = pr_id
                .ok_or_else(|| anyhow::anyhow!("UpdateBase synthesis requires the commit's existing pr_id"))?;
            let base_ref = synthesize_update_base(git, dry, user, *index, pr, prev, reason)?;
            let head_ref =
                synthesize_update_head(git, dry, user, *index, pr, &commit.tree, &base_ref.oid, reason, pr_id)?;
            Ok(SynthesisResult {
                index: *index,
                refs: vec![base_ref, head_ref],
                pr_title: pr.title.clone(),
                pr_body_base: pr.body.clone(),
                head_tree: commit.tree.clone(),
                orig_for_local: None,
            })
        }
        Action::UpdateBoth { index, commit, pr } => {
            let prev = prev_head.ok_or_else(|| {
                anyhow::anyhow!("UpdateBoth at index {index} requires the previous entry's synthesized head")
            })?;
            let pr_id = pr_id
                .ok_or_else(|| anyhow::anyhow!("UpdateBoth synthesis requires the commit's existing pr_id"))?;
            let base_ref = synthesize_update_base(git, dry, user, *index, pr, prev, reason)?;
            let head_ref =
                synthesize_update_head(git, dry, user, *index, pr, &commit.tree, &base_ref.oid, reason, pr_id)?;
            Ok(SynthesisResult {
                index: *index,
                refs: vec![base_ref, head_ref],
                pr_title: pr.title.clone(),
                pr_body_base: pr.body.clone(),
                head_tree: commit.tree.clone(),
                orig_for_local: None,
            })
        }
    }
}
