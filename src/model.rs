//! The data model from §3: `LocalCommit`, `RemotePR`, `TrackingTriple`, and
//! `StackState`, plus `Action`, the DiffClassifier's output (§4.2).

use crate::trailers::PrId;

/// One commit in `default..HEAD`, oldest ancestor first within a `StackState`.
#[derive(Debug, Clone)]
pub struct LocalCommit {
    pub oid: String,
    pub tree: String,
    pub parents: Vec<String>,
    pub title: String,
    pub body: String,
    pub pr_id: Option<PrId>,
    pub author_name: String,
    pub author_email: String,
    pub author_date: String,
    pub committer_name: String,
    pub committer_email: String,
    pub committer_date: String,
}

impl LocalCommit {
    /// The full commit message (title + blank line + body) before any
    /// trailer rewriting.
    pub fn message(&self) -> String {
        if self.body.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.body)
        }
    }
}

/// Current remote state of a PR, as read from the tracking refs and the
/// platform API.
#[derive(Debug, Clone)]
pub struct RemotePR {
    pub number: u64,
    pub index: usize,
    pub title: String,
    pub body: String,
    pub head_ref: String,
    pub base_ref: String,
    pub orig_ref: String,
    pub head_oid: String,
    pub base_oid: String,
    pub orig_oid: String,
    pub head_tree: String,
    pub base_tree: String,
    pub orig_tree: String,
    /// The `ghstack-source-id` trailer found on the tip of `head_ref`, used
    /// by the out-of-date check in §4.4 step 5.
    pub head_source_id: Option<String>,
}

impl RemotePR {
    pub fn branch_prefix(user: &str, index: usize) -> String {
        format!("gh/{user}/{index}/")
    }

    /// Recover the stack index `N` from a `gh/<user>/<N>/head` branch name —
    /// how a resubmit finds its tracking triple again, since the commit
    /// trailer only carries the PR's URL, not its tracking index (§4.1).
    pub fn index_from_head_ref(user: &str, head_ref: &str) -> Option<usize> {
        let rest = head_ref.strip_prefix(&format!("gh/{user}/"))?;
        rest.strip_suffix("/head")?.parse().ok()
    }

    pub fn head_branch(user: &str, index: usize) -> String {
        format!("{}head", Self::branch_prefix(user, index))
    }

    pub fn base_branch(user: &str, index: usize) -> String {
        format!("{}base", Self::branch_prefix(user, index))
    }

    pub fn orig_branch(user: &str, index: usize) -> String {
        format!("{}orig", Self::branch_prefix(user, index))
    }
}

/// The `(base, head, orig)` invariant triple for one stack entry (§3).
#[derive(Debug, Clone)]
pub struct TrackingTriple {
    pub base: String,
    pub head: String,
    pub orig: String,
}

/// The full ordered stack, bottom-first, each entry paired with its remote
/// PR if one already exists.
pub type StackState = Vec<(LocalCommit, Option<RemotePR>)>;

/// The DiffClassifier's verdict for one stack entry (§4.2).
#[derive(Debug, Clone)]
pub enum Action {
    /// The commit has never been submitted.
    CreateNew { index: usize, commit: LocalCommit },
    /// Already up to date; nothing to do.
    Skip { index: usize, commit: LocalCommit, pr: RemotePR },
    /// Tree changed, base unchanged.
    UpdateHead { index: usize, commit: LocalCommit, pr: RemotePR },
    /// Base changed, tree unchanged.
    UpdateBase { index: usize, commit: LocalCommit, pr: RemotePR },
    /// Both changed.
    UpdateBoth { index: usize, commit: LocalCommit, pr: RemotePR },
}

impl Action {
    pub fn index(&self) -> usize {
        match self {
            Action::CreateNew { index, .. }
            | Action::Skip { index, .. }
            | Action::UpdateHead { index, .. }
            | Action::UpdateBase { index, .. }
            | Action::UpdateBoth { index, .. } => *index,
        }
    }

    pub fn commit(&self) -> &LocalCommit {
        match self {
            Action::CreateNew { commit, .. }
            | Action::Skip { commit, .. }
            | Action::UpdateHead { commit, .. }
            | Action::UpdateBase { commit, .. }
            | Action::UpdateBoth { commit, .. } => commit,
        }
    }

    pub fn pr(&self) -> Option<&RemotePR> {
        match self {
            Action::CreateNew { .. } => None,
            Action::Skip { pr, .. }
            | Action::UpdateHead { pr, .. }
            | Action::UpdateBase { pr, .. }
            | Action::UpdateBoth { pr, .. } => Some(pr),
        }
    }
}

/// One synthesized commit, plus the tracking ref it should be pushed to.
#[derive(Debug, Clone)]
pub struct SynthesizedRef {
    pub refname: String,
    pub oid: String,
}

/// Everything TreeSynth produces for one stack entry: the new tip of each
/// tracking ref that changed, the PR metadata to apply, and (for
/// `CreateNew`) the rewritten `orig` that replaces the user's local commit.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub index: usize,
    pub refs: Vec<SynthesizedRef>,
    pub pr_title: String,
    pub pr_body_base: String,
    pub head_tree: String,
    /// Present only for `CreateNew`; the commit that becomes the stand-in
    /// for the user's local commit once rewritten with trailers.
    pub orig_for_local: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_from_head_ref_round_trips_branch_prefix() {
        let head = RemotePR::head_branch("alice", 3);
        assert_eq!(RemotePR::index_from_head_ref("alice", &head), Some(3));
    }

    #[test]
    fn index_from_head_ref_rejects_other_users() {
        let head = RemotePR::head_branch("alice", 3);
        assert_eq!(RemotePR::index_from_head_ref("bob", &head), None);
    }
}
