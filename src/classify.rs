//! DiffClassifier (§4.2): pairs each local commit with its remote state (if
//! any) and decides the action kind TreeSynth must perform.

use crate::model::{Action, LocalCommit, RemotePR};

/// Classify one stack entry.
///
/// `desired_base_tree` is the tree the entry's `base` branch *should* point
/// to right now: the previous entry's synthesized head tree, or the remote
/// default branch tip's tree for index 0. The caller supplies it because
/// TreeSynth must run bottom-to-top (§4.3) and only the caller knows the
/// previous entry's post-synthesis tree.
pub fn classify(
    index: usize,
    commit: LocalCommit,
    pr: Option<RemotePR>,
    desired_base_tree: &str,
    no_skip: bool,
) -> Action {
    let Some(pr) = pr else {
        return Action::CreateNew { index, commit };
    };

    let tree_changed = commit.tree != pr.orig_tree;
    let base_changed = desired_base_tree != pr.base_tree;

    match (tree_changed, base_changed) {
        (true, true) => Action::UpdateBoth { index, commit, pr },
        (true, false) => Action::UpdateHead { index, commit, pr },
        (false, true) => Action::UpdateBase { index, commit, pr },
        (false, false) => {
            if no_skip {
                Action::UpdateHead { index, commit, pr }
            } else {
                Action::Skip { index, commit, pr }
            }
        }
    }
}
