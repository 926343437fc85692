//! End-to-end scenario tests (spec.md §8, S1/S4/S5): a real temporary git
//! repository plus a real bare "remote" repository, driven through
//! `RealGitOps`/`SystemShell` exactly as `main.rs` would, against an
//! in-memory `FakeRemote` standing in for GitHub.
//!
//! Follows the teacher's `commands/common.rs` test harness shape: a
//! `CWD_LOCK` mutex serializes tests that mutate the process-wide current
//! directory, and a `DirGuard` restores it on drop.

#![cfg(test)]

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use tempfile::TempDir;

use crate::config::Config;
use crate::gitops::RealGitOps;
use crate::land;
use crate::remote::FakeRemote;
use crate::shell::SystemShell;
use crate::submit;

static CWD_LOCK: Mutex<()> = Mutex::new(());

struct DirGuard {
    original: std::path::PathBuf,
}

impl DirGuard {
    fn change_to(path: &Path) -> Self {
        let original = std::env::current_dir().expect("current dir available");
        std::env::set_current_dir(path).expect("set current dir to temp repo");
        DirGuard { original }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        std::env::set_current_dir(&self.original).expect("restore original current dir");
    }
}

fn git(repo: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .current_dir(repo)
        .args(args)
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed\nstdout:\n{}\nstderr:\n{}",
        args,
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).to_string()
}

/// A bare "origin" plus a clone-equivalent working repo with one commit on
/// `main`, already pushed, with `origin/HEAD` pointed at `main` so
/// `GitOps::default_branch` resolves without extra setup.
fn init_fixture() -> (TempDir, TempDir) {
    let origin_dir = tempfile::tempdir().expect("origin tempdir");
    git(origin_dir.path(), &["init", "--bare", "-b", "main"]);

    let work_dir = tempfile::tempdir().expect("work tempdir");
    let work = work_dir.path();
    git(work, &["init", "-b", "main"]);
    git(work, &["config", "user.email", "stackpr@example.com"]);
    git(work, &["config", "user.name", "Stackpr Tests"]);
    fs::write(work.join("file.txt"), "v0\n").expect("write fixture file");
    git(work, &["add", "."]);
    git(work, &["commit", "-m", "initial commit"]);
    git(work, &["remote", "add", "origin", origin_dir.path().to_str().expect("utf8 path")]);
    git(work, &["push", "-u", "origin", "main"]);
    git(work, &["remote", "set-head", "origin", "-a"]);

    (origin_dir, work_dir)
}

fn fixture_config() -> Config {
    Config {
        user: "alice".to_string(),
        github_url: "github.com".to_string(),
        remote_name: "origin".to_string(),
        repo_owner: "acme".to_string(),
        repo_name: "widgets".to_string(),
    }
}

#[test]
fn submit_opens_one_pr_per_commit_and_is_idempotent_on_resubmit() {
    let _lock = CWD_LOCK.lock().expect("lock cwd");
    let (_origin, work_dir) = init_fixture();
    let work = work_dir.path().to_path_buf();
    let _guard = DirGuard::change_to(&work);

    fs::write(work.join("file.txt"), "v1\n").expect("write v1");
    git(&work, &["commit", "-am", "Add feature A"]);
    fs::write(work.join("file.txt"), "v2\n").expect("write v2");
    git(&work, &["commit", "-am", "Add feature B"]);

    let gitops = RealGitOps::new(Box::new(SystemShell::new()));
    let remote = FakeRemote::new("main");
    let cfg = fixture_config();

    let metas = submit::submit(&gitops, &remote, &cfg, false, "Update", &submit::SubmitOptions::default())
        .expect("first submit");
    assert_eq!(metas.len(), 2);
    assert!(metas.iter().all(|m| !m.skipped));
    assert_ne!(metas[0].pr_number, metas[1].pr_number);

    let messages = git(&work, &["log", "--format=%B%x1e", "-n", "2"]);
    assert!(messages.contains("ghstack-source-id"));
    assert!(messages.contains("Pull Request resolved"));

    // Nothing local or remote changed since: a resubmit should touch nothing.
    let metas_again = submit::submit(&gitops, &remote, &cfg, false, "Update", &submit::SubmitOptions::default())
        .expect("idempotent resubmit");
    assert!(metas_again.iter().all(|m| m.skipped));
    assert_eq!(
        metas.iter().map(|m| m.pr_number).collect::<Vec<_>>(),
        metas_again.iter().map(|m| m.pr_number).collect::<Vec<_>>()
    );
}

#[test]
fn submit_refuses_when_a_tracked_head_drifted_since_last_read() {
    let _lock = CWD_LOCK.lock().expect("lock cwd");
    let (_origin, work_dir) = init_fixture();
    let work = work_dir.path().to_path_buf();
    let _guard = DirGuard::change_to(&work);

    fs::write(work.join("file.txt"), "v1\n").expect("write v1");
    git(&work, &["commit", "-am", "Add feature A"]);

    let gitops = RealGitOps::new(Box::new(SystemShell::new()));
    let remote = FakeRemote::new("main");
    let cfg = fixture_config();

    submit::submit(&gitops, &remote, &cfg, false, "Update", &submit::SubmitOptions::default())
        .expect("initial submit");

    // Simulate another writer amending the tracked head out from under us.
    git(&work, &["fetch", "origin", "gh/alice/1/head:refs/heads/drift"]);
    git(&work, &["checkout", "drift"]);
    fs::write(work.join("other.txt"), "x\n").expect("write other file");
    git(&work, &["add", "."]);
    git(&work, &["commit", "-m", "externally amended"]);
    git(&work, &["push", "origin", "drift:gh/alice/1/head"]);
    git(&work, &["checkout", "main"]);

    let err = submit::submit(&gitops, &remote, &cfg, false, "Update", &submit::SubmitOptions::default())
        .expect_err("drifted tracking head must be refused");
    assert!(err.to_string().contains("moved since this stack was last read"));
}

#[test]
fn land_fast_forwards_when_orig_chain_is_already_linear_on_upstream() {
    let _lock = CWD_LOCK.lock().expect("lock cwd");
    let (origin_dir, work_dir) = init_fixture();
    let work = work_dir.path().to_path_buf();
    let _guard = DirGuard::change_to(&work);

    fs::write(work.join("file.txt"), "v1\n").expect("write v1");
    git(&work, &["commit", "-am", "Add feature A"]);

    let gitops = RealGitOps::new(Box::new(SystemShell::new()));
    let remote = FakeRemote::new("main");
    let cfg = fixture_config();

    let metas = submit::submit(&gitops, &remote, &cfg, false, "Update", &submit::SubmitOptions::default())
        .expect("submit before landing");
    let pr_url = metas[0].pr_url.clone();

    let outcome =
        land::run_land(&gitops, &remote, &cfg, false, &pr_url).expect("land the single entry");
    assert!(matches!(outcome, land::LandOutcome::FastForward { .. }));

    let upstream_tip = git(origin_dir.path(), &["rev-parse", "main"]);
    let orig_tip = git(&work, &["rev-parse", "refs/remotes/origin/gh/alice/1/orig"]);
    assert_eq!(upstream_tip.trim(), orig_tip.trim());
}
