//! GitOps: a typed façade over git plumbing (§2), built on the `Shell`
//! abstraction so the core never shells out directly.

use anyhow::{anyhow, bail, Context, Result};

use crate::shell::Shell;

#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct RawCommit {
    pub oid: String,
    pub tree: String,
    pub parents: Vec<String>,
    pub message: String,
    pub author: Identity,
    pub committer: Identity,
}

/// One unit in the `%x1e`-delimited, `%x00`-separated log format StackParser
/// and GitOps both rely on. Kept wide (parents, tree, full identity) since
/// StackParser needs more fields than the teacher's grouping ever did.
const LOG_FORMAT: &str = "%H%x00%P%x00%T%x00%an%x00%ae%x00%aI%x00%cn%x00%ce%x00%cI%x00%B%x1e";

fn parse_log_chunk(chunk: &str) -> Option<RawCommit> {
    let chunk = chunk.trim_start_matches('\n');
    if chunk.trim().is_empty() {
        return None;
    }
    let mut parts = chunk.splitn(9, '\0');
    let oid = parts.next()?.to_string();
    let parents = parts
        .next()?
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let tree = parts.next()?.to_string();
    let an = parts.next()?.to_string();
    let ae = parts.next()?.to_string();
    let ad = parts.next()?.to_string();
    let cn = parts.next()?.to_string();
    let ce = parts.next()?.to_string();
    let rest = parts.next()?; // "cd\0message"
    let mut rest_parts = rest.splitn(2, '\0');
    let cd = rest_parts.next()?.to_string();
    let message = rest_parts.next().unwrap_or("").trim_end_matches('\n').to_string();
    Some(RawCommit {
        oid,
        tree,
        parents,
        message,
        author: Identity { name: an, email: ae, date: ad },
        committer: Identity { name: cn, email: ce, date: cd },
    })
}

pub trait GitOps {
    fn rev_parse(&self, rev: &str) -> Result<String>;
    fn merge_base(&self, a: &str, b: &str) -> Result<String>;
    fn log_range(&self, range: &str) -> Result<Vec<RawCommit>>;
    fn show_commit(&self, oid: &str) -> Result<RawCommit>;
    fn tree_of(&self, rev: &str) -> Result<String>;

    fn commit_tree(
        &self,
        dry: bool,
        tree: &str,
        parents: &[&str],
        message: &str,
        author: Option<&Identity>,
        committer: Option<&Identity>,
    ) -> Result<String>;

    fn update_ref(&self, dry: bool, refname: &str, oid: &str) -> Result<()>;
    fn fetch_refspecs(&self, dry: bool, remote: &str, refspecs: &[String]) -> Result<()>;
    fn push_atomic(&self, dry: bool, remote: &str, refspecs: &[String]) -> Result<()>;
    fn push_refspec(&self, dry: bool, remote: &str, refspec: &str) -> Result<()>;
    fn reset_hard(&self, dry: bool, target: &str) -> Result<()>;

    fn current_branch(&self) -> Result<Option<String>>;
    fn repo_root(&self) -> Result<Option<String>>;
    fn remote_owner_and_name(&self, remote: &str) -> Result<(String, String)>;
    fn default_branch(&self, remote: &str) -> Result<String>;
    /// Does `ancestor` reach `descendant` by following parents?
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool>;
    /// Short names (e.g. `gh/alice/3/head`) of every remote-tracking ref
    /// under `refs/remotes/<remote>/<prefix>`, used to find the highest
    /// stack index already assigned (§4.4 step 6).
    fn list_remote_tracking_refs_with_prefix(&self, remote: &str, prefix: &str) -> Result<Vec<String>>;
}

pub struct RealGitOps {
    shell: Box<dyn Shell>,
}

impl RealGitOps {
    pub fn new(shell: Box<dyn Shell>) -> Self {
        RealGitOps { shell }
    }
}

impl GitOps for RealGitOps {
    fn rev_parse(&self, rev: &str) -> Result<String> {
        Ok(self.shell.run("git", &["rev-parse", rev])?.trim().to_string())
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        Ok(self.shell.run("git", &["merge-base", a, b])?.trim().to_string())
    }

    fn log_range(&self, range: &str) -> Result<Vec<RawCommit>> {
        let out = self
            .shell
            .run("git", &["log", &format!("--format={LOG_FORMAT}"), "--reverse", range])?;
        Ok(out.split('\u{1e}').filter_map(parse_log_chunk).collect())
    }

    fn show_commit(&self, oid: &str) -> Result<RawCommit> {
        let out = self
            .shell
            .run("git", &["log", "-n", "1", &format!("--format={LOG_FORMAT}"), oid])?;
        out.split('\u{1e}')
            .find_map(parse_log_chunk)
            .ok_or_else(|| anyhow!("could not parse commit {oid}"))
    }

    fn tree_of(&self, rev: &str) -> Result<String> {
        self.rev_parse(&format!("{rev}^{{tree}}"))
    }

    fn commit_tree(
        &self,
        dry: bool,
        tree: &str,
        parents: &[&str],
        message: &str,
        author: Option<&Identity>,
        committer: Option<&Identity>,
    ) -> Result<String> {
        let mut args: Vec<String> = vec!["commit-tree".to_string(), tree.to_string()];
        for p in parents {
            args.push("-p".to_string());
            args.push((*p).to_string());
        }
        args.push("-m".to_string());
        args.push(message.to_string());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        if dry {
            tracing::info!("DRY-RUN: git {}", arg_refs.join(" "));
            return Ok(format!("dryrun-{:x}", md5_ish(message)));
        }

        // git commit-tree reads author/committer identity from the
        // environment; set it explicitly so synthesized commits never
        // silently take on the operator's own identity when rewriting the
        // user's own work (§4.3).
        let out = run_with_identity(self.shell.as_ref(), &arg_refs, author, committer)?;
        Ok(out.trim().to_string())
    }

    fn update_ref(&self, dry: bool, refname: &str, oid: &str) -> Result<()> {
        self.shell.run_rw(dry, "git", &["update-ref", refname, oid])?;
        Ok(())
    }

    fn fetch_refspecs(&self, dry: bool, remote: &str, refspecs: &[String]) -> Result<()> {
        let mut args: Vec<&str> = vec!["fetch", remote];
        args.extend(refspecs.iter().map(String::as_str));
        self.shell.run_rw(dry, "git", &args)?;
        Ok(())
    }

    fn push_atomic(&self, dry: bool, remote: &str, refspecs: &[String]) -> Result<()> {
        if refspecs.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&str> = vec!["push", "--atomic", remote];
        args.extend(refspecs.iter().map(String::as_str));
        self.shell
            .run_rw(dry, "git", &args)
            .with_context(|| "atomic push of tracking branches failed")?;
        Ok(())
    }

    fn push_refspec(&self, dry: bool, remote: &str, refspec: &str) -> Result<()> {
        self.shell.run_rw(dry, "git", &["push", remote, refspec])?;
        Ok(())
    }

    fn reset_hard(&self, dry: bool, target: &str) -> Result<()> {
        self.shell.run_rw(dry, "git", &["reset", "--hard", target])?;
        Ok(())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        match self.shell.run("git", &["symbolic-ref", "--quiet", "--short", "HEAD"]) {
            Ok(name) => Ok(Some(name.trim().to_string())),
            Err(_) => Ok(None),
        }
    }

    fn repo_root(&self) -> Result<Option<String>> {
        match self.shell.run("git", &["rev-parse", "--show-toplevel"]) {
            Ok(path) => Ok(Some(path.trim().to_string())),
            Err(_) => Ok(None),
        }
    }

    fn remote_owner_and_name(&self, remote: &str) -> Result<(String, String)> {
        let url = self
            .shell
            .run("git", &["config", "--get", &format!("remote.{remote}.url")])?
            .trim()
            .to_string();
        parse_owner_repo(&url)
    }

    fn default_branch(&self, remote: &str) -> Result<String> {
        let out = self
            .shell
            .run("git", &["symbolic-ref", "--short", &format!("refs/remotes/{remote}/HEAD")])
            .with_context(|| {
                format!("failed to discover the default branch from {remote}/HEAD; run `git remote set-head {remote} -a`")
            })?;
        let branch = out.trim();
        if branch.is_empty() {
            bail!("{remote}/HEAD resolved to an empty ref");
        }
        Ok(branch.to_string())
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        match self.shell.run("git", &["merge-base", "--is-ancestor", ancestor, descendant]) {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    fn list_remote_tracking_refs_with_prefix(&self, remote: &str, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("refs/remotes/{remote}/{prefix}");
        let out = self.shell.run(
            "git",
            &["for-each-ref", "--format=%(refname:short)", &pattern],
        )?;
        let strip = format!("{remote}/");
        Ok(out
            .lines()
            .filter_map(|l| l.strip_prefix(&strip).map(str::to_string))
            .collect())
    }
}

fn run_with_identity(
    shell: &dyn Shell,
    args: &[&str],
    author: Option<&Identity>,
    committer: Option<&Identity>,
) -> Result<String> {
    // `Shell` has no env-var hook, so identity is passed the same way git
    // itself reads it when invoked directly: via the process environment.
    // This keeps `Shell` a minimal trait (run/run_rw) while still letting
    // GitOps control commit identity precisely.
    if let Some(a) = author {
        std::env::set_var("GIT_AUTHOR_NAME", &a.name);
        std::env::set_var("GIT_AUTHOR_EMAIL", &a.email);
        std::env::set_var("GIT_AUTHOR_DATE", &a.date);
    }
    if let Some(c) = committer {
        std::env::set_var("GIT_COMMITTER_NAME", &c.name);
        std::env::set_var("GIT_COMMITTER_EMAIL", &c.email);
        std::env::set_var("GIT_COMMITTER_DATE", &c.date);
    }
    let result = shell.run("git", args);
    if author.is_some() {
        std::env::remove_var("GIT_AUTHOR_NAME");
        std::env::remove_var("GIT_AUTHOR_EMAIL");
        std::env::remove_var("GIT_AUTHOR_DATE");
    }
    if committer.is_some() {
        std::env::remove_var("GIT_COMMITTER_NAME");
        std::env::remove_var("GIT_COMMITTER_EMAIL");
        std::env::remove_var("GIT_COMMITTER_DATE");
    }
    result
}

fn md5_ish(s: &str) -> u64 {
    // Stable placeholder oid for dry-run synthesis output only; never
    // written anywhere real, just needs to be deterministic per message so
    // dry-run logs are reproducible.
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn parse_owner_repo(url: &str) -> Result<(String, String)> {
    let rest = if let Some(idx) = url.find("://") {
        &url[idx + 3..]
    } else if let Some(idx) = url.find(':') {
        &url[idx + 1..]
    } else {
        bail!("unrecognized remote URL: {url}");
    };
    let rest = rest.split_once('/').map(|(_, r)| r).unwrap_or(rest);
    let parts: Vec<&str> = rest.trim_end_matches('/').splitn(2, '/').collect();
    if parts.len() < 2 {
        bail!("could not parse owner/repo from remote URL: {url}");
    }
    let owner = parts[0].to_string();
    let name = parts[1].trim_end_matches(".git").to_string();
    Ok((owner, name))
}
