//! RemoteClient (§2): typed operations over the remote review platform, built
//! on top of the plain `Remote` transport trait (§6) so the core never
//! depends on a concrete HTTP/GraphQL library. `GhRemoteClient` drives GitHub
//! through the `gh` CLI's `api graphql` and `api <path>` subcommands, the
//! same transport the teacher uses for every GitHub call.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

use crate::shell::Shell;

/// The plain collaborator interface named in §6: a thing that can execute a
/// GraphQL document or a REST verb against the platform and hand back JSON.
pub trait Remote {
    fn graphql(&self, query: &str, vars: &[(&str, &str)]) -> Result<Value>;
    fn get(&self, path: &str) -> Result<Value>;
    fn post(&self, path: &str, body: &Value) -> Result<Value>;
    fn patch(&self, path: &str, body: &Value) -> Result<Value>;
}

pub struct GhRemoteClient {
    shell: Box<dyn Shell>,
}

impl GhRemoteClient {
    pub fn new(shell: Box<dyn Shell>) -> Self {
        GhRemoteClient { shell }
    }
}

/// `gh api` accepts typed request fields as repeated `-f key=value` (string)
/// or `-F key=value` (raw/typed, used for numbers and booleans so gh doesn't
/// quote them). A JSON object's top-level scalar fields map onto this
/// one-for-one, which is all RemoteClient ever needs to send.
fn json_to_gh_fields(body: &Value) -> Result<Vec<String>> {
    let obj = body
        .as_object()
        .ok_or_else(|| anyhow!("post/patch body must be a JSON object"))?;
    let mut args = Vec::new();
    for (k, v) in obj {
        match v {
            Value::String(s) => {
                args.push("-f".to_string());
                args.push(format!("{k}={s}"));
            }
            Value::Null => {}
            other => {
                args.push("-F".to_string());
                args.push(format!("{k}={other}"));
            }
        }
    }
    Ok(args)
}

impl Remote for GhRemoteClient {
    fn graphql(&self, query: &str, vars: &[(&str, &str)]) -> Result<Value> {
        let mut args: Vec<String> = vec![
            "api".to_string(),
            "graphql".to_string(),
            "-f".to_string(),
            format!("query={query}"),
        ];
        for (k, v) in vars {
            args.push("-F".to_string());
            args.push(format!("{k}={v}"));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.shell.run("gh", &arg_refs)?;
        let v: Value = serde_json::from_str(&out)?;
        if let Some(errors) = v.get("errors") {
            bail!("GraphQL request returned errors: {errors}");
        }
        Ok(v)
    }

    fn get(&self, path: &str) -> Result<Value> {
        let out = self.shell.run("gh", &["api", path])?;
        Ok(serde_json::from_str(&out)?)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let mut args: Vec<String> = vec!["api".to_string(), path.to_string(), "-X".to_string(), "POST".to_string()];
        args.extend(json_to_gh_fields(body)?);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.shell.run("gh", &arg_refs)?;
        if out.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&out)?)
    }

    fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        let mut args: Vec<String> = vec!["api".to_string(), path.to_string(), "-X".to_string(), "PATCH".to_string()];
        args.extend(json_to_gh_fields(body)?);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.shell.run("gh", &arg_refs)?;
        if out.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&out)?)
    }
}

/// Metadata about a single remote PR as needed to resolve `RemotePR` (§3).
#[derive(Debug, Clone, Default)]
pub struct PrRecord {
    pub number: u64,
    pub node_id: String,
    pub title: String,
    pub body: String,
    pub base_ref_name: String,
    /// The PR's head branch name as the platform knows it — `gh/<user>/<N>/head`
    /// for anything this tool created. This is how a resubmit recovers the
    /// stack index `N` for a commit whose trailer only carries the PR's URL.
    pub head_ref_name: String,
}

/// The typed operations named in §2: open PR, patch PR fields, resolve PR
/// number from URL. Everything here is built on `Remote` so it can be
/// exercised against `FakeRemote` without a network. The default branch is
/// queried from git itself (`GitOps::default_branch`, via `<remote>/HEAD`),
/// not from the platform API.
pub struct RemoteClient<'a> {
    remote: &'a dyn Remote,
    owner: String,
    repo: String,
}

impl<'a> RemoteClient<'a> {
    pub fn new(remote: &'a dyn Remote, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RemoteClient {
            remote,
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Batch-fetch PR number/title/body/baseRefName for every PR number in
    /// `numbers` with one aliased GraphQL document, following the teacher's
    /// `fetch_pr_bodies_graphql` shape.
    pub fn fetch_pr_records(&self, numbers: &[u64]) -> Result<HashMap<u64, PrRecord>> {
        let mut out = HashMap::new();
        if numbers.is_empty() {
            return Ok(out);
        }
        let mut q = String::from(
            "query($owner:String!,$name:String!){ repository(owner:$owner,name:$name){ ",
        );
        for (i, n) in numbers.iter().enumerate() {
            q.push_str(&format!(
                "pr{i}: pullRequest(number: {n}) {{ id number title body baseRefName headRefName }} "
            ));
        }
        q.push_str("} }");
        let v = self
            .remote
            .graphql(&q, &[("owner", &self.owner), ("name", &self.repo)])?;
        let repo = &v["data"]["repository"];
        for (i, n) in numbers.iter().enumerate() {
            let key = format!("pr{i}");
            let node = &repo[&key];
            if node.is_null() {
                continue;
            }
            out.insert(
                *n,
                PrRecord {
                    number: node["number"].as_u64().unwrap_or(*n),
                    node_id: node["id"].as_str().unwrap_or("").to_string(),
                    title: node["title"].as_str().unwrap_or("").to_string(),
                    body: node["body"].as_str().unwrap_or("").to_string(),
                    base_ref_name: node["baseRefName"].as_str().unwrap_or("").to_string(),
                    head_ref_name: node["headRefName"].as_str().unwrap_or("").to_string(),
                },
            );
        }
        Ok(out)
    }

    /// Open a new PR for `head` against `base`, returning its number.
    pub fn open_pr(&self, head: &str, base: &str, title: &str, body: &str) -> Result<u64> {
        let payload = serde_json::json!({
            "head": head,
            "base": base,
            "title": title,
            "body": body,
        });
        let path = format!("repos/{}/{}/pulls", self.owner, self.repo);
        let v = self.remote.post(&path, &payload)?;
        v["number"]
            .as_u64()
            .ok_or_else(|| anyhow!("PR creation response had no \"number\" field"))
    }

    /// Overwrite title/body (and nothing else) on an existing PR.
    pub fn patch_pr_fields(&self, number: u64, title: Option<&str>, body: Option<&str>) -> Result<()> {
        let mut payload = serde_json::Map::new();
        if let Some(t) = title {
            payload.insert("title".to_string(), Value::String(t.to_string()));
        }
        if let Some(b) = body {
            payload.insert("body".to_string(), Value::String(b.to_string()));
        }
        if payload.is_empty() {
            return Ok(());
        }
        let path = format!("repos/{}/{}/pulls/{}", self.owner, self.repo, number);
        self.remote.patch(&path, &Value::Object(payload))?;
        Ok(())
    }

    /// Parse the PR number out of a `.../pull/<N>` URL without a network
    /// call; this is the same parsing `PrId::pr_number` does, exposed here
    /// too since `land` resolves a PR URL before it has a `PrId` at hand.
    pub fn resolve_pr_number_from_url(url: &str) -> Result<u64> {
        url.rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("could not parse a PR number from {url}"))
    }
}

/// An in-memory `Remote` used by scenario tests so they never need a real
/// network or `gh` on PATH. State is a flat map of REST paths to bodies plus
/// a tiny GraphQL interpreter limited to the aliased `pullRequest(number:
/// N)` queries this crate actually issues.
#[cfg(test)]
pub struct FakeRemote {
    pub prs: std::sync::Mutex<HashMap<u64, PrRecord>>,
    pub next_number: std::sync::atomic::AtomicU64,
    pub default_branch: String,
}

#[cfg(test)]
impl FakeRemote {
    pub fn new(default_branch: impl Into<String>) -> Self {
        FakeRemote {
            prs: std::sync::Mutex::new(HashMap::new()),
            next_number: std::sync::atomic::AtomicU64::new(500),
            default_branch: default_branch.into(),
        }
    }
}

#[cfg(test)]
impl Remote for FakeRemote {
    fn graphql(&self, query: &str, _vars: &[(&str, &str)]) -> Result<Value> {
        // Extract every `pr<idx>: pullRequest(number: <n>)` alias pair so the
        // batched fetch path in `RemoteClient::fetch_pr_records` works
        // end-to-end against this fake.
        let re = regex::Regex::new(r"pr(\d+): pullRequest\(number: (\d+)\)").unwrap();
        let prs = self.prs.lock().unwrap();
        let mut repo = serde_json::Map::new();
        for cap in re.captures_iter(query) {
            let idx = &cap[1];
            let number: u64 = cap[2].parse().unwrap();
            let key = format!("pr{idx}");
            if let Some(rec) = prs.get(&number) {
                repo.insert(
                    key,
                    serde_json::json!({
                        "id": rec.node_id,
                        "number": rec.number,
                        "title": rec.title,
                        "body": rec.body,
                        "baseRefName": rec.base_ref_name,
                        "headRefName": rec.head_ref_name,
                    }),
                );
            } else {
                repo.insert(key, Value::Null);
            }
        }
        Ok(serde_json::json!({ "data": { "repository": Value::Object(repo) } }))
    }

    fn get(&self, _path: &str) -> Result<Value> {
        Ok(serde_json::json!({ "default_branch": self.default_branch }))
    }

    fn post(&self, _path: &str, body: &Value) -> Result<Value> {
        let number = self.next_number.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let rec = PrRecord {
            number,
            node_id: format!("node-{number}"),
            title: body["title"].as_str().unwrap_or_default().to_string(),
            body: body["body"].as_str().unwrap_or_default().to_string(),
            base_ref_name: body["base"].as_str().unwrap_or_default().to_string(),
            head_ref_name: body["head"].as_str().unwrap_or_default().to_string(),
        };
        self.prs.lock().unwrap().insert(number, rec);
        Ok(serde_json::json!({ "number": number }))
    }

    fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        let number: u64 = path
            .rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("unrecognized PR patch path: {path}"))?;
        let mut prs = self.prs.lock().unwrap();
        let rec = prs
            .get_mut(&number)
            .ok_or_else(|| anyhow!("no such PR #{number}"))?;
        if let Some(t) = body["title"].as_str() {
            rec.title = t.to_string();
        }
        if let Some(b) = body["body"].as_str() {
            rec.body = b.to_string();
        }
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_remote_round_trips_a_pr() {
        let fake = FakeRemote::new("main");
        let client = RemoteClient::new(&fake, "acme", "widgets");
        let number = client.open_pr("gh/u/1/head", "main", "Commit 1", "body text").unwrap();
        assert_eq!(number, 500);

        client.patch_pr_fields(number, Some("New title"), None).unwrap();

        let records = client.fetch_pr_records(&[number]).unwrap();
        let rec = records.get(&number).unwrap();
        assert_eq!(rec.title, "New title");
        assert_eq!(rec.body, "body text");
    }

    #[test]
    fn resolve_pr_number_from_url_parses_trailing_segment() {
        let n = RemoteClient::resolve_pr_number_from_url("https://github.com/acme/widgets/pull/501").unwrap();
        assert_eq!(n, 501);
    }

    #[test]
    fn json_to_gh_fields_splits_scalar_kinds() {
        let body = serde_json::json!({ "title": "t", "draft": false, "skip": Value::Null });
        let args = json_to_gh_fields(&body).unwrap();
        assert!(args.contains(&"-f".to_string()));
        assert!(args.contains(&"title=t".to_string()));
        assert!(args.iter().any(|a| a == "draft=false"));
    }
}
