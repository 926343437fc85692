//! Small human-output helpers shared by the CLI's command output.
//!
//! Kept separate from the engine modules so `submit`/`land`/`unlink` never
//! need to think about terminal formatting; they return data, `main.rs`
//! prints it.

/// An em space, used the same way the teacher's `list`/`update` output uses
/// it: to align a tree-drawing prefix (`┏━━`, `┃┏━`) against text that
/// follows on the next line.
pub const EM_SPACE: &str = "\u{2003}";

pub fn pr_line(number: u64, url: &str, title: &str) -> String {
    format!("#{number}{EM_SPACE}{title}\n{EM_SPACE}{url}")
}

pub fn short_oid(oid: &str) -> &str {
    &oid[..oid.len().min(8)]
}
