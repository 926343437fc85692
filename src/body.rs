//! Ownership of the PR body's stack-navigation prefix, and the body
//! normalization rules used for idempotency comparisons (§4.2, §6, §9).
//!
//! The tool owns everything from the first `Stack:` line through the first
//! blank line after the bullet list; anything below that is the human's and
//! is preserved verbatim across submits.

use regex::Regex;

/// Normalize a body for *comparison* purposes only (never for storage):
/// CRLF becomes LF, and `@name` mentions are collapsed to `name` so that
/// resubmitting the same content doesn't re-notify anyone on the platform
/// every time (§4.2).
pub fn normalize_for_comparison(body: &str) -> String {
    let lf = body.replace("\r\n", "\n");
    let re = Regex::new(r"@([A-Za-z0-9][A-Za-z0-9-]*)").expect("valid regex");
    re.replace_all(&lf, "$1").to_string()
}

/// Render the machine-owned stack-navigation block for one entry.
///
/// `siblings` lists every PR number in the stack, bottom-first; `this` is
/// the PR number this block is being rendered for (marked `__->__`).
pub fn render_stack_block(siblings: &[u64], this: u64) -> String {
    let mut out = String::from("Stack:\n");
    for &n in siblings.iter().rev() {
        if n == this {
            out.push_str(&format!("* __->__ #{n}\n"));
        } else {
            out.push_str(&format!("* #{n}\n"));
        }
    }
    out
}

/// Replace the machine-owned prefix of `body` (from the first `Stack:` line
/// through the first blank line that follows the bullet list) with
/// `new_prefix`, preserving everything below untouched. If no existing
/// prefix is found, `new_prefix` is prepended.
pub fn replace_stack_prefix(body: &str, new_prefix: &str) -> String {
    let (_, suffix) = split_stack_prefix(body);
    if suffix.trim().is_empty() {
        new_prefix.trim_end().to_string()
    } else {
        format!("{}\n{}", new_prefix.trim_end(), suffix)
    }
}

/// Split `body` into `(existing stack prefix including trailing blank line,
/// everything after)`. When there is no `Stack:` marker, the prefix is
/// empty and `suffix` is the whole body.
pub fn split_stack_prefix(body: &str) -> (String, String) {
    let lines: Vec<&str> = body.lines().collect();
    let Some(start) = lines.iter().position(|l| l.trim_start() == "Stack:" || l.trim_start().starts_with("Stack:"))
    else {
        return (String::new(), body.to_string());
    };
    // Advance through the bullet list (`* ...` lines) to the first blank
    // line after it; that blank line is also machine-owned.
    let mut end = start + 1;
    while end < lines.len() && lines[end].trim_start().starts_with('*') {
        end += 1;
    }
    if end < lines.len() && lines[end].trim().is_empty() {
        end += 1;
    }
    let prefix = lines[..end].join("\n");
    let suffix = lines[end..].join("\n");
    (prefix, suffix)
}
