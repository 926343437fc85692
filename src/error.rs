//! Typed error kinds for the stacking engine.
//!
//! The CLI entry point downcasts the top-level `anyhow::Error` each command
//! returns to one of these variants to pick an exit code: 1 for anything the
//! user can fix by changing what they did, 2 for everything else (a bug).
//! Commands should always construct one of these variants rather than
//! `anyhow!("...")`-ing a string when the failure is a condition this spec
//! names; free-form `anyhow` errors (a failed `git`/`gh` invocation, an I/O
//! error) still propagate as-is and fall into the "unexpected" bucket.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("the commit range is not linear: {0} has more than one parent within the stack")]
    NonLinearStack(String),

    #[error("nothing to submit: the stack between {base} and {head} is empty")]
    EmptyStack { base: String, head: String },

    #[error(
        "HEAD is detached onto a tracking branch ({0}); check out the branch that owns this stack"
    )]
    NotOnBranch(String),

    #[error(
        "{branch} has moved since this stack was last read (expected source-id {expected}, found {found}); pull and retry"
    )]
    OutOfDate {
        branch: String,
        expected: String,
        found: String,
    },

    #[error("remote rejected the request: {status} {body}")]
    RemoteReject { status: u16, body: String },

    #[error("push was rejected for {refspec}; another writer may have updated a tracking branch")]
    PushRejected { refspec: String },

    #[error("landing PR #{number} requires a rebuild that conflicts at {commit}")]
    LandConflict { number: u64, commit: String },

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// Exit code per §6: 1 for user-correctable errors, 2 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NonLinearStack(_)
            | Error::EmptyStack { .. }
            | Error::NotOnBranch(_)
            | Error::OutOfDate { .. }
            | Error::PushRejected { .. }
            | Error::LandConflict { .. } => 1,
            Error::RemoteReject { .. } | Error::Internal(_) => 2,
        }
    }
}
