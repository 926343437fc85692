use clap::{Parser, Subcommand};

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Build/refresh one PR per commit in the local stack
    Submit {
        /// Fill in a description for a bare, one-line commit when creating
        /// its PR for the first time. Never overrides an existing PR's title.
        #[arg(long)]
        message: Option<String>,

        /// Overwrite each PR's title/body from the local commit instead of
        /// touching only the machine-owned stack-navigation prefix
        #[arg(long)]
        update_fields: bool,

        /// Print only the PR URLs, one per line
        #[arg(long)]
        short: bool,

        /// Always rewrite a head/base even when nothing has changed
        #[arg(long)]
        no_skip: bool,
    },

    /// Merge one PR in the stack into the default branch
    Land {
        /// The PR's GitHub URL
        pr_url: String,
    },

    /// Strip tracking trailers from every commit in the local stack
    Unlink {},
}

#[derive(Parser, Debug)]
#[command(name = "stackpr", version, about = "One PR per commit, stacked")]
pub struct Cli {
    /// Print the underlying git/gh commands as they run
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Print what would change without mutating local refs, the remote, or PRs
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub cmd: Cmd,
}
