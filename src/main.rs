use anyhow::Result;
use clap::Parser;

mod body;
mod classify;
mod cli;
mod config;
mod error;
mod format;
mod gitops;
mod land;
mod model;
mod remote;
mod scenario_tests;
mod shell;
mod stack;
mod submit;
mod trailers;
mod treesynth;
mod unlink;

use crate::error::Error;
use crate::gitops::RealGitOps;
use crate::remote::GhRemoteClient;
use crate::shell::SystemShell;

fn init_tools(shell: &dyn crate::shell::Shell) -> Result<()> {
    crate::shell::ensure_tool(shell, "git")?;
    crate::shell::ensure_tool(shell, "gh")?;
    Ok(())
}

fn run(cli: cli::Cli) -> Result<()> {
    if cli.verbose {
        std::env::set_var("STACKPR_VERBOSE", "1");
    }

    let shell = SystemShell::new();
    init_tools(&shell)?;

    let git = RealGitOps::new(Box::new(SystemShell::new()));
    let cfg = crate::config::load_config(&git)?;
    let gh = GhRemoteClient::new(Box::new(SystemShell::new()));

    match cli.cmd {
        cli::Cmd::Submit { message, update_fields, short, no_skip } => {
            let opts = submit::SubmitOptions { message, update_fields, short, no_skip };
            let metas = submit::submit(&git, &gh, &cfg, cli.dry_run, "Update", &opts)?;
            for m in &metas {
                if opts.short {
                    println!("{}", m.pr_url);
                } else {
                    let status = if m.skipped { "unchanged" } else { "updated" };
                    println!("{}", crate::format::pr_line(m.pr_number, &m.pr_url, status));
                }
            }
        }
        cli::Cmd::Land { pr_url } => {
            let outcome = land::run_land(&git, &gh, &cfg, cli.dry_run, &pr_url)?;
            match outcome {
                land::LandOutcome::FastForward { pushed_oids } => {
                    println!("Fast-forwarded {} commit(s) onto the default branch.", pushed_oids.len());
                }
                land::LandOutcome::Rebuilt { pushed_oids } => {
                    println!("Rebuilt and pushed {} commit(s) onto the default branch.", pushed_oids.len());
                }
            }
        }
        cli::Cmd::Unlink {} => {
            let new_tip = unlink::run_unlink(&git, &cfg, cli.dry_run)?;
            println!("HEAD is now {} with tracking trailers removed.", crate::format::short_oid(&new_tip));
        }
    }

    Ok(())
}

fn main() {
    let cli = cli::Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("info")
            .with_target(false)
            .with_level(false)
            .compact()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("info")
            .with_target(false)
            .with_level(false)
            .without_time()
            .compact()
            .init();
    }

    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        let code = err.downcast_ref::<Error>().map(Error::exit_code).unwrap_or(2);
        std::process::exit(code);
    }
}
