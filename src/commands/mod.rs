//! Command surface: maps CLI invocations to pipeline operations and emits
//! either human output or the JSON envelope.

mod list;
mod misc;
mod mutate;
mod select;

use std::path::Path;

use crate::cli::{Cli, Command};
use crate::errors::{Result, WorktreeError};
use crate::output::{OutputMode, Reporter};
use crate::utils::stdout_is_tty;
use crate::workspace::{Overrides, Workspace};

/// Exit code for an interrupted or empty interactive selection.
pub const EXIT_CANCELLED: i32 = 130;

pub struct App {
    pub ws: Workspace,
    pub reporter: Reporter,
    pub full_path: bool,
}

impl App {
    pub fn repo_root(&self) -> &Path {
        &self.ws.ctx.repo_root
    }
}

/// Entry point: returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let reporter = Reporter::new(mode, cli.command_name());

    match execute(cli, reporter.clone()) {
        Ok(code) => code,
        Err(err) => {
            reporter.error(None, &err);
            err.exit_code()
        }
    }
}

fn execute(cli: Cli, reporter: Reporter) -> std::result::Result<i32, WorktreeError> {
    // Completion needs no repository at all.
    if let Command::Completion { shell } = &cli.command {
        misc::completion(*shell);
        return Ok(0);
    }

    ensure_unsafe_flags_allowed(&cli)?;

    let overrides = Overrides {
        hooks: cli.hooks_override(),
        gh: cli.gh_override(),
        hook_timeout_ms: cli.hook_timeout_ms,
        lock_timeout_ms: cli.lock_timeout_ms,
    };
    let cwd = std::env::current_dir()
        .map_err(|e| WorktreeError::internal(format!("cannot resolve cwd: {e}")))?;
    let ws = Workspace::discover(&cwd, &overrides)?;

    let app = App {
        ws,
        reporter,
        full_path: cli.full_path,
    };

    match cli.command {
        Command::Init => mutate::init(&app),
        Command::List => list::list(&app),
        Command::Status { branch } => misc::status(&app, branch.as_deref()),
        Command::Path { branch } => misc::path(&app, branch.as_deref()),
        Command::New { branch } => mutate::new(&app, branch),
        Command::Switch { branch } => mutate::switch(&app, branch),
        Command::Mv { new_branch } => mutate::mv(&app, new_branch),
        Command::Del {
            branch,
            force,
            force_dirty,
            force_locked,
            force_unmerged,
            allow_unpushed,
        } => {
            let flags = crate::pipeline::DelFlags {
                force_dirty,
                force_locked,
                force_unmerged,
                allow_unpushed,
            }
            .with_force(force);
            mutate::del(&app, branch, flags)
        }
        Command::Gone { apply } => mutate::gone(&app, apply),
        Command::Adopt { apply } => mutate::adopt(&app, apply),
        Command::Get { remote_branch } => mutate::get(&app, remote_branch),
        Command::Extract { stash } => mutate::extract(&app, stash),
        Command::Absorb { branch, from } => mutate::absorb(&app, branch, from),
        Command::Unabsorb { branch, to } => mutate::unabsorb(&app, branch, to),
        Command::Use {
            branch,
            allow_shared,
        } => mutate::use_branch(&app, branch, allow_shared),
        Command::Exec { branch, command } => misc::exec(&app, &branch, &command),
        Command::Invoke { hook, branch } => misc::invoke(&app, &hook, branch.as_deref()),
        Command::Copy { paths, to } => misc::copy_or_link(&app, &paths, to.as_deref(), false),
        Command::Link { paths, to } => misc::copy_or_link(&app, &paths, to.as_deref(), true),
        Command::Lock {
            branch,
            reason,
            owner,
        } => misc::lock(&app, &branch, &reason, owner.as_deref()),
        Command::Unlock { branch, owner } => misc::unlock(&app, &branch, owner.as_deref()),
        Command::Cd { branch } => misc::cd(&app, branch.as_deref()),
        Command::Completion { .. } => unreachable!("handled above"),
    }
}

/// Force flags and `--no-hooks` need a human in the loop; without a TTY
/// they require the explicit `--allow-unsafe`.
fn ensure_unsafe_flags_allowed(cli: &Cli) -> Result<()> {
    if stdout_is_tty() || cli.allow_unsafe {
        return Ok(());
    }

    let mut used: Vec<String> = Vec::new();
    if cli.no_hooks {
        used.push("--no-hooks".into());
    }
    if let Command::Del {
        force,
        force_dirty,
        force_locked,
        force_unmerged,
        allow_unpushed,
        ..
    } = &cli.command
    {
        for (set, name) in [
            (*force, "--force"),
            (*force_dirty, "--force-dirty"),
            (*force_locked, "--force-locked"),
            (*force_unmerged, "--force-unmerged"),
            (*allow_unpushed, "--allow-unpushed"),
        ] {
            if set {
                used.push(name.into());
            }
        }
    }

    if used.is_empty() {
        Ok(())
    } else {
        Err(WorktreeError::UnsafeFlagRequired { flags: used })
    }
}
