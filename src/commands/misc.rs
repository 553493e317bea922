//! Read-only and auxiliary commands: status, path, cd, exec, invoke,
//! copy/link, lock/unlock, completion.

use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;

use serde_json::json;

use super::{App, EXIT_CANCELLED, select};
use crate::errors::{HookPhase, WorktreeError};
use crate::hooks::HookInvocation;
use crate::path::{display_path, resolve_repo_relative_path};
use crate::snapshot::WorktreeStatus;
use crate::utils::username;

type CommandResult = std::result::Result<i32, WorktreeError>;

/// Resolve the target worktree: named branch, or the one we are in.
fn resolve_status<'a>(
    app: &App,
    snapshot: &'a crate::snapshot::Snapshot,
    branch: Option<&str>,
) -> std::result::Result<&'a WorktreeStatus, WorktreeError> {
    match branch {
        Some(branch) => snapshot
            .find_branch(branch)
            .ok_or_else(|| WorktreeError::WorktreeNotFound {
                branch: branch.to_string(),
            }),
        None => snapshot
            .find_path(&app.ws.ctx.current_worktree_root)
            .ok_or_else(|| WorktreeError::internal("current worktree not in listing")),
    }
}

pub fn status(app: &App, branch: Option<&str>) -> CommandResult {
    let snapshot = app.ws.snapshot()?;
    let status = resolve_status(app, &snapshot, branch)?;

    let mut human = String::new();
    let shown_branch = status.entry.branch.as_deref().unwrap_or("(detached)");
    human.push_str(&format!("branch:  {shown_branch}\n"));
    human.push_str(&format!(
        "path:    {}\n",
        display_path(&status.entry.path, app.repo_root(), app.full_path)
    ));
    human.push_str(&format!("head:    {}\n", status.entry.head));
    human.push_str(&format!("dirty:   {}\n", facet(status.dirty)));
    human.push_str(&format!(
        "locked:  {}{}\n",
        status.locked.value,
        status
            .locked
            .reason
            .as_deref()
            .map(|r| format!(" ({r})"))
            .unwrap_or_default()
    ));
    human.push_str(&format!("merged:  {}\n", facet(status.merged.overall)));
    human.push_str(&format!(
        "pr:      {}\n",
        status
            .pr
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    human.push_str(&format!(
        "ahead:   {}  behind: {}",
        count(status.upstream.ahead),
        count(status.upstream.behind)
    ));

    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        json!({
            "baseBranch": snapshot.base_branch.clone(),
            "worktree": serde_json::to_value(status)?,
        }),
        &human,
    );
    Ok(0)
}

fn facet(value: Option<bool>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "unknown".to_string(),
    }
}

fn count(value: Option<u32>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

pub fn path(app: &App, branch: Option<&str>) -> CommandResult {
    let target = match branch {
        Some(branch) => {
            app.ws
                .find_attached(branch)?
                .ok_or_else(|| WorktreeError::WorktreeNotFound {
                    branch: branch.to_string(),
                })?
        }
        None => app.ws.ctx.current_worktree_root.clone(),
    };
    let shown = display_path(&target, app.repo_root(), app.full_path);
    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        json!({ "path": target }),
        &shown,
    );
    Ok(0)
}

pub fn cd(app: &App, branch: Option<&str>) -> CommandResult {
    let target = match branch {
        Some(branch) => {
            app.ws
                .find_attached(branch)?
                .ok_or_else(|| WorktreeError::WorktreeNotFound {
                    branch: branch.to_string(),
                })?
        }
        None => {
            let snapshot = app.ws.snapshot()?;
            match select::pick_worktree(&app.ws, &snapshot)? {
                Some(path) => path,
                None => return Ok(EXIT_CANCELLED),
            }
        }
    };

    // The shell wrapper consumes this path; always absolute.
    let human = target.display().to_string();
    app.reporter
        .ok("ok", Some(app.repo_root()), json!({ "path": target }), &human);
    Ok(0)
}

pub fn exec(app: &App, branch: &str, command: &[String]) -> CommandResult {
    let path = app
        .ws
        .find_attached(branch)?
        .ok_or_else(|| WorktreeError::WorktreeNotFound {
            branch: branch.to_string(),
        })?;

    let (program, args) = command
        .split_first()
        .ok_or_else(|| WorktreeError::invalid_argument("no command given after --"))?;

    let status = ProcessCommand::new(program)
        .args(args)
        .current_dir(&path)
        .status()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WorktreeError::DependencyMissing {
                    binary: program.clone(),
                }
            } else {
                WorktreeError::internal(format!("failed to spawn {program}: {e}"))
            }
        })?;

    let code = status.code().unwrap_or(-1);
    if code != 0 {
        return Err(WorktreeError::ChildProcessFailed {
            command: command.join(" "),
            exit_code: code,
        });
    }
    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        json!({ "branch": branch, "childExitCode": 0 }),
        "",
    );
    Ok(0)
}

pub fn invoke(app: &App, hook: &str, branch: Option<&str>) -> CommandResult {
    let (phase, action) = match hook.split_once('-') {
        Some(("pre", action)) if !action.is_empty() => (HookPhase::Pre, action),
        Some(("post", action)) if !action.is_empty() => (HookPhase::Post, action),
        _ => {
            return Err(WorktreeError::invalid_argument(format!(
                "hook must be named <phase>-<action> with phase pre or post, got {hook}"
            )));
        }
    };

    let worktree_path = match branch {
        Some(branch) => app.ws.find_attached(branch)?,
        None => None,
    };
    let invocation = HookInvocation {
        action,
        branch,
        worktree_path: worktree_path.as_deref(),
        extra_env: Vec::new(),
    };
    app.ws.hooks.invoke(phase, &invocation)?;

    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        json!({ "hook": hook, "branch": branch }),
        &format!("{hook} succeeded"),
    );
    Ok(0)
}

/// Destination worktree for `copy`/`link`: `--to <branch>` wins, else the
/// `WT_WORKTREE_PATH` environment set by a hook.
fn destination_worktree(app: &App, to: Option<&str>) -> std::result::Result<PathBuf, WorktreeError> {
    if let Some(branch) = to {
        return app
            .ws
            .find_attached(branch)?
            .ok_or_else(|| WorktreeError::WorktreeNotFound {
                branch: branch.to_string(),
            });
    }
    let raw = std::env::var("WT_WORKTREE_PATH").map_err(|_| {
        WorktreeError::invalid_argument(
            "no destination: pass --to <branch> or set WT_WORKTREE_PATH",
        )
    })?;
    let path = PathBuf::from(raw);
    if !path.is_dir() {
        return Err(WorktreeError::invalid_argument(format!(
            "WT_WORKTREE_PATH is not a directory: {}",
            path.display()
        )));
    }
    Ok(path)
}

pub fn copy_or_link(app: &App, paths: &[String], to: Option<&str>, link: bool) -> CommandResult {
    let dest_root = destination_worktree(app, to)?;
    let src_root = app.repo_root();

    let mut transferred = Vec::new();
    for raw in paths {
        let rel = resolve_repo_relative_path(raw)?;
        let src = src_root.join(rel);
        if !src.exists() {
            return Err(WorktreeError::invalid_argument(format!(
                "no such file in the primary worktree: {rel}"
            )));
        }
        let dst = dest_root.join(rel);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if link {
            link_file(&src, &dst)?;
        } else {
            copy_file(&src, &dst)?;
        }
        transferred.push(rel.to_string());
    }

    let verb = if link { "linked" } else { "copied" };
    let human = format!(
        "{verb} {} file(s) to {}",
        transferred.len(),
        dest_root.display()
    );
    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        json!({
            "destination": dest_root,
            "paths": transferred,
            "mode": verb,
        }),
        &human,
    );
    Ok(0)
}

fn copy_file(src: &Path, dst: &Path) -> std::result::Result<(), WorktreeError> {
    if src.is_dir() {
        return Err(WorktreeError::invalid_argument(format!(
            "{} is a directory; pass files individually",
            src.display()
        )));
    }
    std::fs::copy(src, dst)?;
    Ok(())
}

#[cfg(unix)]
fn link_file(src: &Path, dst: &Path) -> std::result::Result<(), WorktreeError> {
    if dst.symlink_metadata().is_ok() {
        std::fs::remove_file(dst)?;
    }
    std::os::unix::fs::symlink(src, dst)?;
    Ok(())
}

#[cfg(not(unix))]
fn link_file(src: &Path, dst: &Path) -> std::result::Result<(), WorktreeError> {
    // Symlinks need privileges on this platform; fall back to a copy.
    copy_file(src, dst)
}

pub fn lock(app: &App, branch: &str, reason: &str, owner: Option<&str>) -> CommandResult {
    if reason.trim().is_empty() {
        return Err(WorktreeError::invalid_argument("lock reason must not be empty"));
    }
    app.ws
        .find_attached(branch)?
        .ok_or_else(|| WorktreeError::WorktreeNotFound {
            branch: branch.to_string(),
        })?;

    let owner = owner.map(String::from).unwrap_or_else(username);
    let record = app.ws.locks.upsert(branch, reason, &owner)?;

    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        json!({
            "branch": branch,
            "locked": { "value": true, "reason": record.reason, "owner": record.owner },
        }),
        &format!("locked {branch}: {reason}"),
    );
    Ok(0)
}

pub fn unlock(app: &App, branch: &str, owner: Option<&str>) -> CommandResult {
    let outcome = app.ws.locks.read(branch)?;
    if let (Some(expected), Some(record)) = (owner, outcome.record.as_ref())
        && record.owner != expected
    {
        return Err(WorktreeError::LockConflict {
            branch: branch.to_string(),
            owner: record.owner.clone(),
        });
    }

    let removed = app.ws.locks.delete(branch)?;
    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        json!({
            "branch": branch,
            "removed": removed,
            "locked": { "value": false, "reason": null, "owner": null },
        }),
        &format!("unlocked {branch}"),
    );
    Ok(0)
}

pub fn completion(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    let mut command = crate::cli::Cli::command();
    clap_complete::generate(shell, &mut command, "vdew", &mut std::io::stdout());
}
