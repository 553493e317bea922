//! Interactive worktree picker for `cd`, driven by fzf.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::config::SelectorCdConfig;
use crate::errors::{Result, WorktreeError};
use crate::snapshot::Snapshot;
use crate::workspace::Workspace;

/// Let the user pick a worktree; `None` means cancelled (interrupt, or an
/// empty selection).
pub fn pick_worktree(ws: &Workspace, snapshot: &Snapshot) -> Result<Option<PathBuf>> {
    which::which("fzf").map_err(|_| WorktreeError::DependencyMissing {
        binary: "fzf".into(),
    })?;

    let lines: Vec<String> = snapshot
        .worktrees
        .iter()
        .map(|wt| {
            let branch = wt.entry.branch.as_deref().unwrap_or("(detached)");
            format!("{branch}\t{}", wt.entry.path.display())
        })
        .collect();

    let selector = &ws.config.selector_cd;
    let prompt = selector
        .prompt
        .clone()
        .unwrap_or_else(|| "worktree> ".to_string());

    let mut command = picker_command(selector);
    command
        .arg("--prompt")
        .arg(&prompt)
        .arg("--delimiter")
        .arg("\t")
        .arg("--with-nth")
        .arg("1")
        .args(&selector.fzf_extra_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| WorktreeError::internal(format!("failed to spawn picker: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        let input = lines.join("\n");
        stdin.write_all(input.as_bytes())?;
        // Dropping the handle closes the pipe so fzf sees EOF.
    }

    let output = child
        .wait_with_output()
        .map_err(|e| WorktreeError::internal(format!("failed to wait for picker: {e}")))?;

    match output.status.code() {
        // 1 = no match, 130 = interrupted; both are a cancel, not an error.
        Some(1) | Some(130) | None => return Ok(None),
        Some(0) => {}
        Some(code) => {
            return Err(WorktreeError::internal(format!(
                "picker failed with exit code {code}"
            )));
        }
    }

    let selection = String::from_utf8_lossy(&output.stdout);
    let selected = selection.trim();
    if selected.is_empty() {
        return Ok(None);
    }
    let path = selected
        .split('\t')
        .nth(1)
        .ok_or_else(|| WorktreeError::internal("picker returned an unexpected line"))?;
    Ok(Some(PathBuf::from(path)))
}

/// Base picker invocation for the configured surface.
///
/// `surface: tmux` runs fzf in a tmux popup via `fzf-tmux`, passing
/// `tmuxPopupOpts` through as its layout arguments. Outside tmux, or when
/// `fzf-tmux` is missing, the picker falls back to plain fzf; `fzf-tmux`
/// forwards fzf's exit codes, so the cancel mapping above holds either way.
fn picker_command(selector: &SelectorCdConfig) -> Command {
    if selector.surface.as_deref() == Some("tmux")
        && std::env::var_os("TMUX").is_some()
        && which::which("fzf-tmux").is_ok()
    {
        let mut command = Command::new("fzf-tmux");
        if let Some(opts) = &selector.tmux_popup_opts {
            command.args(opts.split_whitespace());
        }
        command.arg("--");
        return command;
    }
    Command::new("fzf")
}
