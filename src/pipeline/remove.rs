//! Destructive plans: `del` with its safety matrix, and `gone` bulk
//! cleanup of merged worktrees.

use std::path::PathBuf;

use serde::Serialize;

use super::{HookTarget, MutationPlan};
use crate::errors::{Result, WorktreeError};
use crate::snapshot::{Snapshot, WorktreeStatus};
use crate::workspace::Workspace;

/// Effective safety flags for `del`, after folding the aggregate `--force`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelFlags {
    pub force_dirty: bool,
    pub allow_unpushed: bool,
    pub force_unmerged: bool,
    pub force_locked: bool,
}

impl DelFlags {
    pub fn with_force(mut self, force: bool) -> Self {
        if force {
            self.force_dirty = true;
            self.allow_unpushed = true;
            self.force_unmerged = true;
            self.force_locked = true;
        }
        self
    }

    pub fn any(&self) -> bool {
        self.force_dirty || self.allow_unpushed || self.force_unmerged || self.force_locked
    }
}

pub struct DelPlan {
    /// Target branch; `None` deletes the worktree the command runs in.
    pub branch: Option<String>,
    pub flags: DelFlags,
}

pub struct DelPrechecked {
    branch: String,
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelOutcome {
    pub branch: String,
    pub path: PathBuf,
}

impl DelPlan {
    fn resolve_branch(&self, ws: &Workspace) -> Result<String> {
        if let Some(branch) = &self.branch {
            return Ok(branch.clone());
        }
        let current = ws.ctx.current_worktree_root.clone();
        let trees = ws.git.list_worktrees(&ws.ctx.repo_root)?;
        trees
            .iter()
            .find(|wt| wt.path == current)
            .ok_or_else(|| WorktreeError::internal("current worktree not in listing"))?
            .branch
            .clone()
            .ok_or(WorktreeError::DetachedHead { path: current })
    }

    /// The safety matrix: each piece of evidence must be clear or forced.
    fn check_safety(&self, status: &WorktreeStatus, branch: &str) -> Result<()> {
        if status.dirty == Some(true) && !self.flags.force_dirty {
            return Err(WorktreeError::DirtyWorktree {
                branch: branch.to_string(),
            });
        }
        if status.locked.value && !self.flags.force_locked {
            return Err(WorktreeError::LockedWorktree {
                branch: branch.to_string(),
                reason: status
                    .locked
                    .reason
                    .clone()
                    .unwrap_or_else(|| "locked".to_string()),
            });
        }
        if status.merged.overall != Some(true) && !self.flags.force_unmerged {
            return Err(WorktreeError::UnmergedWorktree {
                branch: branch.to_string(),
            });
        }
        // Unknown upstream counts as unpushed; absence of evidence is not
        // permission to drop commits.
        let unpushed = match status.upstream.ahead {
            Some(ahead) => ahead > 0,
            None => true,
        };
        if unpushed && !self.flags.allow_unpushed {
            return Err(WorktreeError::UnpushedWorktree {
                branch: branch.to_string(),
                ahead: status.upstream.ahead,
            });
        }
        Ok(())
    }
}

impl MutationPlan for DelPlan {
    type Prechecked = DelPrechecked;
    type Outcome = DelOutcome;

    fn action(&self) -> &'static str {
        "del"
    }

    fn precheck(&self, ws: &Workspace) -> Result<DelPrechecked> {
        let branch = self.resolve_branch(ws)?;

        let snapshot = ws.snapshot()?;
        let status = snapshot
            .find_branch(&branch)
            .ok_or_else(|| WorktreeError::WorktreeNotFound {
                branch: branch.clone(),
            })?;

        if status.is_primary {
            return Err(WorktreeError::invalid_argument(
                "refusing to delete the primary worktree",
            ));
        }
        if !status.is_managed {
            return Err(WorktreeError::invalid_argument(format!(
                "worktree for {branch} is outside the managed root; adopt it first"
            )));
        }

        self.check_safety(status, &branch)?;

        Ok(DelPrechecked {
            branch,
            path: status.entry.path.clone(),
        })
    }

    fn hook_target(&self, pre: &DelPrechecked) -> HookTarget {
        HookTarget {
            branch: Some(pre.branch.clone()),
            worktree_path: Some(pre.path.clone()),
            extra_env: Vec::new(),
        }
    }

    fn run_vcs(&self, ws: &Workspace, pre: &DelPrechecked) -> Result<DelOutcome> {
        let root = &ws.ctx.repo_root;
        let path = pre.path.to_string_lossy();

        let mut remove_args = vec!["worktree", "remove"];
        if self.flags.any() {
            remove_args.push("--force");
        }
        remove_args.push(&path);
        ws.git.run(root, &remove_args)?;

        let delete_flag = if self.flags.any() { "-D" } else { "-d" };
        ws.git.run(root, &["branch", delete_flag, &pre.branch])?;

        Ok(DelOutcome {
            branch: pre.branch.clone(),
            path: pre.path.clone(),
        })
    }

    fn finalize(&self, ws: &Workspace, pre: &DelPrechecked, _outcome: &DelOutcome) -> Result<()> {
        ws.locks.delete(&pre.branch)?;
        ws.lifecycle.delete(&pre.branch)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// gone

/// Candidates for bulk cleanup: managed, non-primary, clean, unlocked, and
/// positively merged.
pub fn gone_candidates(snapshot: &Snapshot) -> Vec<&WorktreeStatus> {
    snapshot
        .worktrees
        .iter()
        .filter(|wt| {
            wt.is_managed
                && !wt.is_primary
                && wt.entry.branch.is_some()
                && wt.dirty == Some(false)
                && !wt.locked.value
                && wt.merged.overall == Some(true)
        })
        .collect()
}

pub struct GonePlan;

pub struct GonePrechecked {
    candidates: Vec<(String, PathBuf)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoneEntry {
    pub branch: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoneOutcome {
    pub removed: Vec<GoneEntry>,
}

impl MutationPlan for GonePlan {
    type Prechecked = GonePrechecked;
    type Outcome = GoneOutcome;

    fn action(&self) -> &'static str {
        "gone"
    }

    fn precheck(&self, ws: &Workspace) -> Result<GonePrechecked> {
        let snapshot = ws.snapshot()?;
        let candidates = gone_candidates(&snapshot)
            .into_iter()
            .filter_map(|wt| {
                wt.entry
                    .branch
                    .clone()
                    .map(|branch| (branch, wt.entry.path.clone()))
            })
            .collect();
        Ok(GonePrechecked { candidates })
    }

    fn hook_target(&self, _pre: &GonePrechecked) -> HookTarget {
        HookTarget::default()
    }

    fn run_vcs(&self, ws: &Workspace, pre: &GonePrechecked) -> Result<GoneOutcome> {
        let root = &ws.ctx.repo_root;
        let mut removed = Vec::new();
        for (branch, path) in &pre.candidates {
            let path_str = path.to_string_lossy();
            ws.git.run(root, &["worktree", "remove", &path_str])?;
            ws.git.run(root, &["branch", "-d", branch])?;
            removed.push(GoneEntry {
                branch: branch.clone(),
                path: path.clone(),
            });
        }
        Ok(GoneOutcome { removed })
    }

    fn finalize(&self, ws: &Workspace, _pre: &GonePrechecked, outcome: &GoneOutcome) -> Result<()> {
        for entry in &outcome.removed {
            ws.locks.delete(&entry.branch)?;
            ws.lifecycle.delete(&entry.branch)?;
        }
        Ok(())
    }
}
