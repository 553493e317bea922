//! Stash-bearing plans that move changes between the primary worktree and
//! managed trees: `extract`, `absorb`, `unabsorb`, plus `use` which shares
//! their prechecks.
//!
//! These are the flows with a registered restore callback: the stash is
//! created during precheck, so a failing pre-hook must put the changes
//! back before the error propagates.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{HookTarget, MutationPlan};
use crate::errors::{Result, WorktreeError};
use crate::workspace::Workspace;

const STASH_LABEL: &str = "vde-worktree transfer";

fn stash_push(ws: &Workspace, path: &Path) -> Result<()> {
    ws.git.run(
        path,
        &["stash", "push", "--include-untracked", "-m", STASH_LABEL],
    )?;
    Ok(())
}

fn stash_pop(ws: &Workspace, path: &Path) -> Result<()> {
    ws.git.run(path, &["stash", "pop"])?;
    Ok(())
}

/// Apply the most recent stash in `path`, then drop it. A failed apply
/// keeps the stash so nothing is lost.
fn stash_apply_drop(ws: &Workspace, path: &Path, branch: &str) -> Result<()> {
    if let Err(e) = ws.git.run(path, &["stash", "apply"]) {
        return Err(WorktreeError::StashApplyFailed {
            branch: branch.to_string(),
            detail: e.to_string(),
        });
    }
    ws.git.run(path, &["stash", "drop"])?;
    Ok(())
}

/// Current branch of the primary worktree; detached HEAD is an error.
fn primary_branch(ws: &Workspace) -> Result<String> {
    let name = ws
        .git
        .run_trimmed(&ws.ctx.repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if name == "HEAD" {
        Err(WorktreeError::DetachedHead {
            path: ws.ctx.repo_root.clone(),
        })
    } else {
        Ok(name)
    }
}

fn require_primary_invocation(ws: &Workspace, action: &str) -> Result<()> {
    if ws.ctx.in_primary_worktree() {
        Ok(())
    } else {
        Err(WorktreeError::invalid_argument(format!(
            "{action} must run from the primary worktree"
        )))
    }
}

// ---------------------------------------------------------------------------
// extract

/// Move the primary's current branch into a managed worktree, leaving the
/// primary on base.
pub struct ExtractPlan {
    pub stash: bool,
}

pub struct ExtractPrechecked {
    branch: String,
    base: String,
    target_path: PathBuf,
    stashed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractOutcome {
    pub branch: String,
    pub path: PathBuf,
    pub stashed: bool,
}

impl MutationPlan for ExtractPlan {
    type Prechecked = ExtractPrechecked;
    type Outcome = ExtractOutcome;

    fn action(&self) -> &'static str {
        "extract"
    }

    fn precheck(&self, ws: &Workspace) -> Result<ExtractPrechecked> {
        require_primary_invocation(ws, "extract")?;
        let branch = primary_branch(ws)?;
        let base = ws.base_branch().ok_or_else(|| {
            WorktreeError::invalid_argument(
                "cannot resolve a base branch; set git.baseBranch in the configuration",
            )
        })?;
        if branch == base {
            return Err(WorktreeError::invalid_argument(format!(
                "the primary is on the base branch ({base}); nothing to extract"
            )));
        }

        let target_path = ws.branch_path(&branch)?;
        ws.ensure_target_path_free(&target_path)?;

        let mut stashed = false;
        if ws.git.is_dirty(&ws.ctx.repo_root)? {
            if !self.stash {
                return Err(WorktreeError::DirtyWorktree { branch });
            }
            stash_push(ws, &ws.ctx.repo_root)?;
            stashed = true;
        }

        Ok(ExtractPrechecked {
            branch,
            base,
            target_path,
            stashed,
        })
    }

    fn hook_target(&self, pre: &ExtractPrechecked) -> HookTarget {
        HookTarget {
            branch: Some(pre.branch.clone()),
            worktree_path: Some(pre.target_path.clone()),
            extra_env: vec![("WT_BASE_BRANCH".into(), pre.base.clone())],
        }
    }

    fn pre_hook_restore(
        &self,
        ws: &Workspace,
        pre: &ExtractPrechecked,
    ) -> Option<Box<dyn FnOnce() -> Result<()>>> {
        if !pre.stashed {
            return None;
        }
        let git = ws.git.clone();
        let root = ws.ctx.repo_root.clone();
        Some(Box::new(move || {
            git.run(&root, &["stash", "pop"])?;
            Ok(())
        }))
    }

    fn run_vcs(&self, ws: &Workspace, pre: &ExtractPrechecked) -> Result<ExtractOutcome> {
        let root = &ws.ctx.repo_root;

        let result = (|| -> Result<()> {
            ws.git.run(root, &["checkout", &pre.base])?;
            if let Some(parent) = pre.target_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let path_str = pre.target_path.to_string_lossy();
            ws.git
                .run(root, &["worktree", "add", &path_str, &pre.branch])?;
            Ok(())
        })();

        if let Err(e) = result {
            // The branch never made it into a worktree; put the changes
            // back where they were.
            if pre.stashed && let Err(restore) = stash_pop(ws, root) {
                log::warn!("failed to restore stash after extract failure: {restore}");
            }
            return Err(e);
        }

        if pre.stashed {
            stash_apply_drop(ws, &pre.target_path, &pre.branch)?;
        }

        Ok(ExtractOutcome {
            branch: pre.branch.clone(),
            path: pre.target_path.clone(),
            stashed: pre.stashed,
        })
    }

    fn finalize(
        &self,
        ws: &Workspace,
        pre: &ExtractPrechecked,
        _outcome: &ExtractOutcome,
    ) -> Result<()> {
        ws.lifecycle.upsert(&pre.branch, Some(&pre.base), None)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// absorb

/// Bring a managed worktree's branch (and optionally its uncommitted
/// changes) into the primary.
pub struct AbsorbPlan {
    pub branch: String,
    /// Source tree override; defaults to the branch's managed worktree.
    pub from: Option<PathBuf>,
}

pub struct AbsorbPrechecked {
    source_path: PathBuf,
    stashed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsorbOutcome {
    pub branch: String,
    pub stashed: bool,
}

impl MutationPlan for AbsorbPlan {
    type Prechecked = AbsorbPrechecked;
    type Outcome = AbsorbOutcome;

    fn action(&self) -> &'static str {
        "absorb"
    }

    fn precheck(&self, ws: &Workspace) -> Result<AbsorbPrechecked> {
        require_primary_invocation(ws, "absorb")?;
        if ws.git.is_dirty(&ws.ctx.repo_root)? {
            return Err(WorktreeError::DirtyWorktree {
                branch: primary_branch(ws).unwrap_or_else(|_| "primary".to_string()),
            });
        }

        let attached = ws.find_attached(&self.branch)?.ok_or_else(|| {
            WorktreeError::WorktreeNotFound {
                branch: self.branch.clone(),
            }
        })?;
        let source_path = self.from.clone().unwrap_or(attached.clone());
        if source_path != attached {
            return Err(WorktreeError::invalid_argument(format!(
                "{} is not the worktree of branch {}",
                source_path.display(),
                self.branch
            )));
        }
        if source_path == ws.ctx.repo_root {
            return Err(WorktreeError::invalid_argument(
                "branch is already checked out in the primary worktree",
            ));
        }
        if !source_path.starts_with(ws.worktree_root()) {
            return Err(WorktreeError::invalid_argument(format!(
                "worktree for {} is outside the managed root",
                self.branch
            )));
        }

        let mut stashed = false;
        if ws.git.is_dirty(&source_path)? {
            stash_push(ws, &source_path)?;
            stashed = true;
        }

        Ok(AbsorbPrechecked {
            source_path,
            stashed,
        })
    }

    fn hook_target(&self, pre: &AbsorbPrechecked) -> HookTarget {
        HookTarget {
            branch: Some(self.branch.clone()),
            worktree_path: Some(pre.source_path.clone()),
            extra_env: Vec::new(),
        }
    }

    fn pre_hook_restore(
        &self,
        ws: &Workspace,
        pre: &AbsorbPrechecked,
    ) -> Option<Box<dyn FnOnce() -> Result<()>>> {
        if !pre.stashed {
            return None;
        }
        let git = ws.git.clone();
        let source = pre.source_path.clone();
        Some(Box::new(move || {
            git.run(&source, &["stash", "pop"])?;
            Ok(())
        }))
    }

    fn run_vcs(&self, ws: &Workspace, pre: &AbsorbPrechecked) -> Result<AbsorbOutcome> {
        let root = &ws.ctx.repo_root;
        ws.git.run(
            root,
            &["checkout", "--ignore-other-worktrees", &self.branch],
        )?;
        if pre.stashed {
            stash_apply_drop(ws, root, &self.branch)?;
        }
        Ok(AbsorbOutcome {
            branch: self.branch.clone(),
            stashed: pre.stashed,
        })
    }
}

// ---------------------------------------------------------------------------
// unabsorb

/// Push the primary's uncommitted changes back to the branch's managed
/// worktree.
pub struct UnabsorbPlan {
    pub branch: String,
    /// Target tree override; defaults to the branch's managed worktree.
    pub to: Option<PathBuf>,
}

pub struct UnabsorbPrechecked {
    target_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnabsorbOutcome {
    pub branch: String,
    pub path: PathBuf,
}

impl MutationPlan for UnabsorbPlan {
    type Prechecked = UnabsorbPrechecked;
    type Outcome = UnabsorbOutcome;

    fn action(&self) -> &'static str {
        "unabsorb"
    }

    fn precheck(&self, ws: &Workspace) -> Result<UnabsorbPrechecked> {
        require_primary_invocation(ws, "unabsorb")?;
        let current = primary_branch(ws)?;
        if current != self.branch {
            return Err(WorktreeError::invalid_argument(format!(
                "the primary is on {current}, not {}",
                self.branch
            )));
        }
        if !ws.git.is_dirty(&ws.ctx.repo_root)? {
            return Err(WorktreeError::invalid_argument(
                "the primary has no uncommitted changes to move",
            ));
        }

        let target_path = match &self.to {
            Some(path) => path.clone(),
            None => ws.branch_path(&self.branch)?,
        };
        if !target_path.is_dir() || !target_path.starts_with(ws.worktree_root()) {
            return Err(WorktreeError::WorktreeNotFound {
                branch: self.branch.clone(),
            });
        }
        if ws.git.is_dirty(&target_path)? {
            return Err(WorktreeError::DirtyWorktree {
                branch: self.branch.clone(),
            });
        }

        // The stash is the transfer vehicle; created here so the pre-hook
        // restore can undo it.
        stash_push(ws, &ws.ctx.repo_root)?;

        Ok(UnabsorbPrechecked { target_path })
    }

    fn hook_target(&self, pre: &UnabsorbPrechecked) -> HookTarget {
        HookTarget {
            branch: Some(self.branch.clone()),
            worktree_path: Some(pre.target_path.clone()),
            extra_env: Vec::new(),
        }
    }

    fn pre_hook_restore(
        &self,
        ws: &Workspace,
        _pre: &UnabsorbPrechecked,
    ) -> Option<Box<dyn FnOnce() -> Result<()>>> {
        let git = ws.git.clone();
        let root = ws.ctx.repo_root.clone();
        Some(Box::new(move || {
            git.run(&root, &["stash", "pop"])?;
            Ok(())
        }))
    }

    fn run_vcs(&self, ws: &Workspace, pre: &UnabsorbPrechecked) -> Result<UnabsorbOutcome> {
        stash_apply_drop(ws, &pre.target_path, &self.branch)?;
        Ok(UnabsorbOutcome {
            branch: self.branch.clone(),
            path: pre.target_path.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// use

/// Check a branch out in the primary worktree.
pub struct UsePlan {
    pub branch: String,
    pub allow_shared: bool,
}

pub struct UsePrechecked {
    shared: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseOutcome {
    pub branch: String,
    pub shared: bool,
}

impl MutationPlan for UsePlan {
    type Prechecked = UsePrechecked;
    type Outcome = UseOutcome;

    fn action(&self) -> &'static str {
        "use"
    }

    fn precheck(&self, ws: &Workspace) -> Result<UsePrechecked> {
        require_primary_invocation(ws, "use")?;
        if ws.git.is_dirty(&ws.ctx.repo_root)? {
            return Err(WorktreeError::DirtyWorktree {
                branch: primary_branch(ws).unwrap_or_else(|_| "primary".to_string()),
            });
        }

        let shared = match ws.find_attached(&self.branch)? {
            Some(path) if path != ws.ctx.repo_root => {
                if !self.allow_shared {
                    return Err(WorktreeError::BranchInUse {
                        branch: self.branch.clone(),
                        path,
                    });
                }
                true
            }
            _ => false,
        };

        Ok(UsePrechecked { shared })
    }

    fn hook_target(&self, _pre: &UsePrechecked) -> HookTarget {
        HookTarget {
            branch: Some(self.branch.clone()),
            worktree_path: None,
            extra_env: Vec::new(),
        }
    }

    fn run_vcs(&self, ws: &Workspace, pre: &UsePrechecked) -> Result<UseOutcome> {
        let root = &ws.ctx.repo_root;
        if pre.shared {
            ws.git.run(
                root,
                &["checkout", "--ignore-other-worktrees", &self.branch],
            )?;
        } else {
            ws.git.run(root, &["checkout", &self.branch])?;
        }
        Ok(UseOutcome {
            branch: self.branch.clone(),
            shared: pre.shared,
        })
    }
}
