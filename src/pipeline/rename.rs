//! `mv`: rename the current worktree's branch and relocate its directory.

use std::path::PathBuf;

use serde::Serialize;

use super::{HookTarget, MutationPlan};
use crate::errors::{Result, WorktreeError};
use crate::workspace::Workspace;

pub struct MvPlan {
    pub new_branch: String,
}

pub struct MvPrechecked {
    old_branch: String,
    current_path: PathBuf,
    new_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MvOutcome {
    pub old_branch: String,
    pub new_branch: String,
    pub path: PathBuf,
}

impl MutationPlan for MvPlan {
    type Prechecked = MvPrechecked;
    type Outcome = MvOutcome;

    fn action(&self) -> &'static str {
        "mv"
    }

    fn precheck(&self, ws: &Workspace) -> Result<MvPrechecked> {
        let current_path = ws.ctx.current_worktree_root.clone();
        if ws.ctx.in_primary_worktree() {
            return Err(WorktreeError::invalid_argument(
                "cannot rename the primary worktree; run mv from a managed worktree",
            ));
        }

        let trees = ws.git.list_worktrees(&ws.ctx.repo_root)?;
        let current = trees
            .iter()
            .find(|wt| wt.path == current_path)
            .ok_or_else(|| WorktreeError::internal("current worktree not in listing"))?;
        let old_branch = current.branch.clone().ok_or(WorktreeError::DetachedHead {
            path: current_path.clone(),
        })?;

        if ws.git.branch_exists(&ws.ctx.repo_root, &self.new_branch)? {
            return Err(WorktreeError::BranchAlreadyExists {
                branch: self.new_branch.clone(),
            });
        }
        let new_path = ws.branch_path(&self.new_branch)?;
        ws.ensure_target_path_free(&new_path)?;

        Ok(MvPrechecked {
            old_branch,
            current_path,
            new_path,
        })
    }

    fn hook_target(&self, pre: &MvPrechecked) -> HookTarget {
        HookTarget {
            branch: Some(pre.old_branch.clone()),
            worktree_path: Some(pre.current_path.clone()),
            extra_env: vec![("WT_NEW_BRANCH".into(), self.new_branch.clone())],
        }
    }

    fn run_vcs(&self, ws: &Workspace, pre: &MvPrechecked) -> Result<MvOutcome> {
        ws.git.run(
            &pre.current_path,
            &["branch", "-m", &pre.old_branch, &self.new_branch],
        )?;

        if let Some(parent) = pre.new_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let from = pre.current_path.to_string_lossy();
        let to = pre.new_path.to_string_lossy();
        ws.git
            .run(&ws.ctx.repo_root, &["worktree", "move", &from, &to])?;

        Ok(MvOutcome {
            old_branch: pre.old_branch.clone(),
            new_branch: self.new_branch.clone(),
            path: pre.new_path.clone(),
        })
    }

    fn finalize(&self, ws: &Workspace, pre: &MvPrechecked, _outcome: &MvOutcome) -> Result<()> {
        ws.lifecycle.rename(&pre.old_branch, &self.new_branch)?;
        Ok(())
    }
}
