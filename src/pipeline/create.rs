//! Plans that attach a branch to a managed worktree: `new`, `switch`,
//! `get`.

use std::path::PathBuf;

use serde::Serialize;

use super::{HookTarget, MutationPlan};
use crate::errors::{Result, WorktreeError};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CreateStatus {
    Created,
    Existing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutcome {
    pub branch: String,
    pub path: PathBuf,
    pub status: CreateStatus,
    pub base_branch: Option<String>,
}

fn create_parent_dirs(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// new

pub struct NewPlan {
    pub branch: String,
}

pub struct NewPrechecked {
    path: PathBuf,
    base: String,
}

impl MutationPlan for NewPlan {
    type Prechecked = NewPrechecked;
    type Outcome = CreateOutcome;

    fn action(&self) -> &'static str {
        "new"
    }

    fn precheck(&self, ws: &Workspace) -> Result<NewPrechecked> {
        let base = ws.base_branch().ok_or_else(|| {
            WorktreeError::invalid_argument(
                "cannot resolve a base branch; set git.baseBranch in the configuration",
            )
        })?;

        if let Some(path) = ws.find_attached(&self.branch)? {
            return Err(WorktreeError::BranchAlreadyAttached {
                branch: self.branch.clone(),
                path,
            });
        }
        if ws.git.branch_exists(&ws.ctx.repo_root, &self.branch)? {
            return Err(WorktreeError::BranchAlreadyExists {
                branch: self.branch.clone(),
            });
        }

        let path = ws.branch_path(&self.branch)?;
        ws.ensure_target_path_free(&path)?;

        Ok(NewPrechecked { path, base })
    }

    fn hook_target(&self, pre: &NewPrechecked) -> HookTarget {
        HookTarget {
            branch: Some(self.branch.clone()),
            worktree_path: Some(pre.path.clone()),
            extra_env: vec![("WT_BASE_BRANCH".into(), pre.base.clone())],
        }
    }

    fn run_vcs(&self, ws: &Workspace, pre: &NewPrechecked) -> Result<CreateOutcome> {
        create_parent_dirs(&pre.path)?;
        let path = pre.path.to_string_lossy();
        ws.git.run(
            &ws.ctx.repo_root,
            &["worktree", "add", "-b", &self.branch, &path, &pre.base],
        )?;
        Ok(CreateOutcome {
            branch: self.branch.clone(),
            path: pre.path.clone(),
            status: CreateStatus::Created,
            base_branch: Some(pre.base.clone()),
        })
    }

    fn finalize(
        &self,
        ws: &Workspace,
        pre: &NewPrechecked,
        _outcome: &CreateOutcome,
    ) -> Result<()> {
        ws.lifecycle.upsert(&self.branch, Some(&pre.base), None)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// switch

pub struct SwitchPlan {
    pub branch: String,
}

pub enum SwitchPrechecked {
    /// Branch already has a worktree; nothing to create.
    Existing { path: PathBuf },
    /// Attach an existing local ref at `path`.
    Attach { path: PathBuf },
    /// Create the branch from `base` and attach it.
    CreateFromBase { path: PathBuf, base: String },
}

impl SwitchPrechecked {
    fn path(&self) -> &PathBuf {
        match self {
            SwitchPrechecked::Existing { path }
            | SwitchPrechecked::Attach { path }
            | SwitchPrechecked::CreateFromBase { path, .. } => path,
        }
    }
}

impl MutationPlan for SwitchPlan {
    type Prechecked = SwitchPrechecked;
    type Outcome = CreateOutcome;

    fn action(&self) -> &'static str {
        "switch"
    }

    fn precheck(&self, ws: &Workspace) -> Result<SwitchPrechecked> {
        if let Some(path) = ws.find_attached(&self.branch)? {
            return Ok(SwitchPrechecked::Existing { path });
        }

        let path = ws.branch_path(&self.branch)?;
        ws.ensure_target_path_free(&path)?;

        if ws.git.branch_exists(&ws.ctx.repo_root, &self.branch)? {
            Ok(SwitchPrechecked::Attach { path })
        } else {
            let base = ws.base_branch().ok_or_else(|| {
                WorktreeError::invalid_argument(
                    "cannot resolve a base branch; set git.baseBranch in the configuration",
                )
            })?;
            Ok(SwitchPrechecked::CreateFromBase { path, base })
        }
    }

    fn hook_target(&self, pre: &SwitchPrechecked) -> HookTarget {
        HookTarget {
            branch: Some(self.branch.clone()),
            worktree_path: Some(pre.path().clone()),
            extra_env: Vec::new(),
        }
    }

    fn run_vcs(&self, ws: &Workspace, pre: &SwitchPrechecked) -> Result<CreateOutcome> {
        let root = &ws.ctx.repo_root;
        match pre {
            SwitchPrechecked::Existing { path } => Ok(CreateOutcome {
                branch: self.branch.clone(),
                path: path.clone(),
                status: CreateStatus::Existing,
                base_branch: None,
            }),
            SwitchPrechecked::Attach { path } => {
                create_parent_dirs(path)?;
                let path_str = path.to_string_lossy();
                ws.git
                    .run(root, &["worktree", "add", &path_str, &self.branch])?;
                Ok(CreateOutcome {
                    branch: self.branch.clone(),
                    path: path.clone(),
                    status: CreateStatus::Created,
                    base_branch: None,
                })
            }
            SwitchPrechecked::CreateFromBase { path, base } => {
                create_parent_dirs(path)?;
                let path_str = path.to_string_lossy();
                ws.git.run(
                    root,
                    &["worktree", "add", "-b", &self.branch, &path_str, base],
                )?;
                Ok(CreateOutcome {
                    branch: self.branch.clone(),
                    path: path.clone(),
                    status: CreateStatus::Created,
                    base_branch: Some(base.clone()),
                })
            }
        }
    }

    fn finalize(
        &self,
        ws: &Workspace,
        _pre: &SwitchPrechecked,
        outcome: &CreateOutcome,
    ) -> Result<()> {
        let base = outcome
            .base_branch
            .clone()
            .or_else(|| ws.base_branch());
        ws.lifecycle
            .upsert(&self.branch, base.as_deref(), None)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// get

pub struct GetPlan {
    /// Raw `<remote>/<branch>` argument.
    pub remote_branch: String,
}

pub struct GetPrechecked {
    remote: String,
    branch: String,
    path: PathBuf,
}

impl GetPlan {
    fn parse(&self) -> Result<(String, String)> {
        match self.remote_branch.split_once('/') {
            Some((remote, branch)) if !remote.is_empty() && !branch.is_empty() => {
                Ok((remote.to_string(), branch.to_string()))
            }
            _ => Err(WorktreeError::InvalidRemoteBranchFormat {
                input: self.remote_branch.clone(),
            }),
        }
    }
}

impl MutationPlan for GetPlan {
    type Prechecked = GetPrechecked;
    type Outcome = CreateOutcome;

    fn action(&self) -> &'static str {
        "get"
    }

    fn precheck(&self, ws: &Workspace) -> Result<GetPrechecked> {
        let (remote, branch) = self.parse()?;
        if !ws.git.remotes(&ws.ctx.repo_root)?.contains(&remote) {
            return Err(WorktreeError::RemoteNotFound { remote });
        }
        let path = ws.branch_path(&branch)?;
        Ok(GetPrechecked {
            remote,
            branch,
            path,
        })
    }

    fn hook_target(&self, pre: &GetPrechecked) -> HookTarget {
        HookTarget {
            branch: Some(pre.branch.clone()),
            worktree_path: Some(pre.path.clone()),
            extra_env: vec![("WT_REMOTE".into(), pre.remote.clone())],
        }
    }

    fn run_vcs(&self, ws: &Workspace, pre: &GetPrechecked) -> Result<CreateOutcome> {
        let root = &ws.ctx.repo_root;

        if ws
            .git
            .run(root, &["fetch", &pre.remote, &pre.branch])
            .is_err()
        {
            return Err(WorktreeError::RemoteBranchNotFound {
                remote: pre.remote.clone(),
                branch: pre.branch.clone(),
            });
        }

        if !ws.git.branch_exists(root, &pre.branch)? {
            let tracking = format!("{}/{}", pre.remote, pre.branch);
            ws.git
                .run(root, &["branch", "--track", &pre.branch, &tracking])?;
        }

        if let Some(path) = ws.find_attached(&pre.branch)? {
            return Ok(CreateOutcome {
                branch: pre.branch.clone(),
                path,
                status: CreateStatus::Existing,
                base_branch: None,
            });
        }

        ws.ensure_target_path_free(&pre.path)?;
        create_parent_dirs(&pre.path)?;
        let path_str = pre.path.to_string_lossy();
        ws.git
            .run(root, &["worktree", "add", &path_str, &pre.branch])?;
        Ok(CreateOutcome {
            branch: pre.branch.clone(),
            path: pre.path.clone(),
            status: CreateStatus::Created,
            base_branch: None,
        })
    }

    fn finalize(
        &self,
        ws: &Workspace,
        pre: &GetPrechecked,
        _outcome: &CreateOutcome,
    ) -> Result<()> {
        let base = ws.base_branch();
        ws.lifecycle.upsert(&pre.branch, base.as_deref(), None)?;
        Ok(())
    }
}
