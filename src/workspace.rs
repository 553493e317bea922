//! Workspace: everything one invocation needs, resolved once.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::errors::{Result, WorktreeError};
use crate::git::GitDriver;
use crate::hooks::HookRuntime;
use crate::lifecycle::LifecycleStore;
use crate::locks::LockStore;
use crate::path::{RepoContext, branch_to_worktree_path, managed_worktree_root};
use crate::snapshot::{Snapshot, SnapshotEngine, SnapshotOptions};

/// Global-flag overrides applied on top of the layered configuration.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub hooks: Option<bool>,
    pub gh: Option<bool>,
    pub hook_timeout_ms: Option<u64>,
    pub lock_timeout_ms: Option<u64>,
}

pub struct Workspace {
    pub git: GitDriver,
    pub ctx: RepoContext,
    pub config: Config,
    pub hooks: HookRuntime,
    pub locks: LockStore,
    pub lifecycle: LifecycleStore,
    pub gh_enabled: bool,
}

impl Workspace {
    /// Discover the repository from `cwd`, load the layered config, and
    /// apply CLI overrides.
    pub fn discover(cwd: &Path, overrides: &Overrides) -> Result<Workspace> {
        let git = GitDriver::new();
        let ctx = RepoContext::resolve(&git, cwd)?;

        let mut config = Config::load(&ctx.repo_root, cwd)?;
        config.check_worktree_root(&ctx.repo_root, &ctx.git_common_dir)?;
        if let Some(timeout) = overrides.hook_timeout_ms {
            config.hook_timeout_ms = timeout;
        }
        if let Some(timeout) = overrides.lock_timeout_ms {
            config.lock_timeout_ms = timeout;
        }

        let hooks_enabled = overrides.hooks.unwrap_or(config.hooks_enabled);
        let gh_enabled = overrides.gh.unwrap_or(config.github_enabled);

        let hooks = HookRuntime::new(
            ctx.hooks_dir(),
            ctx.logs_dir(),
            ctx.repo_root.clone(),
            hooks_enabled,
            config.hook_timeout_ms,
        );
        let locks = LockStore::new(ctx.locks_dir());
        let lifecycle = LifecycleStore::new(ctx.branch_state_dir());

        Ok(Workspace {
            git,
            ctx,
            config,
            hooks,
            locks,
            lifecycle,
            gh_enabled,
        })
    }

    pub fn worktree_root(&self) -> PathBuf {
        managed_worktree_root(&self.ctx.repo_root, &self.config.worktree_root)
    }

    /// Managed path for `branch`, validated against escapes.
    pub fn branch_path(&self, branch: &str) -> Result<PathBuf> {
        branch_to_worktree_path(&self.worktree_root(), branch)
    }

    pub fn snapshot_engine(&self) -> SnapshotEngine<'_> {
        SnapshotEngine {
            git: &self.git,
            ctx: &self.ctx,
            config: &self.config,
        }
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        self.snapshot_engine().collect(&SnapshotOptions {
            gh_enabled: self.gh_enabled,
        })
    }

    pub fn base_branch(&self) -> Option<String> {
        self.snapshot_engine().resolve_base_branch()
    }

    pub fn is_initialized(&self) -> bool {
        self.ctx.state_dir().is_dir()
    }

    /// Mutating commands (except `init`) require the managed layout.
    pub fn validate_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(WorktreeError::invalid_argument(
                "repository is not initialized for worktree management; run `vdew init` first",
            ))
        }
    }

    /// Path of the worktree `branch` is checked out in, if any.
    pub fn find_attached(&self, branch: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .git
            .list_worktrees(&self.ctx.repo_root)?
            .into_iter()
            .find(|wt| wt.branch.as_deref() == Some(branch))
            .map(|wt| wt.path))
    }

    /// The target path must be missing or an empty directory.
    pub fn ensure_target_path_free(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        if path.is_dir() && path.read_dir()?.next().is_none() {
            return Ok(());
        }
        Err(WorktreeError::TargetPathNotEmpty {
            path: path.to_path_buf(),
        })
    }
}
