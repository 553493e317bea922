//! Mutation pipeline: every mutating command runs as a plan under the
//! repository lock, wrapped in the hook lifecycle.
//!
//! Order: repo lock, initialized check (except `init`), precheck, pre-hook,
//! VCS action, finalize, post-hook. A pre-hook failure terminates before
//! any VCS invocation; stash-bearing plans register a restore callback for
//! that case.

mod adopt;
mod create;
mod init;
mod remove;
mod rename;
mod stash;

pub use adopt::{AdoptOutcome, AdoptPlan, adopt_candidates};
pub use create::{CreateOutcome, CreateStatus, GetPlan, NewPlan, SwitchPlan};
pub use init::{InitOutcome, InitPlan};
pub use remove::{DelFlags, DelOutcome, DelPlan, GoneOutcome, GonePlan, gone_candidates};
pub use rename::{MvOutcome, MvPlan};
pub use stash::{
    AbsorbOutcome, AbsorbPlan, ExtractOutcome, ExtractPlan, UnabsorbOutcome, UnabsorbPlan,
    UseOutcome, UsePlan,
};

use std::path::PathBuf;

use crate::errors::Result;
use crate::hooks::HookInvocation;
use crate::repo_lock::{RepoLockOptions, with_repo_lock};
use crate::workspace::Workspace;

/// Who the hooks run for: injected into the `WT_*` environment.
#[derive(Debug, Clone, Default)]
pub struct HookTarget {
    pub branch: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub extra_env: Vec<(String, String)>,
}

/// A mutating command: precheck, VCS action, finalize.
pub trait MutationPlan {
    type Prechecked;
    type Outcome;

    /// Hook action name (`pre-<action>` / `post-<action>`).
    fn action(&self) -> &'static str;

    fn precheck(&self, ws: &Workspace) -> Result<Self::Prechecked>;

    fn hook_target(&self, pre: &Self::Prechecked) -> HookTarget;

    fn run_vcs(&self, ws: &Workspace, pre: &Self::Prechecked) -> Result<Self::Outcome>;

    fn finalize(
        &self,
        _ws: &Workspace,
        _pre: &Self::Prechecked,
        _outcome: &Self::Outcome,
    ) -> Result<()> {
        Ok(())
    }

    /// Stash-bearing plans undo their precheck stash when the pre-hook
    /// fails; everyone else has nothing to restore.
    fn pre_hook_restore(
        &self,
        _ws: &Workspace,
        _pre: &Self::Prechecked,
    ) -> Option<Box<dyn FnOnce() -> Result<()>>> {
        None
    }

    /// `init` runs before the managed layout exists.
    fn requires_initialized(&self) -> bool {
        true
    }
}

/// Execute a plan under the repository lock with the hook lifecycle.
pub fn run_plan<P: MutationPlan>(ws: &Workspace, plan: &P) -> Result<P::Outcome> {
    let options = RepoLockOptions {
        command: plan.action().to_string(),
        timeout_ms: ws.config.lock_timeout_ms,
        stale_ttl_seconds: ws.config.stale_lock_ttl_seconds,
    };

    with_repo_lock(&ws.ctx, &options, || {
        if plan.requires_initialized() {
            ws.validate_initialized()?;
        }

        let pre = plan.precheck(ws)?;
        let target = plan.hook_target(&pre);
        let invocation = HookInvocation {
            action: plan.action(),
            branch: target.branch.as_deref(),
            worktree_path: target.worktree_path.as_deref(),
            extra_env: target.extra_env.clone(),
        };

        match plan.pre_hook_restore(ws, &pre) {
            Some(restore) => ws.hooks.run_pre_with_restore(&invocation, restore)?,
            None => ws.hooks.run_pre(&invocation)?,
        }

        let outcome = plan.run_vcs(ws, &pre)?;
        plan.finalize(ws, &pre, &outcome)?;
        ws.hooks.run_post(&invocation, false)?;
        Ok(outcome)
    })
}
