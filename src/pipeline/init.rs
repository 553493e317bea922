//! `init`: create the managed layout and the ignore block.

use std::path::PathBuf;

use serde::Serialize;

use super::{HookTarget, MutationPlan};
use crate::errors::Result;
use crate::path::{META_ROOT, TOOL_NAME};
use crate::workspace::Workspace;

pub struct InitPlan;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOutcome {
    pub meta_root: PathBuf,
    pub worktree_root: PathBuf,
    pub already_initialized: bool,
    pub exclude_updated: bool,
}

fn exclude_marker() -> String {
    format!("# {TOOL_NAME} (managed)")
}

impl MutationPlan for InitPlan {
    type Prechecked = ();
    type Outcome = InitOutcome;

    fn action(&self) -> &'static str {
        "init"
    }

    fn requires_initialized(&self) -> bool {
        false
    }

    fn precheck(&self, _ws: &Workspace) -> Result<()> {
        Ok(())
    }

    fn hook_target(&self, _pre: &()) -> HookTarget {
        HookTarget::default()
    }

    fn run_vcs(&self, ws: &Workspace, _pre: &()) -> Result<InitOutcome> {
        let already_initialized = ws.is_initialized();

        for dir in [
            ws.ctx.hooks_dir(),
            ws.ctx.logs_dir(),
            ws.ctx.locks_dir(),
            ws.ctx.branch_state_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        let worktree_root = ws.worktree_root();
        std::fs::create_dir_all(&worktree_root)?;

        let exclude_updated = self.append_exclude_block(ws)?;

        Ok(InitOutcome {
            meta_root: ws.ctx.meta_root(),
            worktree_root,
            already_initialized,
            exclude_updated,
        })
    }

    fn finalize(&self, _ws: &Workspace, _pre: &(), _outcome: &InitOutcome) -> Result<()> {
        Ok(())
    }
}

impl InitPlan {
    /// Append the managed block to `info/exclude` once; re-init finds the
    /// marker and leaves the file alone.
    fn append_exclude_block(&self, ws: &Workspace) -> Result<bool> {
        let exclude_path = ws.ctx.git_common_dir.join("info/exclude");
        let existing = match std::fs::read_to_string(&exclude_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let marker = exclude_marker();
        if existing.lines().any(|line| line == marker) {
            return Ok(false);
        }

        let mut block = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            block.push('\n');
        }
        block.push_str(&marker);
        block.push('\n');
        block.push_str(&format!("{}/\n", ws.config.worktree_root));
        block.push_str(&format!("{META_ROOT}/\n"));

        if let Some(parent) = exclude_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&exclude_path)?;
        file.write_all(block.as_bytes())?;
        Ok(true)
    }
}
