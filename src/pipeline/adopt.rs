//! `adopt`: relocate stray worktrees into the managed root.

use std::path::PathBuf;

use serde::Serialize;

use super::{HookTarget, MutationPlan};
use crate::errors::Result;
use crate::snapshot::Snapshot;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptCandidate {
    pub branch: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptOutcome {
    pub adopted: Vec<AdoptCandidate>,
}

/// Non-managed non-primary trees that can move cleanly: skips detached
/// heads, locked branches, occupied target paths, and branches whose
/// managed path collides with another candidate. Sorted by source path for
/// deterministic output.
pub fn adopt_candidates(ws: &Workspace, snapshot: &Snapshot) -> Vec<AdoptCandidate> {
    let mut candidates: Vec<AdoptCandidate> = snapshot
        .worktrees
        .iter()
        .filter(|wt| !wt.is_primary && !wt.is_managed && !wt.locked.value)
        .filter_map(|wt| {
            let branch = wt.entry.branch.clone()?;
            let to = ws.branch_path(&branch).ok()?;
            if to.exists() {
                return None;
            }
            Some(AdoptCandidate {
                branch,
                from: wt.entry.path.clone(),
                to,
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.from.cmp(&b.from));

    // Two stray trees cannot claim the same managed path.
    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.to.clone()));
    candidates
}

pub struct AdoptPlan;

pub struct AdoptPrechecked {
    candidates: Vec<AdoptCandidate>,
}

impl MutationPlan for AdoptPlan {
    type Prechecked = AdoptPrechecked;
    type Outcome = AdoptOutcome;

    fn action(&self) -> &'static str {
        "adopt"
    }

    fn precheck(&self, ws: &Workspace) -> Result<AdoptPrechecked> {
        let snapshot = ws.snapshot()?;
        Ok(AdoptPrechecked {
            candidates: adopt_candidates(ws, &snapshot),
        })
    }

    fn hook_target(&self, _pre: &AdoptPrechecked) -> HookTarget {
        HookTarget::default()
    }

    fn run_vcs(&self, ws: &Workspace, pre: &AdoptPrechecked) -> Result<AdoptOutcome> {
        let root = &ws.ctx.repo_root;
        let mut adopted = Vec::new();
        for candidate in &pre.candidates {
            if let Some(parent) = candidate.to.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let from = candidate.from.to_string_lossy();
            let to = candidate.to.to_string_lossy();
            ws.git.run(root, &["worktree", "move", &from, &to])?;
            adopted.push(candidate.clone());
        }
        Ok(AdoptOutcome { adopted })
    }
}
