//! Worktree-state snapshot engine.
//!
//! Gathers every working tree with its dirty/lock/merged/PR/upstream
//! facets. Facets fan out on the rayon pool, one task per working tree;
//! the PR batch is resolved once up front. Read paths snapshot without the
//! repo lock; write paths re-snapshot under it.

pub mod merged;

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::Config;
use crate::errors::Result;
use crate::git::{GitDriver, WorktreeEntry};
use crate::lifecycle::LifecycleStore;
use crate::locks::{LockState, LockStore};
use crate::path::{RepoContext, managed_worktree_root};
use crate::pr::{PrQuery, PrState, PrStatus, resolve_pr_state_by_branch_batch};

pub use merged::{MergedState, resolve_merged_overall};

/// Upstream facet: `None` scalars mean the probe could not answer, not
/// "zero".
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct UpstreamState {
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
    pub remote: Option<String>,
}

/// PR facet as rendered: the base branch (and detached trees) carry
/// `status: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct PrFacet {
    pub status: Option<PrStatus>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeStatus {
    #[serde(flatten)]
    pub entry: WorktreeEntry,
    pub is_primary: bool,
    pub is_managed: bool,
    pub dirty: Option<bool>,
    pub locked: LockState,
    pub upstream: UpstreamState,
    pub pr: PrFacet,
    pub merged: MergedState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub repo_root: PathBuf,
    pub base_branch: Option<String>,
    pub worktrees: Vec<WorktreeStatus>,
}

impl Snapshot {
    pub fn find_branch(&self, branch: &str) -> Option<&WorktreeStatus> {
        self.worktrees
            .iter()
            .find(|wt| wt.entry.branch.as_deref() == Some(branch))
    }

    pub fn find_path(&self, path: &Path) -> Option<&WorktreeStatus> {
        self.worktrees.iter().find(|wt| wt.entry.path == path)
    }

    pub fn primary(&self) -> Option<&WorktreeStatus> {
        self.worktrees.iter().find(|wt| wt.is_primary)
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub gh_enabled: bool,
}

pub struct SnapshotEngine<'a> {
    pub git: &'a GitDriver,
    pub ctx: &'a RepoContext,
    pub config: &'a Config,
}

impl SnapshotEngine<'_> {
    /// Resolve the integration base: configured branch first, then the
    /// configured remote's HEAD, then `main`, then `master`.
    pub fn resolve_base_branch(&self) -> Option<String> {
        let root = &self.ctx.repo_root;
        if let Some(base) = &self.config.base_branch {
            return Some(base.clone());
        }
        if let Some(remote) = &self.config.base_remote
            && let Ok(Some(head)) = self.git.rev_parse_abbrev(root, &format!("{remote}/HEAD"))
            && let Some(branch) = head.strip_prefix(&format!("{remote}/"))
        {
            return Some(branch.to_string());
        }
        for candidate in ["main", "master"] {
            if self.git.branch_exists(root, candidate).unwrap_or(false) {
                return Some(candidate.to_string());
            }
        }
        None
    }

    /// Collect the full snapshot.
    pub fn collect(&self, options: &SnapshotOptions) -> Result<Snapshot> {
        let root = &self.ctx.repo_root;
        let base_branch = self.resolve_base_branch();

        let entries: Vec<WorktreeEntry> = self
            .git
            .list_worktrees(root)?
            .into_iter()
            .filter(|entry| !entry.bare)
            .collect();

        let branches: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry.branch.clone())
            .collect();
        let pr_states = resolve_pr_state_by_branch_batch(&PrQuery {
            repo_root: root,
            base_branch: base_branch.as_deref(),
            branches,
            enabled: options.gh_enabled,
        });

        let managed_root = managed_worktree_root(root, &self.config.worktree_root);
        let locks = LockStore::new(self.ctx.locks_dir());
        let lifecycle = LifecycleStore::new(self.ctx.branch_state_dir());
        let probe = merged::MergedProbe {
            git: self.git,
            repo_root: root,
            lifecycle: &lifecycle,
        };

        let worktrees: Vec<WorktreeStatus> = entries
            .into_par_iter()
            .map(|entry| {
                self.status_for(&entry, base_branch.as_deref(), &pr_states, &managed_root, &locks, &probe)
            })
            .collect();

        Ok(Snapshot {
            repo_root: root.clone(),
            base_branch,
            worktrees,
        })
    }

    fn status_for(
        &self,
        entry: &WorktreeEntry,
        base_branch: Option<&str>,
        pr_states: &indexmap::IndexMap<String, PrState>,
        managed_root: &Path,
        locks: &LockStore,
        probe: &merged::MergedProbe<'_>,
    ) -> WorktreeStatus {
        let is_primary = entry.path == self.ctx.repo_root;
        let is_managed = entry.path.starts_with(managed_root);

        let dirty = self.git.is_dirty(&entry.path).ok();

        let locked = match &entry.branch {
            Some(branch) => locks.state(branch).unwrap_or_else(|_| LockState::invalid()),
            None => LockState::unlocked(),
        };

        let upstream = match &entry.branch {
            Some(branch) => self.upstream_facet(branch),
            None => UpstreamState::default(),
        };

        let is_base = entry.branch.as_deref() == base_branch && base_branch.is_some();
        let pr = match &entry.branch {
            Some(branch) if !is_base => pr_states
                .get(branch)
                .map(|state| PrFacet {
                    status: Some(state.status),
                    url: state.url.clone(),
                })
                .unwrap_or_default(),
            _ => PrFacet::default(),
        };

        let merged = match &entry.branch {
            Some(branch) if !is_base => {
                probe.decide(branch, &entry.head, base_branch, pr.status)
            }
            _ => MergedState::default(),
        };

        WorktreeStatus {
            entry: entry.clone(),
            is_primary,
            is_managed,
            dirty,
            locked,
            upstream,
            pr,
            merged,
        }
    }

    fn upstream_facet(&self, branch: &str) -> UpstreamState {
        let root = &self.ctx.repo_root;
        let Ok(Some(upstream)) = self.git.upstream_of(root, branch) else {
            return UpstreamState::default();
        };
        let remote = upstream.split('/').next().map(String::from);
        match self.git.ahead_behind(root, branch, &upstream) {
            Ok(Some((ahead, behind))) => UpstreamState {
                ahead: Some(ahead),
                behind: Some(behind),
                remote,
            },
            _ => UpstreamState {
                ahead: None,
                behind: None,
                remote,
            },
        }
    }
}
