//! The three-way merged decision.
//!
//! Three independent evidence sources are reconciled: ancestry (what git
//! says right now), PR metadata (what the forge says), and the lifecycle
//! record (what we have ever observed). The composition implements the
//! "pass once, pass always" rule: once a branch is seen diverged from
//! base, a later "contained" verdict counts as merged only if the recorded
//! diverged head is itself contained. A rebase of base onto the branch
//! does not count.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::git::GitDriver;
use crate::lifecycle::LifecycleStore;
use crate::pr::PrStatus;

/// Reflog subjects that create work on the branch. Everything else
/// (checkout, reset, fetch, ...) moves the ref without authoring anything.
static WORK_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(commit(?:\s\([^)]*\))?|cherry-pick|revert|rebase \(pick\)|merge):")
        .expect("work-subject regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MergedState {
    pub by_ancestry: Option<bool>,
    pub by_pr: Option<bool>,
    pub by_lifecycle: Option<bool>,
    pub overall: Option<bool>,
}

pub struct MergedProbe<'a> {
    pub git: &'a GitDriver,
    pub repo_root: &'a Path,
    pub lifecycle: &'a LifecycleStore,
}

impl MergedProbe<'_> {
    /// Decide the merged facet for one branch.
    ///
    /// `head` is the branch's current commit; `pr_status` comes from the
    /// batched provider (None when the branch was not queried, e.g. the
    /// base itself).
    pub fn decide(
        &self,
        branch: &str,
        head: &str,
        base_branch: Option<&str>,
        pr_status: Option<PrStatus>,
    ) -> MergedState {
        let by_pr = match pr_status {
            Some(PrStatus::Merged) => Some(true),
            Some(PrStatus::None | PrStatus::Open | PrStatus::ClosedUnmerged) => Some(false),
            Some(PrStatus::Unknown) | None => None,
        };

        let Some(base) = base_branch else {
            return MergedState {
                by_ancestry: None,
                by_pr,
                by_lifecycle: None,
                overall: resolve_merged_overall(None, by_pr, None),
            };
        };

        let by_ancestry = self
            .git
            .is_ancestor(self.repo_root, branch, base)
            .unwrap_or(None);

        // Record the observation before interpreting it; the lifecycle is
        // evidence for future snapshots even when this one errors out.
        let observed = (by_ancestry == Some(false)).then_some(head);
        if let Err(e) = self.lifecycle.upsert(branch, Some(base), observed) {
            log::warn!("lifecycle upsert failed for {branch}: {e}");
        }

        let by_lifecycle = match by_ancestry {
            Some(false) => Some(false),
            Some(true) => self.lifecycle_verdict(branch, base, by_pr),
            None => None,
        };

        MergedState {
            by_ancestry,
            by_pr,
            by_lifecycle,
            overall: resolve_merged_overall(by_ancestry, by_pr, by_lifecycle),
        }
    }

    /// Ancestry says "contained"; decide whether that means merged.
    fn lifecycle_verdict(&self, branch: &str, base: &str, by_pr: Option<bool>) -> Option<bool> {
        let record = self
            .lifecycle
            .read(branch)
            .ok()
            .and_then(|outcome| outcome.record);

        if let Some(record) = &record
            && record.ever_diverged
            && let Some(diverged_head) = &record.last_diverged_head
        {
            // Prior divergence on file: merged only if that head made it
            // into base.
            return self
                .git
                .is_ancestor(self.repo_root, diverged_head, base)
                .unwrap_or(None);
        }

        if by_pr == Some(true) {
            // No divergence evidence of our own; trust the PR.
            return None;
        }

        let scan = self.scan_reflog(branch, base);
        if let Some(diverged_head) = &scan.diverged_head
            && let Err(e) = self.lifecycle.upsert(branch, Some(base), Some(diverged_head))
        {
            log::warn!("lifecycle upsert failed for {branch}: {e}");
        }
        scan.merged
    }

    /// Walk the branch reflog for work-creating entries and test each
    /// referenced head against base, newest first.
    fn scan_reflog(&self, branch: &str, base: &str) -> ReflogScan {
        let entries = self
            .git
            .reflog_entries(self.repo_root, branch)
            .unwrap_or_default();
        let work_heads: Vec<&str> = entries
            .iter()
            .filter(|(_, subject)| WORK_SUBJECT.is_match(subject))
            .map(|(head, _)| head.as_str())
            .collect();
        let latest = work_heads.first().map(|h| h.to_string());

        for head in &work_heads {
            match self.git.is_ancestor(self.repo_root, head, base).unwrap_or(None) {
                Some(true) => {
                    return ReflogScan {
                        merged: Some(true),
                        diverged_head: Some(head.to_string()),
                    };
                }
                Some(false) => continue,
                None => {
                    return ReflogScan {
                        merged: None,
                        diverged_head: latest,
                    };
                }
            }
        }

        ReflogScan {
            merged: Some(false),
            diverged_head: latest,
        }
    }
}

struct ReflogScan {
    merged: Option<bool>,
    diverged_head: Option<String>,
}

/// Compose the three verdicts. A positive PR or lifecycle verdict wins;
/// failing that, any single negative verdict decides; otherwise unknown.
pub fn resolve_merged_overall(
    by_ancestry: Option<bool>,
    by_pr: Option<bool>,
    by_lifecycle: Option<bool>,
) -> Option<bool> {
    if by_pr == Some(true) || by_lifecycle == Some(true) {
        return Some(true);
    }
    if by_ancestry == Some(false) || by_pr == Some(false) || by_lifecycle == Some(false) {
        return Some(false);
    }
    None
}
