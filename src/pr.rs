//! Pull-request provider: one batched `gh pr list` query per snapshot.
//!
//! Failures never propagate. A missing `gh`, a non-zero exit, and
//! unparseable output all degrade every entry to `unknown`, and the
//! merge decision is built so `unknown` never decides the outcome alone.

use std::path::Path;
use std::process::Command;

use indexmap::IndexMap;
use serde::Deserialize;

/// Merge status of a branch according to the hosted PR tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PrStatus {
    None,
    Open,
    Merged,
    ClosedUnmerged,
    Unknown,
}

/// Per-branch result of the batched lookup.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PrState {
    pub status: PrStatus,
    pub url: Option<String>,
}

impl PrState {
    fn unknown() -> Self {
        PrState {
            status: PrStatus::Unknown,
            url: None,
        }
    }

    fn none() -> Self {
        PrState {
            status: PrStatus::None,
            url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPr {
    #[serde(rename = "headRefName")]
    head_ref_name: String,
    #[serde(default)]
    state: String,
    #[serde(rename = "mergedAt", default)]
    merged_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl RawPr {
    fn status(&self) -> PrStatus {
        if self.merged_at.as_deref().is_some_and(|m| !m.is_empty()) {
            return PrStatus::Merged;
        }
        match self.state.to_ascii_uppercase().as_str() {
            "MERGED" => PrStatus::Merged,
            "OPEN" => PrStatus::Open,
            "CLOSED" => PrStatus::ClosedUnmerged,
            _ => PrStatus::Unknown,
        }
    }
}

pub struct PrQuery<'a> {
    pub repo_root: &'a Path,
    pub base_branch: Option<&'a str>,
    pub branches: Vec<String>,
    pub enabled: bool,
}

/// Resolve PR state for a batch of branches with a single `gh` invocation.
///
/// The base branch itself is never queried; callers exclude it. With
/// `enabled: false` every branch maps to `unknown` without spawning
/// anything.
pub fn resolve_pr_state_by_branch_batch(query: &PrQuery<'_>) -> IndexMap<String, PrState> {
    let mut results = IndexMap::new();

    let Some(base_branch) = query.base_branch else {
        return results;
    };
    let branches: Vec<&String> = query
        .branches
        .iter()
        .filter(|b| b.as_str() != base_branch)
        .collect();
    if branches.is_empty() {
        return results;
    }

    if !query.enabled {
        for branch in branches {
            results.insert(branch.clone(), PrState::unknown());
        }
        return results;
    }

    match query_gh(query.repo_root, base_branch, &branches) {
        Some(raw) => {
            for branch in &branches {
                results.insert((*branch).clone(), best_record_for(branch, &raw));
            }
        }
        None => {
            for branch in branches {
                results.insert(branch.clone(), PrState::unknown());
            }
        }
    }

    results
}

/// Pick the freshest record for a branch: greatest `updatedAt`, ties broken
/// by record order. Branches with no record at all map to `none`.
fn best_record_for(branch: &str, records: &[RawPr]) -> PrState {
    let mut best: Option<&RawPr> = None;
    for record in records.iter().filter(|r| r.head_ref_name == *branch) {
        let newer = match best {
            None => true,
            Some(current) => record.updated_at.as_deref() > current.updated_at.as_deref(),
        };
        if newer {
            best = Some(record);
        }
    }
    match best {
        Some(record) => PrState {
            status: record.status(),
            url: record.url.clone(),
        },
        None => PrState::none(),
    }
}

fn query_gh(repo_root: &Path, base_branch: &str, branches: &[&String]) -> Option<Vec<RawPr>> {
    which::which("gh").ok()?;

    let search = branches
        .iter()
        .map(|b| format!("head:{b}"))
        .collect::<Vec<_>>()
        .join(" OR ");
    let limit = (branches.len().max(10) * 4).to_string();

    let output = Command::new("gh")
        .args([
            "pr",
            "list",
            "--base",
            base_branch,
            "--state",
            "all",
            "--search",
            &search,
            "--json",
            "headRefName,state,mergedAt,updatedAt,url",
            "--limit",
            &limit,
        ])
        .current_dir(repo_root)
        .output()
        .ok()?;

    if !output.status.success() {
        log::debug!(
            "gh pr list failed (exit {:?}): {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    serde_json::from_slice::<Vec<RawPr>>(&output.stdout)
        .map_err(|e| log::debug!("gh pr list output unparseable: {e}"))
        .ok()
}
