//! Merge-lifecycle records: the persistent memory of prior divergence.
//!
//! A branch that was once ahead of base and is later reported "contained"
//! may have been merged, or base may simply have been rebased onto it. The
//! record keeps `everDiverged` and the last observed diverged head so the
//! snapshot engine can tell the two apart.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::path::worktree_id;
use crate::store;
use crate::utils::get_now;

pub const LIFECYCLE_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRecord {
    pub schema_version: u32,
    pub branch: String,
    pub worktree_id: String,
    pub base_branch: Option<String>,
    /// Once true, never resets.
    pub ever_diverged: bool,
    /// Latest observed diverged head; monotonically overwritten.
    pub last_diverged_head: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Store of lifecycle records under `<metaRoot>/state/branches/`.
#[derive(Debug, Clone)]
pub struct LifecycleStore {
    dir: PathBuf,
}

impl LifecycleStore {
    pub fn new(branch_state_dir: PathBuf) -> Self {
        LifecycleStore {
            dir: branch_state_dir,
        }
    }

    fn path_for(&self, branch: &str) -> PathBuf {
        self.dir.join(format!("{}.json", worktree_id(branch)))
    }

    /// Read the record. Legacy schema-version-1 records read as invalid and
    /// are replaced on the next upsert.
    pub fn read(&self, branch: &str) -> Result<store::ReadOutcome<LifecycleRecord>> {
        store::read_record(&self.path_for(branch), |r: &LifecycleRecord| {
            r.schema_version == LIFECYCLE_SCHEMA_VERSION
        })
    }

    /// Create or update the record for `branch`.
    ///
    /// `observed_diverged_head` is the head seen on a divergence probe, or
    /// `None` when no divergence was observed. `everDiverged` only ratchets
    /// up; `lastDivergedHead` keeps its previous value when nothing new was
    /// observed.
    pub fn upsert(
        &self,
        branch: &str,
        base_branch: Option<&str>,
        observed_diverged_head: Option<&str>,
    ) -> Result<LifecycleRecord> {
        let now = get_now();
        let previous = self.read(branch)?.record;

        let record = match previous {
            Some(prev) => LifecycleRecord {
                schema_version: LIFECYCLE_SCHEMA_VERSION,
                branch: branch.to_string(),
                worktree_id: worktree_id(branch),
                base_branch: base_branch.map(String::from).or(prev.base_branch),
                ever_diverged: prev.ever_diverged || observed_diverged_head.is_some(),
                last_diverged_head: observed_diverged_head
                    .map(String::from)
                    .or(prev.last_diverged_head),
                created_at: prev.created_at,
                updated_at: now,
            },
            None => LifecycleRecord {
                schema_version: LIFECYCLE_SCHEMA_VERSION,
                branch: branch.to_string(),
                worktree_id: worktree_id(branch),
                base_branch: base_branch.map(String::from),
                ever_diverged: observed_diverged_head.is_some(),
                last_diverged_head: observed_diverged_head.map(String::from),
                created_at: now,
                updated_at: now,
            },
        };

        store::write_atomically(&self.path_for(branch), &record, true)?;
        Ok(record)
    }

    /// Move the record from `old_branch` to `new_branch`: write at the
    /// target id (renaming the branch inside), then delete the source.
    pub fn rename(&self, old_branch: &str, new_branch: &str) -> Result<Option<LifecycleRecord>> {
        let Some(previous) = self.read(old_branch)?.record else {
            return Ok(None);
        };
        let record = LifecycleRecord {
            branch: new_branch.to_string(),
            worktree_id: worktree_id(new_branch),
            updated_at: get_now(),
            ..previous
        };
        store::write_atomically(&self.path_for(new_branch), &record, true)?;
        store::delete_record(&self.path_for(old_branch))?;
        Ok(Some(record))
    }

    pub fn delete(&self, branch: &str) -> Result<bool> {
        store::delete_record(&self.path_for(branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LifecycleStore {
        LifecycleStore::new(dir.path().join("state/branches"))
    }

    #[test]
    fn fresh_record_without_divergence() {
        let dir = TempDir::new().unwrap();
        let lifecycle = store_in(&dir);
        let record = lifecycle.upsert("feature/a", Some("main"), None).unwrap();
        assert!(!record.ever_diverged);
        assert_eq!(record.last_diverged_head, None);
        assert_eq!(record.base_branch.as_deref(), Some("main"));
    }

    #[test]
    fn divergence_ratchets_and_never_resets() {
        let dir = TempDir::new().unwrap();
        let lifecycle = store_in(&dir);
        lifecycle
            .upsert("feature/a", Some("main"), Some("abc123"))
            .unwrap();
        let record = lifecycle.upsert("feature/a", Some("main"), None).unwrap();
        assert!(record.ever_diverged);
        assert_eq!(record.last_diverged_head.as_deref(), Some("abc123"));
    }

    #[test]
    fn last_diverged_head_is_overwritten_by_newer_observation() {
        let dir = TempDir::new().unwrap();
        let lifecycle = store_in(&dir);
        lifecycle
            .upsert("feature/a", Some("main"), Some("abc123"))
            .unwrap();
        let record = lifecycle
            .upsert("feature/a", Some("main"), Some("def456"))
            .unwrap();
        assert_eq!(record.last_diverged_head.as_deref(), Some("def456"));
    }

    #[test]
    fn created_at_survives_updates() {
        let dir = TempDir::new().unwrap();
        let lifecycle = store_in(&dir);
        let first = lifecycle.upsert("feature/a", Some("main"), None).unwrap();
        let second = lifecycle
            .upsert("feature/a", Some("main"), Some("abc"))
            .unwrap();
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn rename_round_trip_preserves_created_at() {
        let dir = TempDir::new().unwrap();
        let lifecycle = store_in(&dir);
        let original = lifecycle
            .upsert("feature/a", Some("main"), Some("abc"))
            .unwrap();

        lifecycle.rename("feature/a", "feature/b").unwrap().unwrap();
        assert!(lifecycle.read("feature/a").unwrap().record.is_none());

        let renamed = lifecycle.read("feature/b").unwrap().record.unwrap();
        assert_eq!(renamed.branch, "feature/b");
        assert_eq!(renamed.created_at, original.created_at);
        assert!(renamed.ever_diverged);

        // And back again
        lifecycle.rename("feature/b", "feature/a").unwrap().unwrap();
        let restored = lifecycle.read("feature/a").unwrap().record.unwrap();
        assert_eq!(restored.created_at, original.created_at);
        assert_eq!(restored.last_diverged_head, original.last_diverged_head);
    }

    #[test]
    fn rename_of_missing_record_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let lifecycle = store_in(&dir);
        assert!(lifecycle.rename("ghost", "feature/b").unwrap().is_none());
    }

    #[test]
    fn legacy_v1_record_is_ignored_and_replaced() {
        let dir = TempDir::new().unwrap();
        let lifecycle = store_in(&dir);
        let path = dir
            .path()
            .join("state/branches")
            .join(format!("{}.json", worktree_id("feature/a")));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "{\"schemaVersion\":1,\"branch\":\"feature/a\",\"createdHead\":\"abc\"}\n",
        )
        .unwrap();

        let outcome = lifecycle.read("feature/a").unwrap();
        assert!(outcome.exists);
        assert!(!outcome.valid);
        assert!(outcome.record.is_none());

        let record = lifecycle
            .upsert("feature/a", Some("main"), Some("def"))
            .unwrap();
        assert_eq!(record.schema_version, LIFECYCLE_SCHEMA_VERSION);
        assert!(record.ever_diverged);
    }
}
