//! Per-branch advisory lock records.
//!
//! These are metadata, not mutual-exclusion primitives: they mark a
//! worktree as in use (by a person or an agent) so destructive commands
//! refuse to touch it without a force flag.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::path::worktree_id;
use crate::store;
use crate::utils::{get_now, hostname};

pub const LOCK_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub schema_version: u32,
    pub branch: String,
    pub worktree_id: String,
    pub reason: String,
    pub owner: String,
    pub host: String,
    pub pid: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

/// How a lock surfaces in a snapshot: a present but unreadable record still
/// counts as locked so nothing destructive proceeds on bad metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockState {
    pub value: bool,
    pub reason: Option<String>,
    pub owner: Option<String>,
}

impl LockState {
    pub fn unlocked() -> Self {
        LockState {
            value: false,
            reason: None,
            owner: None,
        }
    }

    pub fn invalid() -> Self {
        LockState {
            value: true,
            reason: Some("invalid lock metadata".to_string()),
            owner: None,
        }
    }
}

/// Store of per-branch lock records under `<metaRoot>/locks/`.
#[derive(Debug, Clone)]
pub struct LockStore {
    dir: PathBuf,
}

impl LockStore {
    pub fn new(locks_dir: PathBuf) -> Self {
        LockStore { dir: locks_dir }
    }

    fn path_for(&self, branch: &str) -> PathBuf {
        self.dir.join(format!("{}.json", worktree_id(branch)))
    }

    pub fn read(&self, branch: &str) -> Result<store::ReadOutcome<LockRecord>> {
        store::read_record(&self.path_for(branch), |r: &LockRecord| {
            r.schema_version == LOCK_SCHEMA_VERSION && !r.reason.is_empty()
        })
    }

    /// The snapshot-facing view of the lock facet.
    pub fn state(&self, branch: &str) -> Result<LockState> {
        let outcome = self.read(branch)?;
        Ok(match (outcome.exists, outcome.record) {
            (false, _) => LockState::unlocked(),
            (true, Some(record)) => LockState {
                value: true,
                reason: Some(record.reason),
                owner: Some(record.owner),
            },
            (true, None) => LockState::invalid(),
        })
    }

    /// Create or refresh the lock. `created_at` survives updates; `host`,
    /// `pid`, and `updated_at` are always stamped fresh.
    pub fn upsert(&self, branch: &str, reason: &str, owner: &str) -> Result<LockRecord> {
        let now = get_now();
        let previous = self.read(branch)?.record;
        let record = LockRecord {
            schema_version: LOCK_SCHEMA_VERSION,
            branch: branch.to_string(),
            worktree_id: worktree_id(branch),
            reason: reason.to_string(),
            owner: owner.to_string(),
            host: hostname(),
            pid: std::process::id(),
            created_at: previous.as_ref().map_or(now, |p| p.created_at),
            updated_at: now,
        };
        store::write_atomically(&self.path_for(branch), &record, true)?;
        Ok(record)
    }

    /// Remove the lock; `false` when none existed.
    pub fn delete(&self, branch: &str) -> Result<bool> {
        store::delete_record(&self.path_for(branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LockStore {
        LockStore::new(dir.path().join("locks"))
    }

    #[test]
    fn absent_lock_reads_unlocked() {
        let dir = TempDir::new().unwrap();
        let state = store_in(&dir).state("feature/a").unwrap();
        assert_eq!(state, LockState::unlocked());
    }

    #[test]
    fn upsert_then_state_round_trips() {
        let dir = TempDir::new().unwrap();
        let locks = store_in(&dir);
        locks.upsert("feature/a", "busy", "alice").unwrap();

        let state = locks.state("feature/a").unwrap();
        assert!(state.value);
        assert_eq!(state.reason.as_deref(), Some("busy"));
        assert_eq!(state.owner.as_deref(), Some("alice"));
    }

    #[test]
    fn upsert_preserves_created_at() {
        let dir = TempDir::new().unwrap();
        let locks = store_in(&dir);
        let first = locks.upsert("feature/a", "busy", "alice").unwrap();
        let second = locks.upsert("feature/a", "still busy", "bob").unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.owner, "bob");
    }

    #[test]
    fn invalid_metadata_still_counts_as_locked() {
        let dir = TempDir::new().unwrap();
        let locks = store_in(&dir);
        let path = dir
            .path()
            .join("locks")
            .join(format!("{}.json", worktree_id("feature/a")));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{broken").unwrap();

        let state = locks.state("feature/a").unwrap();
        assert_eq!(state, LockState::invalid());
    }

    #[test]
    fn empty_reason_is_invalid() {
        let dir = TempDir::new().unwrap();
        let locks = store_in(&dir);
        let record = LockRecord {
            schema_version: LOCK_SCHEMA_VERSION,
            branch: "feature/a".into(),
            worktree_id: worktree_id("feature/a"),
            reason: String::new(),
            owner: "alice".into(),
            host: "host".into(),
            pid: 1,
            created_at: 1,
            updated_at: 1,
        };
        let path = dir
            .path()
            .join("locks")
            .join(format!("{}.json", worktree_id("feature/a")));
        crate::store::write_atomically(&path, &record, true).unwrap();
        assert_eq!(locks.state("feature/a").unwrap(), LockState::invalid());
    }

    #[test]
    fn delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let locks = store_in(&dir);
        locks.upsert("feature/a", "busy", "alice").unwrap();
        assert!(locks.delete("feature/a").unwrap());
        assert!(!locks.delete("feature/a").unwrap());
        assert!(!locks.state("feature/a").unwrap().value);
    }
}
