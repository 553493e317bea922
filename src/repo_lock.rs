//! Repository-wide mutation lock.
//!
//! A single sentinel file serializes every mutating command across
//! processes. Acquisition is exclusive-create; a holder that died is
//! recovered by the staleness rules below.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, WorktreeError};
use crate::path::{RepoContext, TOOL_NAME};
use crate::store;
use crate::utils::{get_now, hostname, username};

pub const REPO_LOCK_SCHEMA_VERSION: u32 = 1;

const ACQUIRE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoLockSentinel {
    pub schema_version: u32,
    pub owner: String,
    pub command: String,
    pub pid: u32,
    pub host: String,
    pub started_at: u64,
}

#[derive(Debug, Clone)]
pub struct RepoLockOptions {
    pub command: String,
    pub timeout_ms: u64,
    pub stale_ttl_seconds: u64,
}

/// Where the sentinel lives: the metadata state dir once `init` has run,
/// else a bootstrap path inside the git private directory (so `init`
/// itself is serialized too).
pub fn sentinel_path(ctx: &RepoContext) -> PathBuf {
    let state_dir = ctx.state_dir();
    if state_dir.is_dir() {
        state_dir.join("repo.lock")
    } else {
        ctx.git_common_dir.join(format!("{TOOL_NAME}.init.lock"))
    }
}

/// Run `task` while holding the repository lock.
///
/// The sentinel is removed on return or error. Waits in 100 ms polls until
/// `timeout_ms`, recovering stale sentinels along the way.
pub fn with_repo_lock<T>(
    ctx: &RepoContext,
    options: &RepoLockOptions,
    task: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let path = sentinel_path(ctx);
    acquire(&path, options)?;

    let result = task();
    if let Err(e) = store::delete_record(&path) {
        // The task outcome matters more than the unlink; the next run
        // recovers via the stale rules.
        log::warn!("failed to release repository lock {}: {e}", path.display());
    }
    result
}

fn acquire(path: &Path, options: &RepoLockOptions) -> Result<()> {
    let started = Instant::now();
    let timeout = Duration::from_millis(options.timeout_ms);

    loop {
        let sentinel = RepoLockSentinel {
            schema_version: REPO_LOCK_SCHEMA_VERSION,
            owner: username(),
            command: options.command.clone(),
            pid: std::process::id(),
            host: hostname(),
            started_at: get_now(),
        };
        if store::write_exclusively(path, &sentinel)? {
            return Ok(());
        }

        let current = store::read_record(path, |r: &RepoLockSentinel| {
            r.schema_version == REPO_LOCK_SCHEMA_VERSION
        })?;

        // A missing file means the holder released between our create
        // attempt and the read; loop around and try again.
        if current.exists && is_stale(current.record.as_ref(), options.stale_ttl_seconds) {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    log::debug!("recovered stale repository lock at {}", path.display());
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(WorktreeError::RepoLockStaleRecoveryFailed {
                        path: path.to_path_buf(),
                        detail: e.to_string(),
                    });
                }
            }
        }

        if started.elapsed() >= timeout {
            return Err(WorktreeError::RepoLockTimeout {
                waited_ms: options.timeout_ms,
                holder: current.record.map(|r| {
                    format!("{} (pid {} on {}, running {})", r.owner, r.pid, r.host, r.command)
                }),
            });
        }
        std::thread::sleep(ACQUIRE_POLL);
    }
}

/// Staleness: unparseable sentinels are recoverable, as are sentinels past
/// their TTL, and sentinels owned by a same-host process that is gone. A
/// foreign-host owner is assumed alive until the TTL lapses.
fn is_stale(sentinel: Option<&RepoLockSentinel>, stale_ttl_seconds: u64) -> bool {
    let Some(sentinel) = sentinel else {
        return true;
    };
    if sentinel.started_at.saturating_add(stale_ttl_seconds) < get_now() {
        return true;
    }
    sentinel.host == hostname() && !pid_alive(sentinel.pid)
}

/// Zero-signal probe: does the process still exist on this host?
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        // EPERM means the process exists but belongs to someone else.
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx_in(dir: &TempDir) -> RepoContext {
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join(".vde/worktree/state")).unwrap();
        RepoContext {
            repo_root: root.clone(),
            current_worktree_root: root.clone(),
            git_common_dir: root.join(".git"),
        }
    }

    fn options() -> RepoLockOptions {
        RepoLockOptions {
            command: "test".into(),
            timeout_ms: 300,
            stale_ttl_seconds: 3600,
        }
    }

    #[test]
    fn sentinel_prefers_state_dir() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        assert_eq!(sentinel_path(&ctx), ctx.state_dir().join("repo.lock"));

        std::fs::remove_dir_all(ctx.state_dir()).unwrap();
        assert_eq!(
            sentinel_path(&ctx),
            ctx.git_common_dir.join("vde-worktree.init.lock")
        );
    }

    #[test]
    fn lock_is_released_on_success_and_error() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let path = sentinel_path(&ctx);

        with_repo_lock(&ctx, &options(), || Ok(())).unwrap();
        assert!(!path.exists());

        let result: Result<()> = with_repo_lock(&ctx, &options(), || {
            Err(WorktreeError::internal("boom"))
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn held_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let path = sentinel_path(&ctx);

        // A live same-host holder: our own pid.
        let sentinel = RepoLockSentinel {
            schema_version: REPO_LOCK_SCHEMA_VERSION,
            owner: "other".into(),
            command: "new".into(),
            pid: std::process::id(),
            host: hostname(),
            started_at: get_now(),
        };
        store::write_atomically(&path, &sentinel, true).unwrap();

        let err = with_repo_lock(&ctx, &options(), || Ok(())).unwrap_err();
        assert_eq!(err.code(), "REPO_LOCK_TIMEOUT");
        // The holder's sentinel is untouched.
        assert!(path.exists());
    }

    #[test]
    fn dead_same_host_pid_is_recovered() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let path = sentinel_path(&ctx);

        let sentinel = RepoLockSentinel {
            schema_version: REPO_LOCK_SCHEMA_VERSION,
            owner: "ghost".into(),
            command: "del".into(),
            // Way above any real pid space; the probe reports it dead.
            pid: u32::MAX - 1,
            host: hostname(),
            started_at: get_now(),
        };
        store::write_atomically(&path, &sentinel, true).unwrap();

        with_repo_lock(&ctx, &options(), || Ok(())).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn expired_foreign_lock_is_recovered() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let path = sentinel_path(&ctx);

        let sentinel = RepoLockSentinel {
            schema_version: REPO_LOCK_SCHEMA_VERSION,
            owner: "remote".into(),
            command: "mv".into(),
            pid: 1,
            host: "some-other-host".into(),
            started_at: get_now().saturating_sub(10_000),
        };
        store::write_atomically(&path, &sentinel, true).unwrap();

        let opts = RepoLockOptions {
            stale_ttl_seconds: 60,
            ..options()
        };
        with_repo_lock(&ctx, &opts, || Ok(())).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn fresh_foreign_lock_is_assumed_alive() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let path = sentinel_path(&ctx);

        let sentinel = RepoLockSentinel {
            schema_version: REPO_LOCK_SCHEMA_VERSION,
            owner: "remote".into(),
            command: "mv".into(),
            pid: 1,
            host: "some-other-host".into(),
            started_at: get_now(),
        };
        store::write_atomically(&path, &sentinel, true).unwrap();

        let err = with_repo_lock(&ctx, &options(), || Ok(())).unwrap_err();
        assert_eq!(err.code(), "REPO_LOCK_TIMEOUT");
    }

    #[test]
    fn garbage_sentinel_is_recovered() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let path = sentinel_path(&ctx);
        std::fs::write(&path, "not json at all").unwrap();

        with_repo_lock(&ctx, &options(), || Ok(())).unwrap();
        assert!(!path.exists());
    }
}
