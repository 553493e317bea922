//! Error taxonomy: every failure the tool can surface, with its wire code
//! and process exit code.

use std::path::PathBuf;

use serde_json::{Value, json};

pub type Result<T> = std::result::Result<T, WorktreeError>;

/// Hook phase, used both for script lookup and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum HookPhase {
    Pre,
    Post,
}

#[derive(Debug)]
pub enum WorktreeError {
    /// The working directory is not inside a git repository.
    NotGitRepository { cwd: PathBuf },
    InvalidArgument { message: String },
    /// Configuration failed validation; `key_path` names the offending key.
    InvalidConfig { key_path: String, message: String },
    /// A force flag was used in a non-interactive context without --allow-unsafe.
    UnsafeFlagRequired { flags: Vec<String> },
    WorktreeNotFound { branch: String },
    BranchAlreadyAttached { branch: String, path: PathBuf },
    BranchAlreadyExists { branch: String },
    /// Branch is checked out in another worktree.
    BranchInUse { branch: String, path: PathBuf },
    DirtyWorktree { branch: String },
    LockedWorktree { branch: String, reason: String },
    UnmergedWorktree { branch: String },
    UnpushedWorktree { branch: String, ahead: Option<u32> },
    TargetPathNotEmpty { path: PathBuf },
    DetachedHead { path: PathBuf },
    PathOutsideRepo { input: String },
    InvalidRemoteBranchFormat { input: String },
    RemoteNotFound { remote: String },
    RemoteBranchNotFound { remote: String, branch: String },
    StashApplyFailed { branch: String, detail: String },
    /// A per-branch advisory lock is held by someone else.
    LockConflict { branch: String, owner: String },
    DependencyMissing { binary: String },
    RepoLockTimeout { waited_ms: u64, holder: Option<String> },
    RepoLockStaleRecoveryFailed { path: PathBuf, detail: String },
    HookFailed {
        action: String,
        phase: HookPhase,
        exit_code: Option<i32>,
        stderr: String,
        /// Set when a stash auto-restore ran after this failure and itself failed.
        auto_restore_error: Option<Box<WorktreeError>>,
    },
    HookNotFound { hook: String },
    HookNotExecutable { path: PathBuf },
    HookTimeout { hook: String, timeout_ms: u64 },
    GitCommandFailed {
        cwd: PathBuf,
        args: Vec<String>,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// A child spawned by `exec` exited non-zero.
    ChildProcessFailed { command: String, exit_code: i32 },
    Internal { message: String },
    UnknownCommand { command: String },
}

impl WorktreeError {
    pub fn internal(message: impl Into<String>) -> Self {
        WorktreeError::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        WorktreeError::InvalidArgument {
            message: message.into(),
        }
    }

    /// The stable wire code carried in the JSON error envelope.
    pub fn code(&self) -> &'static str {
        use WorktreeError::*;
        match self {
            NotGitRepository { .. } => "NOT_GIT_REPOSITORY",
            InvalidArgument { .. } => "INVALID_ARGUMENT",
            InvalidConfig { .. } => "INVALID_CONFIG",
            UnsafeFlagRequired { .. } => "UNSAFE_FLAG_REQUIRED",
            WorktreeNotFound { .. } => "WORKTREE_NOT_FOUND",
            BranchAlreadyAttached { .. } => "BRANCH_ALREADY_ATTACHED",
            BranchAlreadyExists { .. } => "BRANCH_ALREADY_EXISTS",
            BranchInUse { .. } => "BRANCH_IN_USE",
            DirtyWorktree { .. } => "DIRTY_WORKTREE",
            LockedWorktree { .. } => "LOCKED_WORKTREE",
            UnmergedWorktree { .. } => "UNMERGED_WORKTREE",
            UnpushedWorktree { .. } => "UNPUSHED_WORKTREE",
            TargetPathNotEmpty { .. } => "TARGET_PATH_NOT_EMPTY",
            DetachedHead { .. } => "DETACHED_HEAD",
            PathOutsideRepo { .. } => "PATH_OUTSIDE_REPO",
            InvalidRemoteBranchFormat { .. } => "INVALID_REMOTE_BRANCH_FORMAT",
            RemoteNotFound { .. } => "REMOTE_NOT_FOUND",
            RemoteBranchNotFound { .. } => "REMOTE_BRANCH_NOT_FOUND",
            StashApplyFailed { .. } => "STASH_APPLY_FAILED",
            LockConflict { .. } => "LOCK_CONFLICT",
            DependencyMissing { .. } => "DEPENDENCY_MISSING",
            RepoLockTimeout { .. } => "REPO_LOCK_TIMEOUT",
            RepoLockStaleRecoveryFailed { .. } => "REPO_LOCK_STALE_RECOVERY_FAILED",
            HookFailed { .. } => "HOOK_FAILED",
            HookNotFound { .. } => "HOOK_NOT_FOUND",
            HookNotExecutable { .. } => "HOOK_NOT_EXECUTABLE",
            HookTimeout { .. } => "HOOK_TIMEOUT",
            GitCommandFailed { .. } => "GIT_COMMAND_FAILED",
            ChildProcessFailed { .. } => "CHILD_PROCESS_FAILED",
            Internal { .. } => "INTERNAL_ERROR",
            UnknownCommand { .. } => "UNKNOWN_COMMAND",
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        use WorktreeError::*;
        match self {
            NotGitRepository { .. } => 2,
            InvalidArgument { .. } | InvalidConfig { .. } => 3,
            UnsafeFlagRequired { .. }
            | WorktreeNotFound { .. }
            | BranchAlreadyAttached { .. }
            | BranchAlreadyExists { .. }
            | BranchInUse { .. }
            | DirtyWorktree { .. }
            | LockedWorktree { .. }
            | UnmergedWorktree { .. }
            | UnpushedWorktree { .. }
            | TargetPathNotEmpty { .. }
            | DetachedHead { .. }
            | PathOutsideRepo { .. }
            | InvalidRemoteBranchFormat { .. }
            | RemoteNotFound { .. }
            | RemoteBranchNotFound { .. }
            | StashApplyFailed { .. }
            | LockConflict { .. } => 4,
            DependencyMissing { .. } => 5,
            RepoLockTimeout { .. } | RepoLockStaleRecoveryFailed { .. } => 6,
            HookFailed { .. } | HookNotFound { .. } | HookNotExecutable { .. }
            | HookTimeout { .. } => 10,
            GitCommandFailed { .. } => 20,
            ChildProcessFailed { .. } => 21,
            Internal { .. } | UnknownCommand { .. } => 30,
        }
    }

    /// Structured detail for the JSON error envelope.
    pub fn details(&self) -> Value {
        use WorktreeError::*;
        match self {
            NotGitRepository { cwd } => json!({ "cwd": cwd }),
            InvalidArgument { .. } => json!({}),
            InvalidConfig { key_path, .. } => json!({ "keyPath": key_path }),
            UnsafeFlagRequired { flags } => json!({ "flags": flags }),
            WorktreeNotFound { branch } => json!({ "branch": branch }),
            BranchAlreadyAttached { branch, path } => json!({ "branch": branch, "path": path }),
            BranchAlreadyExists { branch } => json!({ "branch": branch }),
            BranchInUse { branch, path } => json!({ "branch": branch, "path": path }),
            DirtyWorktree { branch } => json!({ "branch": branch }),
            LockedWorktree { branch, reason } => json!({ "branch": branch, "reason": reason }),
            UnmergedWorktree { branch } => json!({ "branch": branch }),
            UnpushedWorktree { branch, ahead } => json!({ "branch": branch, "ahead": ahead }),
            TargetPathNotEmpty { path } => json!({ "path": path }),
            DetachedHead { path } => json!({ "path": path }),
            PathOutsideRepo { input } => json!({ "input": input }),
            InvalidRemoteBranchFormat { input } => json!({ "input": input }),
            RemoteNotFound { remote } => json!({ "remote": remote }),
            RemoteBranchNotFound { remote, branch } => {
                json!({ "remote": remote, "branch": branch })
            }
            StashApplyFailed { branch, detail } => json!({ "branch": branch, "detail": detail }),
            LockConflict { branch, owner } => json!({ "branch": branch, "owner": owner }),
            DependencyMissing { binary } => json!({ "binary": binary }),
            RepoLockTimeout { waited_ms, holder } => {
                json!({ "waitedMs": waited_ms, "holder": holder })
            }
            RepoLockStaleRecoveryFailed { path, detail } => {
                json!({ "path": path, "detail": detail })
            }
            HookFailed {
                action,
                phase,
                exit_code,
                stderr,
                auto_restore_error,
            } => {
                let mut details = json!({
                    "action": action,
                    "phase": phase.to_string(),
                    "exitCode": exit_code,
                    "stderr": stderr,
                });
                if let Some(restore) = auto_restore_error {
                    details["autoRestoreFailed"] = json!(true);
                    details["autoRestoreError"] = json!({
                        "code": restore.code(),
                        "message": restore.to_string(),
                        "details": restore.details(),
                    });
                }
                details
            }
            HookNotFound { hook } => json!({ "hook": hook }),
            HookNotExecutable { path } => json!({ "path": path }),
            HookTimeout { hook, timeout_ms } => json!({ "hook": hook, "timeoutMs": timeout_ms }),
            GitCommandFailed {
                cwd,
                args,
                exit_code,
                stdout,
                stderr,
            } => json!({
                "cwd": cwd,
                "args": args,
                "exitCode": exit_code,
                "stdout": stdout,
                "stderr": stderr,
            }),
            ChildProcessFailed { command, exit_code } => {
                json!({ "command": command, "childExitCode": exit_code })
            }
            Internal { message } => json!({ "message": message }),
            UnknownCommand { command } => json!({ "command": command }),
        }
    }
}

impl std::fmt::Display for WorktreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use WorktreeError::*;
        match self {
            NotGitRepository { cwd } => {
                write!(f, "not a git repository: {}", cwd.display())
            }
            InvalidArgument { message } => write!(f, "{message}"),
            InvalidConfig { key_path, message } => {
                write!(f, "invalid configuration at {key_path}: {message}")
            }
            UnsafeFlagRequired { flags } => write!(
                f,
                "force flags ({}) require --allow-unsafe in non-interactive use",
                flags.join(", ")
            ),
            WorktreeNotFound { branch } => write!(f, "no worktree found for branch {branch}"),
            BranchAlreadyAttached { branch, path } => write!(
                f,
                "branch {branch} is already attached at {}",
                path.display()
            ),
            BranchAlreadyExists { branch } => write!(f, "branch {branch} already exists"),
            BranchInUse { branch, path } => write!(
                f,
                "branch {branch} is checked out at {}",
                path.display()
            ),
            DirtyWorktree { branch } => {
                write!(f, "worktree for {branch} has uncommitted changes")
            }
            LockedWorktree { branch, reason } => {
                write!(f, "worktree for {branch} is locked: {reason}")
            }
            UnmergedWorktree { branch } => {
                write!(f, "branch {branch} is not merged into the base branch")
            }
            UnpushedWorktree { branch, ahead } => match ahead {
                Some(n) => write!(f, "branch {branch} has {n} unpushed commit(s)"),
                None => write!(f, "branch {branch} has no known upstream"),
            },
            TargetPathNotEmpty { path } => {
                write!(f, "target path is not empty: {}", path.display())
            }
            DetachedHead { path } => {
                write!(f, "worktree at {} is on a detached HEAD", path.display())
            }
            PathOutsideRepo { input } => {
                write!(f, "path escapes the repository: {input}")
            }
            InvalidRemoteBranchFormat { input } => {
                write!(f, "expected <remote>/<branch>, got {input}")
            }
            RemoteNotFound { remote } => write!(f, "remote {remote} not found"),
            RemoteBranchNotFound { remote, branch } => {
                write!(f, "branch {branch} not found on remote {remote}")
            }
            StashApplyFailed { branch, detail } => {
                write!(f, "failed to reapply stashed changes for {branch}: {detail}")
            }
            LockConflict { branch, owner } => {
                write!(f, "lock for {branch} is held by {owner}")
            }
            DependencyMissing { binary } => write!(f, "required tool not found: {binary}"),
            RepoLockTimeout { waited_ms, holder } => match holder {
                Some(h) => write!(
                    f,
                    "timed out after {waited_ms} ms waiting for the repository lock (held by {h})"
                ),
                None => write!(
                    f,
                    "timed out after {waited_ms} ms waiting for the repository lock"
                ),
            },
            RepoLockStaleRecoveryFailed { path, detail } => write!(
                f,
                "could not remove stale repository lock {}: {detail}",
                path.display()
            ),
            HookFailed {
                action,
                phase,
                exit_code,
                auto_restore_error,
                ..
            } => {
                match exit_code {
                    Some(code) => {
                        write!(f, "{phase}-{action} hook failed with exit code {code}")?
                    }
                    None => write!(f, "{phase}-{action} hook was killed by a signal")?,
                }
                if auto_restore_error.is_some() {
                    write!(f, " (stash auto-restore also failed)")?;
                }
                Ok(())
            }
            HookNotFound { hook } => write!(f, "hook not found: {hook}"),
            HookNotExecutable { path } => {
                write!(f, "hook is not executable: {}", path.display())
            }
            HookTimeout { hook, timeout_ms } => {
                write!(f, "hook {hook} timed out after {timeout_ms} ms")
            }
            GitCommandFailed {
                args,
                exit_code,
                stderr,
                ..
            } => {
                write!(f, "git {} failed", args.join(" "))?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                let trimmed = stderr.trim();
                if !trimmed.is_empty() {
                    write!(f, ": {trimmed}")?;
                }
                Ok(())
            }
            ChildProcessFailed { command, exit_code } => {
                write!(f, "command `{command}` exited with code {exit_code}")
            }
            Internal { message } => write!(f, "internal error: {message}"),
            UnknownCommand { command } => write!(f, "unknown command: {command}"),
        }
    }
}

impl std::error::Error for WorktreeError {}

impl From<std::io::Error> for WorktreeError {
    fn from(e: std::io::Error) -> Self {
        WorktreeError::Internal {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for WorktreeError {
    fn from(e: serde_json::Error) -> Self {
        WorktreeError::Internal {
            message: e.to_string(),
        }
    }
}
