//! Hook runtime: pre/post extension-point scripts around every mutation.
//!
//! Scripts live at `<metaRoot>/hooks/<phase>-<action>` and run with the
//! worktree as cwd, a `WT_*` environment, and a timeout. Each invocation
//! appends one JSON record to the logs directory.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Serialize;
use wait_timeout::ChildExt;

use crate::errors::{HookPhase, Result, WorktreeError};
use crate::path::TOOL_NAME;
use crate::utils::{log_stamp, now_iso8601, safe_branch_for_filename, stdout_is_tty};

/// One hook call: who it is for and where it runs.
#[derive(Debug, Clone)]
pub struct HookInvocation<'a> {
    pub action: &'a str,
    pub branch: Option<&'a str>,
    pub worktree_path: Option<&'a Path>,
    pub extra_env: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
struct HookLogRecord<'a> {
    hook: &'a str,
    phase: String,
    start: &'a str,
    end: String,
    #[serde(rename = "exitCode")]
    exit_code: Option<i32>,
    stderr: &'a str,
}

#[derive(Debug, Clone)]
pub struct HookRuntime {
    hooks_dir: PathBuf,
    logs_dir: PathBuf,
    repo_root: PathBuf,
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl HookRuntime {
    pub fn new(
        hooks_dir: PathBuf,
        logs_dir: PathBuf,
        repo_root: PathBuf,
        enabled: bool,
        timeout_ms: u64,
    ) -> Self {
        HookRuntime {
            hooks_dir,
            logs_dir,
            repo_root,
            enabled,
            timeout_ms,
        }
    }

    pub fn script_path(&self, phase: HookPhase, action: &str) -> PathBuf {
        self.hooks_dir.join(format!("{phase}-{action}"))
    }

    /// Implicit pre-hook from the pipeline: absent script is a no-op,
    /// failure is fatal.
    pub fn run_pre(&self, invocation: &HookInvocation<'_>) -> Result<()> {
        self.execute(HookPhase::Pre, invocation, false)
    }

    /// Implicit post-hook. In strict mode a failure is fatal; otherwise it
    /// is reported once on stderr and swallowed.
    pub fn run_post(&self, invocation: &HookInvocation<'_>, strict: bool) -> Result<()> {
        match self.execute(HookPhase::Post, invocation, false) {
            Err(err) if !strict && matches!(err, WorktreeError::HookFailed { .. }) => {
                eprintln!("warning: {err}");
                Ok(())
            }
            other => other,
        }
    }

    /// Explicit `invoke`: an absent script is an error.
    pub fn invoke(&self, phase: HookPhase, invocation: &HookInvocation<'_>) -> Result<()> {
        self.execute(phase, invocation, true)
    }

    /// Pre-hook wrapped with a restore callback for stash-bearing flows.
    ///
    /// On hook failure the restore runs; if the restore itself fails, the
    /// hook error is surfaced with the restore error nested.
    pub fn run_pre_with_restore(
        &self,
        invocation: &HookInvocation<'_>,
        restore: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let Err(hook_err) = self.run_pre(invocation) else {
            return Ok(());
        };
        let Err(restore_err) = restore() else {
            return Err(hook_err);
        };
        match hook_err {
            WorktreeError::HookFailed {
                action,
                phase,
                exit_code,
                stderr,
                ..
            } => Err(WorktreeError::HookFailed {
                action,
                phase,
                exit_code,
                stderr,
                auto_restore_error: Some(Box::new(restore_err)),
            }),
            other => {
                log::warn!("stash restore also failed: {restore_err}");
                Err(other)
            }
        }
    }

    fn execute(
        &self,
        phase: HookPhase,
        invocation: &HookInvocation<'_>,
        explicit: bool,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let script = self.script_path(phase, invocation.action);
        let hook_name = format!("{phase}-{}", invocation.action);

        if !script.exists() {
            if explicit {
                return Err(WorktreeError::HookNotFound { hook: hook_name });
            }
            return Ok(());
        }
        if !is_executable(&script) {
            return Err(WorktreeError::HookNotExecutable { path: script });
        }

        let cwd = invocation.worktree_path.unwrap_or(&self.repo_root);
        let start = now_iso8601();

        let mut command = Command::new(&script);
        command
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .env("WT_REPO_ROOT", &self.repo_root)
            .env("WT_ACTION", invocation.action)
            .env("WT_BRANCH", invocation.branch.unwrap_or(""))
            .env(
                "WT_WORKTREE_PATH",
                invocation.worktree_path.unwrap_or(&self.repo_root),
            )
            .env("WT_IS_TTY", if stdout_is_tty() { "1" } else { "0" })
            .env("WT_TOOL", TOOL_NAME);
        for (key, value) in &invocation.extra_env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| WorktreeError::internal(format!("failed to spawn {hook_name}: {e}")))?;

        // Drain stderr on a thread so a chatty hook cannot fill the pipe
        // and deadlock against the timeout wait.
        let stderr_handle = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let timeout = Duration::from_millis(self.timeout_ms);
        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                self.append_log(invocation, &hook_name, phase, &start, None, "timed out");
                return Err(WorktreeError::HookTimeout {
                    hook: hook_name,
                    timeout_ms: self.timeout_ms,
                });
            }
            Err(e) => {
                return Err(WorktreeError::internal(format!(
                    "failed to wait for {hook_name}: {e}"
                )));
            }
        };

        let stderr = stderr_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let exit_code = status.code();
        self.append_log(invocation, &hook_name, phase, &start, exit_code, &stderr);

        if status.success() {
            return Ok(());
        }
        Err(WorktreeError::HookFailed {
            action: invocation.action.to_string(),
            phase,
            exit_code,
            stderr,
            auto_restore_error: None,
        })
    }

    fn append_log(
        &self,
        invocation: &HookInvocation<'_>,
        hook_name: &str,
        phase: HookPhase,
        start: &str,
        exit_code: Option<i32>,
        stderr: &str,
    ) {
        let safe_branch = safe_branch_for_filename(invocation.branch.unwrap_or("none"));
        let file = self.logs_dir.join(format!(
            "{}_{}_{}.log",
            log_stamp(),
            invocation.action,
            safe_branch
        ));
        let record = HookLogRecord {
            hook: hook_name,
            phase: phase.to_string(),
            start,
            end: now_iso8601(),
            exit_code,
            stderr,
        };

        // Logging must never fail the mutation.
        let result = std::fs::create_dir_all(&self.logs_dir).and_then(|()| {
            let mut body = serde_json::to_string(&record).unwrap_or_default();
            body.push('\n');
            use std::io::Write;
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file)
                .and_then(|mut f| f.write_all(body.as_bytes()))
        });
        if let Err(e) = result {
            log::warn!("failed to write hook log {}: {e}", file.display());
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn runtime_in(dir: &TempDir, timeout_ms: u64) -> HookRuntime {
        HookRuntime::new(
            dir.path().join("hooks"),
            dir.path().join("logs"),
            dir.path().to_path_buf(),
            true,
            timeout_ms,
        )
    }

    fn write_hook(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let hooks = dir.path().join("hooks");
        std::fs::create_dir_all(&hooks).unwrap();
        let path = hooks.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn invocation<'a>(action: &'a str) -> HookInvocation<'a> {
        HookInvocation {
            action,
            branch: Some("feature/a"),
            worktree_path: None,
            extra_env: Vec::new(),
        }
    }

    #[test]
    fn absent_implicit_hook_is_silent() {
        let dir = TempDir::new().unwrap();
        runtime_in(&dir, 1000).run_pre(&invocation("new")).unwrap();
    }

    #[test]
    fn absent_explicit_hook_errors() {
        let dir = TempDir::new().unwrap();
        let err = runtime_in(&dir, 1000)
            .invoke(HookPhase::Pre, &invocation("new"))
            .unwrap_err();
        assert_eq!(err.code(), "HOOK_NOT_FOUND");
    }

    #[test]
    fn non_executable_hook_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_hook(&dir, "pre-new", "exit 0");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = runtime_in(&dir, 1000).run_pre(&invocation("new")).unwrap_err();
        assert_eq!(err.code(), "HOOK_NOT_EXECUTABLE");
    }

    #[test]
    fn disabled_runtime_skips_everything() {
        let dir = TempDir::new().unwrap();
        write_hook(&dir, "pre-new", "exit 1");
        let mut runtime = runtime_in(&dir, 1000);
        runtime.enabled = false;
        runtime.run_pre(&invocation("new")).unwrap();
    }

    #[test]
    fn failing_pre_hook_carries_stderr_and_exit_code() {
        let dir = TempDir::new().unwrap();
        write_hook(&dir, "pre-del", "echo nope >&2; exit 3");
        let err = runtime_in(&dir, 5000).run_pre(&invocation("del")).unwrap_err();
        match err {
            WorktreeError::HookFailed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr.contains("nope"));
            }
            other => panic!("expected HOOK_FAILED, got {other:?}"),
        }
    }

    #[test]
    fn env_is_injected() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("seen");
        write_hook(
            &dir,
            "pre-new",
            &format!("printf '%s %s %s' \"$WT_TOOL\" \"$WT_BRANCH\" \"$WT_ACTION\" > {}", marker.display()),
        );
        runtime_in(&dir, 5000).run_pre(&invocation("new")).unwrap();
        let seen = std::fs::read_to_string(marker).unwrap();
        assert_eq!(seen, "vde-worktree feature/a new");
    }

    #[test]
    fn timeout_kills_and_reports() {
        let dir = TempDir::new().unwrap();
        write_hook(&dir, "pre-new", "sleep 10");
        let err = runtime_in(&dir, 200).run_pre(&invocation("new")).unwrap_err();
        assert_eq!(err.code(), "HOOK_TIMEOUT");
    }

    #[test]
    fn lenient_post_hook_swallows_failure() {
        let dir = TempDir::new().unwrap();
        write_hook(&dir, "post-new", "exit 1");
        runtime_in(&dir, 5000)
            .run_post(&invocation("new"), false)
            .unwrap();
    }

    #[test]
    fn strict_post_hook_fails() {
        let dir = TempDir::new().unwrap();
        write_hook(&dir, "post-new", "exit 1");
        let err = runtime_in(&dir, 5000)
            .run_post(&invocation("new"), true)
            .unwrap_err();
        assert_eq!(err.code(), "HOOK_FAILED");
    }

    #[test]
    fn log_record_is_appended() {
        let dir = TempDir::new().unwrap();
        write_hook(&dir, "pre-new", "echo hi >&2; exit 0");
        runtime_in(&dir, 5000).run_pre(&invocation("new")).unwrap();

        let logs: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(logs.len(), 1);
        let name = logs[0].file_name().to_string_lossy().into_owned();
        assert!(name.contains("_new_feature-a"), "{name}");

        let body = std::fs::read_to_string(logs[0].path()).unwrap();
        let record: serde_json::Value = serde_json::from_str(body.trim()).unwrap();
        assert_eq!(record["hook"], "pre-new");
        assert_eq!(record["phase"], "pre");
        assert_eq!(record["exitCode"], 0);
        assert!(record["stderr"].as_str().unwrap().contains("hi"));
    }

    #[test]
    fn restore_runs_on_pre_failure_and_nests_its_error() {
        let dir = TempDir::new().unwrap();
        write_hook(&dir, "pre-extract", "exit 1");
        let runtime = runtime_in(&dir, 5000);

        // Restore succeeds: original error only.
        let err = runtime
            .run_pre_with_restore(&invocation("extract"), || Ok(()))
            .unwrap_err();
        assert_eq!(err.code(), "HOOK_FAILED");
        assert_eq!(err.details().get("autoRestoreFailed"), None);

        // Restore fails: nested.
        let err = runtime
            .run_pre_with_restore(&invocation("extract"), || {
                Err(WorktreeError::StashApplyFailed {
                    branch: "feature/a".into(),
                    detail: "conflict".into(),
                })
            })
            .unwrap_err();
        let details = err.details();
        assert_eq!(details["autoRestoreFailed"], true);
        assert_eq!(details["autoRestoreError"]["code"], "STASH_APPLY_FAILED");
    }
}
