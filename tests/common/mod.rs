//! Test fixtures: isolated git repositories in temporary directories.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use vde_worktree::config::Config;
use vde_worktree::git::GitDriver;
use vde_worktree::hooks::HookRuntime;
use vde_worktree::lifecycle::LifecycleStore;
use vde_worktree::locks::LockStore;
use vde_worktree::path::RepoContext;
use vde_worktree::pipeline::{InitPlan, run_plan};
use vde_worktree::workspace::Workspace;

pub struct TestRepo {
    // Held for cleanup on drop.
    _dir: TempDir,
    pub root: PathBuf,
}

impl TestRepo {
    /// A fresh repository on `main` with one commit.
    pub fn new() -> TestRepo {
        let dir = TempDir::new().expect("create temp dir");
        // Canonicalize so paths match what `git worktree list` reports.
        let root = dunce::canonicalize(dir.path()).expect("canonicalize temp dir");

        let repo = TestRepo { _dir: dir, root };
        repo.git(&["init", "-b", "main"]);
        repo.git(&["config", "user.name", "Test User"]);
        repo.git(&["config", "user.email", "test@example.invalid"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.commit_file("README.md", "hello\n", "initial commit");
        repo
    }

    /// Run git in the repository root, asserting success.
    pub fn git(&self, args: &[&str]) -> String {
        self.git_in(&self.root, args)
    }

    /// Run git in an arbitrary directory, asserting success.
    pub fn git_in(&self, cwd: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .env("GIT_CONFIG_GLOBAL", "/dev/null")
            .env("GIT_CONFIG_SYSTEM", "/dev/null")
            .output()
            .expect("spawn git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    pub fn commit_file(&self, name: &str, content: &str, message: &str) {
        self.commit_file_in(&self.root, name, content, message);
    }

    pub fn commit_file_in(&self, cwd: &Path, name: &str, content: &str, message: &str) {
        let path = cwd.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        self.git_in(cwd, &["add", name]);
        self.git_in(cwd, &["commit", "-m", message]);
    }

    pub fn head_of(&self, reference: &str) -> String {
        self.git(&["rev-parse", reference]).trim().to_string()
    }

    /// A workspace bound to this repository, with the PR provider off so
    /// tests never touch the network.
    pub fn workspace(&self) -> Workspace {
        self.workspace_with_config(Config::default())
    }

    /// A workspace resolved from inside a linked worktree, for commands
    /// (like `mv`) that act on the tree they run in.
    pub fn workspace_from(&self, cwd: &Path) -> Workspace {
        build_workspace(cwd, Config::default())
    }

    pub fn workspace_with_config(&self, config: Config) -> Workspace {
        build_workspace(&self.root, config)
    }

    /// A workspace in an already-initialized repository.
    pub fn initialized_workspace(&self) -> Workspace {
        let ws = self.workspace();
        run_plan(&ws, &InitPlan).expect("init");
        ws
    }
}

fn build_workspace(cwd: &Path, config: Config) -> Workspace {
    let git = GitDriver::new();
    let ctx = RepoContext::resolve(&git, cwd).expect("resolve repo context");
    let hooks = HookRuntime::new(
        ctx.hooks_dir(),
        ctx.logs_dir(),
        ctx.repo_root.clone(),
        true,
        config.hook_timeout_ms,
    );
    let locks = LockStore::new(ctx.locks_dir());
    let lifecycle = LifecycleStore::new(ctx.branch_state_dir());
    Workspace {
        git,
        ctx,
        config,
        hooks,
        locks,
        lifecycle,
        gh_enabled: false,
    }
}

/// Write an executable hook script into the managed hooks directory.
#[cfg(unix)]
pub fn install_hook(ws: &Workspace, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    let dir = ws.ctx.hooks_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
