//! Git driver: typed wrapper over the external `git` binary.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::{Result, WorktreeError};

mod parse;

pub use parse::parse_worktree_porcelain;

/// One enumerated working tree from `git worktree list --porcelain -z`.
///
/// `branch: None` means the tree is on a detached HEAD.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: String,
    pub branch: Option<String>,
    pub bare: bool,
}

/// Captured output of a git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs git commands with consistent logging and error surfacing.
///
/// All git execution goes through this type so `--verbose` traces every
/// command the tool issues.
#[derive(Debug, Clone, Default)]
pub struct GitDriver;

impl GitDriver {
    pub fn new() -> Self {
        GitDriver
    }

    /// Run git in `cwd`, returning the raw output without checking the exit
    /// code. Spawn failures (git missing) surface as `DEPENDENCY_MISSING`.
    pub fn run_unchecked(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput> {
        let start = std::time::Instant::now();
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    WorktreeError::DependencyMissing {
                        binary: "git".into(),
                    }
                } else {
                    WorktreeError::internal(format!("failed to spawn git: {e}"))
                }
            })?;

        let result = GitOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        log::debug!(
            "$ git {} [{}] dur={:.1?} exit={:?}",
            args.join(" "),
            cwd.display(),
            start.elapsed(),
            result.exit_code
        );
        Ok(result)
    }

    /// Run git in `cwd`; a non-zero exit becomes `GIT_COMMAND_FAILED`
    /// carrying the full invocation context.
    pub fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput> {
        let output = self.run_unchecked(cwd, args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(WorktreeError::GitCommandFailed {
                cwd: cwd.to_path_buf(),
                args: args.iter().map(|s| s.to_string()).collect(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }

    /// Trimmed stdout of a checked invocation.
    pub fn run_trimmed(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        Ok(self.run(cwd, args)?.stdout.trim().to_string())
    }

    /// Whether `ref` resolves in the repository at `cwd`.
    pub fn ref_exists(&self, cwd: &Path, reference: &str) -> Result<bool> {
        let probe = format!("{reference}^{{commit}}");
        let output = self.run_unchecked(cwd, &["rev-parse", "--verify", "--quiet", &probe])?;
        Ok(output.success())
    }

    /// Whether a local branch ref exists.
    pub fn branch_exists(&self, cwd: &Path, branch: &str) -> Result<bool> {
        self.ref_exists(cwd, &format!("refs/heads/{branch}"))
    }

    /// List every working tree attached to the repository at `cwd`.
    pub fn list_worktrees(&self, cwd: &Path) -> Result<Vec<WorktreeEntry>> {
        let output = self.run(cwd, &["worktree", "list", "--porcelain", "-z"])?;
        parse_worktree_porcelain(&output.stdout)
    }

    /// Whether the working tree at `path` has any pending change
    /// (staged, unstaged, or untracked).
    pub fn is_dirty(&self, path: &Path) -> Result<bool> {
        let output = self.run(path, &["status", "--porcelain"])?;
        Ok(!output.stdout.trim().is_empty())
    }

    /// Symbolic upstream name of `branch` (e.g. `origin/feature`), if set.
    pub fn upstream_of(&self, cwd: &Path, branch: &str) -> Result<Option<String>> {
        let arg = format!("{branch}@{{upstream}}");
        let output = self.run_unchecked(cwd, &["rev-parse", "--abbrev-ref", &arg])?;
        if output.success() {
            let name = output.stdout.trim().to_string();
            Ok((!name.is_empty()).then_some(name))
        } else {
            Ok(None)
        }
    }

    /// Ahead/behind counts of `branch` relative to `upstream`.
    pub fn ahead_behind(
        &self,
        cwd: &Path,
        branch: &str,
        upstream: &str,
    ) -> Result<Option<(u32, u32)>> {
        let range = format!("{upstream}...{branch}");
        let output = self.run_unchecked(cwd, &["rev-list", "--left-right", "--count", &range])?;
        if !output.success() {
            return Ok(None);
        }
        let counts = output.stdout.trim().to_string();
        let mut parts = counts.split_whitespace();
        let behind = parts.next().and_then(|s| s.parse::<u32>().ok());
        let ahead = parts.next().and_then(|s| s.parse::<u32>().ok());
        match (ahead, behind) {
            (Some(a), Some(b)) => Ok(Some((a, b))),
            _ => Ok(None),
        }
    }

    /// Ancestry probe: is `commit` contained in `base`?
    ///
    /// `Ok(Some(true))` when git says yes, `Ok(Some(false))` when it says
    /// no, and `Ok(None)` when the probe itself failed (unknown ref, etc.).
    pub fn is_ancestor(&self, cwd: &Path, commit: &str, base: &str) -> Result<Option<bool>> {
        let output =
            self.run_unchecked(cwd, &["merge-base", "--is-ancestor", commit, base])?;
        match output.exit_code {
            Some(0) => Ok(Some(true)),
            Some(1) => Ok(Some(false)),
            _ => Ok(None),
        }
    }

    /// Reflog of `branch` as `(head, subject)` pairs, newest first.
    pub fn reflog_entries(&self, cwd: &Path, branch: &str) -> Result<Vec<(String, String)>> {
        let output = self.run_unchecked(
            cwd,
            &["log", "-g", "--format=%H%x09%gs", branch],
        )?;
        if !output.success() {
            return Ok(Vec::new());
        }
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| {
                line.split_once('\t')
                    .map(|(head, subject)| (head.to_string(), subject.to_string()))
            })
            .collect())
    }

    /// The repository's common git directory (shared across worktrees).
    pub fn git_common_dir(&self, cwd: &Path) -> Result<PathBuf> {
        let out = self.run_trimmed(cwd, &["rev-parse", "--git-common-dir"])?;
        let path = PathBuf::from(out);
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(cwd.join(path))
        }
    }

    /// Root of the working tree containing `cwd`.
    pub fn toplevel(&self, cwd: &Path) -> Result<PathBuf> {
        let output = self.run_unchecked(cwd, &["rev-parse", "--show-toplevel"])?;
        if !output.success() {
            return Err(WorktreeError::NotGitRepository {
                cwd: cwd.to_path_buf(),
            });
        }
        Ok(PathBuf::from(output.stdout.trim()))
    }

    /// Head commit id of `ref`, if it resolves.
    pub fn rev_parse(&self, cwd: &Path, reference: &str) -> Result<Option<String>> {
        let output = self.run_unchecked(cwd, &["rev-parse", "--verify", "--quiet", reference])?;
        if output.success() {
            Ok(Some(output.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Abbreviated symbolic name of `ref` (e.g. `origin/main` for
    /// `origin/HEAD`), if it resolves.
    pub fn rev_parse_abbrev(&self, cwd: &Path, reference: &str) -> Result<Option<String>> {
        let output =
            self.run_unchecked(cwd, &["rev-parse", "--abbrev-ref", "--verify", "--quiet", reference])?;
        if output.success() {
            let name = output.stdout.trim().to_string();
            Ok((!name.is_empty()).then_some(name))
        } else {
            Ok(None)
        }
    }

    /// Configured remotes of the repository.
    pub fn remotes(&self, cwd: &Path) -> Result<Vec<String>> {
        let output = self.run(cwd, &["remote"])?;
        Ok(output
            .stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_output_success() {
        let ok = GitOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        assert!(ok.success());

        let failed = GitOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(1),
        };
        assert!(!failed.success());

        let killed = GitOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        };
        assert!(!killed.success());
    }
}
