//! Path and identity: repository context, the managed directory layout,
//! the per-branch identifier, and repo-relative path validation.

use std::path::{Component, Path, PathBuf};

use normalize_path::NormalizePath;
use sha2::{Digest, Sha256};

use crate::errors::{Result, WorktreeError};
use crate::git::GitDriver;

/// Name the tool identifies itself by: the exclude-block marker, the hook
/// `WT_TOOL` variable, and the init fallback lock all use it.
pub const TOOL_NAME: &str = "vde-worktree";

/// Default managed worktree root, relative to the repo root.
pub const DEFAULT_WORKTREE_ROOT: &str = ".worktree";

/// Metadata root, relative to the repo root.
pub const META_ROOT: &str = ".vde/worktree";

/// Where the tool is running relative to the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoContext {
    /// The primary checkout; parent of the common git dir when git reports
    /// one, else the current tree root.
    pub repo_root: PathBuf,
    /// Root of the working tree the command was invoked from.
    pub current_worktree_root: PathBuf,
    /// The shared `.git` directory.
    pub git_common_dir: PathBuf,
}

impl RepoContext {
    /// Resolve the context from `cwd`. Fails with `NOT_GIT_REPOSITORY`
    /// outside a repository.
    pub fn resolve(git: &GitDriver, cwd: &Path) -> Result<Self> {
        let current_worktree_root = git.toplevel(cwd)?;
        let git_common_dir = dunce::canonicalize(git.git_common_dir(cwd)?)
            .map_err(|e| WorktreeError::internal(format!("cannot canonicalize git dir: {e}")))?;

        // The primary worktree holds the common dir as `<root>/.git`.
        let repo_root = match git_common_dir.file_name() {
            Some(name) if name == ".git" => git_common_dir
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| current_worktree_root.clone()),
            _ => current_worktree_root.clone(),
        };

        Ok(RepoContext {
            repo_root,
            current_worktree_root,
            git_common_dir,
        })
    }

    pub fn meta_root(&self) -> PathBuf {
        self.repo_root.join(META_ROOT)
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.meta_root().join("hooks")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.meta_root().join("logs")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.meta_root().join("locks")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.meta_root().join("state")
    }

    pub fn branch_state_dir(&self) -> PathBuf {
        self.state_dir().join("branches")
    }

    /// Whether the invocation is running from the primary worktree.
    pub fn in_primary_worktree(&self) -> bool {
        self.current_worktree_root == self.repo_root
    }
}

/// The managed worktree root for the repository (`<repoRoot>/<worktreeRoot>`).
pub fn managed_worktree_root(repo_root: &Path, worktree_root: &str) -> PathBuf {
    repo_root.join(worktree_root)
}

/// Slug used in the per-branch identifier: lowercase, non-alphanumeric runs
/// collapsed to `-`, trimmed, truncated to 48 chars. Falls back to the raw
/// branch when the slug comes out empty.
fn slug(branch: &str) -> String {
    let mut out = String::with_capacity(branch.len());
    let mut pending_dash = false;
    for c in branch.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    let truncated: String = out.chars().take(48).collect();
    let trimmed = truncated.trim_matches('-');
    if trimmed.is_empty() {
        branch.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Stable per-branch identifier: `slug(branch) + "--" + sha256(branch)[..12]`.
///
/// Names the files under `locks/` and `state/branches/`.
pub fn worktree_id(branch: &str) -> String {
    let digest = Sha256::digest(branch.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}--{}", slug(branch), &hex[..12])
}

/// Filesystem path of the worktree for `branch`: forward-slash segments of
/// the branch become directory segments under the managed root.
///
/// Rejects branches whose normalized path would escape the managed root.
pub fn branch_to_worktree_path(worktree_root: &Path, branch: &str) -> Result<PathBuf> {
    if branch.is_empty() {
        return Err(WorktreeError::invalid_argument("branch name is empty"));
    }
    let mut path = worktree_root.to_path_buf();
    for segment in branch.split('/') {
        if segment.is_empty() {
            return Err(WorktreeError::invalid_argument(format!(
                "branch name has an empty path segment: {branch}"
            )));
        }
        path.push(segment);
    }
    ensure_path_inside_root(worktree_root, &path).map_err(|_| WorktreeError::PathOutsideRepo {
        input: branch.to_string(),
    })?;
    Ok(path)
}

/// Verify that `candidate`, lexically normalized, stays strictly inside
/// `root`.
pub fn ensure_path_inside_root(root: &Path, candidate: &Path) -> Result<()> {
    let normalized = candidate.normalize();
    let root = root.normalize();
    if normalized != root && normalized.starts_with(&root) {
        Ok(())
    } else {
        Err(WorktreeError::PathOutsideRepo {
            input: candidate.display().to_string(),
        })
    }
}

/// Validate a user-supplied repo-relative path: relative, no `..` escapes,
/// no absolute inputs. Returns the input unchanged when acceptable.
pub fn resolve_repo_relative_path(input: &str) -> Result<&str> {
    let path = Path::new(input);
    if path.is_absolute() {
        return Err(WorktreeError::PathOutsideRepo {
            input: input.to_string(),
        });
    }
    let mut depth: i32 = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(WorktreeError::PathOutsideRepo {
                        input: input.to_string(),
                    });
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(WorktreeError::PathOutsideRepo {
                    input: input.to_string(),
                });
            }
        }
    }
    Ok(input)
}

/// Display helper: the path relative to `base` when it is inside it, else
/// the absolute path.
pub fn display_path(path: &Path, base: &Path, full: bool) -> String {
    if full {
        return path.display().to_string();
    }
    match path.strip_prefix(base) {
        Ok(stripped) if stripped.as_os_str().is_empty() => ".".to_string(),
        Ok(stripped) => stripped.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}
