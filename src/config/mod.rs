//! Layered YAML configuration.
//!
//! Layers, earliest first: the global file at
//! `<XDG_CONFIG_HOME>/vde/worktree/config.yml`, then each ancestor
//! directory's `.vde/worktree/config.yml` from the repository root down to
//! the invocation directory. Merging is strict last-wins-per-key; mappings
//! merge recursively, arrays replace. Unknown keys fail validation with the
//! offending key path.

mod validate;

use std::path::{Path, PathBuf};

use etcetera::BaseStrategy;
use serde_yaml::Value;

use crate::errors::{Result, WorktreeError};
use crate::path::DEFAULT_WORKTREE_ROOT;

pub use validate::ListColumn;

/// Effective configuration after layering and validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub worktree_root: String,
    pub base_branch: Option<String>,
    pub base_remote: Option<String>,
    pub github_enabled: bool,
    pub hooks_enabled: bool,
    pub hook_timeout_ms: u64,
    pub lock_timeout_ms: u64,
    pub stale_lock_ttl_seconds: u64,
    pub list: ListTableConfig,
    pub selector_cd: SelectorCdConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListTableConfig {
    pub columns: Vec<ListColumn>,
    pub path_truncate: bool,
    pub path_min_width: u64,
}

/// Interactive `cd` picker settings.
///
/// `prompt` and `fzf_extra_args` go straight to fzf; `surface: tmux` runs
/// the picker in a tmux popup via `fzf-tmux`, with `tmux_popup_opts` as
/// its layout arguments (ignored outside tmux).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectorCdConfig {
    pub prompt: Option<String>,
    pub surface: Option<String>,
    pub tmux_popup_opts: Option<String>,
    pub fzf_extra_args: Vec<String>,
}

impl Default for ListTableConfig {
    fn default() -> Self {
        ListTableConfig {
            columns: ListColumn::all(),
            path_truncate: true,
            path_min_width: 24,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            worktree_root: DEFAULT_WORKTREE_ROOT.to_string(),
            base_branch: None,
            base_remote: None,
            github_enabled: true,
            hooks_enabled: true,
            hook_timeout_ms: 30_000,
            lock_timeout_ms: 10_000,
            stale_lock_ttl_seconds: 3_600,
            list: ListTableConfig::default(),
            selector_cd: SelectorCdConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate the layered configuration for an invocation at
    /// `cwd` inside the repository rooted at `repo_root`.
    pub fn load(repo_root: &Path, cwd: &Path) -> Result<Config> {
        let mut merged = Value::Null;
        for path in layer_paths(repo_root, cwd) {
            let Some(layer) = read_layer(&path)? else {
                continue;
            };
            merged = merge_values(merged, layer);
        }
        validate::validate(&merged)
    }

    /// Parse and validate a single YAML document (used by tests and the
    /// config-introspection path).
    pub fn from_yaml_str(raw: &str) -> Result<Config> {
        let value: Value = serde_yaml::from_str(raw).map_err(|e| WorktreeError::InvalidConfig {
            key_path: String::new(),
            message: format!("not valid YAML: {e}"),
        })?;
        validate::validate(&value)
    }

    /// Validate `worktree_root` against the filesystem: it must not point
    /// at an existing non-directory and must not live inside the git
    /// private directory.
    pub fn check_worktree_root(&self, repo_root: &Path, git_common_dir: &Path) -> Result<()> {
        let root = repo_root.join(&self.worktree_root);
        if root.exists() && !root.is_dir() {
            return Err(WorktreeError::InvalidConfig {
                key_path: "paths.worktreeRoot".into(),
                message: format!("{} exists and is not a directory", root.display()),
            });
        }
        if root.starts_with(git_common_dir) {
            return Err(WorktreeError::InvalidConfig {
                key_path: "paths.worktreeRoot".into(),
                message: "worktree root must not be inside the git directory".into(),
            });
        }
        Ok(())
    }
}

/// All candidate layer files, lowest precedence first.
fn layer_paths(repo_root: &Path, cwd: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(global) = global_config_path() {
        paths.push(global);
    }

    // Ancestors from the repo root down to cwd, outermost first so the
    // innermost file wins.
    let mut ancestors: Vec<&Path> = cwd
        .ancestors()
        .take_while(|dir| dir.starts_with(repo_root))
        .collect();
    ancestors.reverse();
    for dir in ancestors {
        paths.push(dir.join(".vde/worktree/config.yml"));
    }

    paths
}

fn global_config_path() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("vde/worktree/config.yml"))
}

fn read_layer(path: &Path) -> Result<Option<Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let value: Value = serde_yaml::from_str(&raw).map_err(|e| WorktreeError::InvalidConfig {
        key_path: path.display().to_string(),
        message: format!("not valid YAML: {e}"),
    })?;
    Ok(Some(value))
}

/// Recursive last-wins merge: mappings merge per key, everything else
/// (including arrays) replaces.
fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.worktree_root, ".worktree");
        assert!(config.github_enabled);
        assert_eq!(config.hook_timeout_ms, 30_000);
        assert_eq!(config.list.columns.len(), 8);
    }

    #[test]
    fn scalar_keys_last_win() {
        let base: Value = serde_yaml::from_str("git:\n  baseBranch: main\n").unwrap();
        let overlay: Value = serde_yaml::from_str("git:\n  baseBranch: trunk\n").unwrap();
        let merged = merge_values(base, overlay);
        let config = validate::validate(&merged).unwrap();
        assert_eq!(config.base_branch.as_deref(), Some("trunk"));
    }

    #[test]
    fn sibling_keys_survive_merge() {
        let base: Value =
            serde_yaml::from_str("git:\n  baseBranch: main\n  baseRemote: origin\n").unwrap();
        let overlay: Value = serde_yaml::from_str("git:\n  baseBranch: trunk\n").unwrap();
        let config = validate::validate(&merge_values(base, overlay)).unwrap();
        assert_eq!(config.base_branch.as_deref(), Some("trunk"));
        assert_eq!(config.base_remote.as_deref(), Some("origin"));
    }

    #[test]
    fn arrays_replace_not_concat() {
        let base: Value =
            serde_yaml::from_str("list:\n  table:\n    columns: [branch, dirty, path]\n").unwrap();
        let overlay: Value =
            serde_yaml::from_str("list:\n  table:\n    columns: [branch, path]\n").unwrap();
        let config = validate::validate(&merge_values(base, overlay)).unwrap();
        assert_eq!(config.list.columns.len(), 2);
    }

    #[test]
    fn layer_order_puts_innermost_last() {
        let repo_root = Path::new("/repo");
        let cwd = Path::new("/repo/sub/dir");
        let paths = layer_paths(repo_root, cwd);
        let tail: Vec<_> = paths
            .iter()
            .rev()
            .take(3)
            .map(|p| p.display().to_string())
            .collect();
        assert_eq!(tail[0], "/repo/sub/dir/.vde/worktree/config.yml");
        assert_eq!(tail[1], "/repo/sub/.vde/worktree/config.yml");
        assert_eq!(tail[2], "/repo/.vde/worktree/config.yml");
    }
}
