//! Strict validation of the merged configuration tree.
//!
//! Every recognized key is typed here; anything else fails with the exact
//! key path so the user can find it in whichever layer introduced it.

use serde_yaml::Value;

use super::{Config, ListTableConfig, SelectorCdConfig};
use crate::errors::{Result, WorktreeError};

/// A renderable column of the `list` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, serde::Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ListColumn {
    Branch,
    Dirty,
    Merged,
    Pr,
    Locked,
    Ahead,
    Behind,
    Path,
}

impl ListColumn {
    pub fn all() -> Vec<ListColumn> {
        use ListColumn::*;
        vec![Branch, Dirty, Merged, Pr, Locked, Ahead, Behind, Path]
    }
}

fn invalid(key_path: &str, message: impl Into<String>) -> WorktreeError {
    WorktreeError::InvalidConfig {
        key_path: key_path.to_string(),
        message: message.into(),
    }
}

fn as_mapping<'a>(value: &'a Value, key_path: &str) -> Result<&'a serde_yaml::Mapping> {
    value
        .as_mapping()
        .ok_or_else(|| invalid(key_path, "expected a mapping"))
}

fn key_str<'a>(key: &'a Value, parent: &str) -> Result<&'a str> {
    key.as_str()
        .ok_or_else(|| invalid(parent, "keys must be strings"))
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn expect_string(value: &Value, key_path: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(key_path, "expected a string"))
}

fn expect_bool(value: &Value, key_path: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| invalid(key_path, "expected a boolean"))
}

fn expect_u64(value: &Value, key_path: &str) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| invalid(key_path, "expected a non-negative integer"))
}

/// Validate the merged tree and produce the effective [`Config`].
pub fn validate(value: &Value) -> Result<Config> {
    let mut config = Config::default();

    if value.is_null() {
        return Ok(config);
    }
    let root = as_mapping(value, "")?;

    for (key, section) in root {
        let key = key_str(key, "")?;
        match key {
            "paths" => validate_paths(section, &mut config)?,
            "git" => validate_git(section, &mut config)?,
            "github" => validate_github(section, &mut config)?,
            "hooks" => validate_hooks(section, &mut config)?,
            "locks" => validate_locks(section, &mut config)?,
            "list" => validate_list(section, &mut config)?,
            "selector" => validate_selector(section, &mut config)?,
            other => return Err(invalid(other, "unknown configuration key")),
        }
    }

    Ok(config)
}

fn validate_paths(section: &Value, config: &mut Config) -> Result<()> {
    for (key, value) in as_mapping(section, "paths")? {
        let key_path = join("paths", key_str(key, "paths")?);
        match key_path.as_str() {
            "paths.worktreeRoot" => {
                let root = expect_string(value, &key_path)?;
                if root.is_empty() {
                    return Err(invalid(&key_path, "must not be empty"));
                }
                if std::path::Path::new(&root).is_absolute() || root.starts_with("..") {
                    return Err(invalid(&key_path, "must be a relative path inside the repo"));
                }
                config.worktree_root = root;
            }
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_git(section: &Value, config: &mut Config) -> Result<()> {
    for (key, value) in as_mapping(section, "git")? {
        let key_path = join("git", key_str(key, "git")?);
        match key_path.as_str() {
            "git.baseBranch" => config.base_branch = Some(expect_string(value, &key_path)?),
            "git.baseRemote" => config.base_remote = Some(expect_string(value, &key_path)?),
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_github(section: &Value, config: &mut Config) -> Result<()> {
    for (key, value) in as_mapping(section, "github")? {
        let key_path = join("github", key_str(key, "github")?);
        match key_path.as_str() {
            "github.enabled" => config.github_enabled = expect_bool(value, &key_path)?,
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_hooks(section: &Value, config: &mut Config) -> Result<()> {
    for (key, value) in as_mapping(section, "hooks")? {
        let key_path = join("hooks", key_str(key, "hooks")?);
        match key_path.as_str() {
            "hooks.enabled" => config.hooks_enabled = expect_bool(value, &key_path)?,
            "hooks.timeoutMs" => config.hook_timeout_ms = expect_u64(value, &key_path)?,
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_locks(section: &Value, config: &mut Config) -> Result<()> {
    for (key, value) in as_mapping(section, "locks")? {
        let key_path = join("locks", key_str(key, "locks")?);
        match key_path.as_str() {
            "locks.timeoutMs" => config.lock_timeout_ms = expect_u64(value, &key_path)?,
            "locks.staleLockTTLSeconds" => {
                config.stale_lock_ttl_seconds = expect_u64(value, &key_path)?
            }
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_list(section: &Value, config: &mut Config) -> Result<()> {
    for (key, value) in as_mapping(section, "list")? {
        let key_path = join("list", key_str(key, "list")?);
        match key_path.as_str() {
            "list.table" => validate_list_table(value, &mut config.list)?,
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_list_table(section: &Value, list: &mut ListTableConfig) -> Result<()> {
    for (key, value) in as_mapping(section, "list.table")? {
        let key_path = join("list.table", key_str(key, "list.table")?);
        match key_path.as_str() {
            "list.table.columns" => list.columns = validate_columns(value)?,
            "list.table.path" => validate_list_path(value, list)?,
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_columns(value: &Value) -> Result<Vec<ListColumn>> {
    let items = value
        .as_sequence()
        .ok_or_else(|| invalid("list.table.columns", "expected a list"))?;
    if items.is_empty() {
        return Err(invalid("list.table.columns", "must not be empty"));
    }

    let mut columns = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let key_path = format!("list.table.columns.{index}");
        let name = expect_string(item, &key_path)?;
        let column: ListColumn = name
            .parse()
            .map_err(|_| invalid(&key_path, format!("unknown column: {name}")))?;
        if columns.contains(&column) {
            return Err(invalid(&key_path, format!("duplicate column: {name}")));
        }
        columns.push(column);
    }
    Ok(columns)
}

fn validate_list_path(section: &Value, list: &mut ListTableConfig) -> Result<()> {
    for (key, value) in as_mapping(section, "list.table.path")? {
        let key_path = join("list.table.path", key_str(key, "list.table.path")?);
        match key_path.as_str() {
            "list.table.path.truncate" => list.path_truncate = expect_bool(value, &key_path)?,
            "list.table.path.minWidth" => {
                let width = expect_u64(value, &key_path)?;
                if !(8..=200).contains(&width) {
                    return Err(invalid(&key_path, "must be between 8 and 200"));
                }
                list.path_min_width = width;
            }
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_selector(section: &Value, config: &mut Config) -> Result<()> {
    for (key, value) in as_mapping(section, "selector")? {
        let key_path = join("selector", key_str(key, "selector")?);
        match key_path.as_str() {
            "selector.cd" => validate_selector_cd(value, &mut config.selector_cd)?,
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_selector_cd(section: &Value, cd: &mut SelectorCdConfig) -> Result<()> {
    for (key, value) in as_mapping(section, "selector.cd")? {
        let key_path = join("selector.cd", key_str(key, "selector.cd")?);
        match key_path.as_str() {
            "selector.cd.prompt" => cd.prompt = Some(expect_string(value, &key_path)?),
            "selector.cd.surface" => cd.surface = Some(expect_string(value, &key_path)?),
            "selector.cd.tmuxPopupOpts" => {
                cd.tmux_popup_opts = Some(expect_string(value, &key_path)?)
            }
            "selector.cd.fzf" => validate_selector_fzf(value, cd)?,
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

fn validate_selector_fzf(section: &Value, cd: &mut SelectorCdConfig) -> Result<()> {
    for (key, value) in as_mapping(section, "selector.cd.fzf")? {
        let key_path = join("selector.cd.fzf", key_str(key, "selector.cd.fzf")?);
        match key_path.as_str() {
            "selector.cd.fzf.extraArgs" => {
                let items = value
                    .as_sequence()
                    .ok_or_else(|| invalid(&key_path, "expected a list"))?;
                let mut args = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    args.push(expect_string(item, &format!("{key_path}.{index}"))?);
                }
                cd.fzf_extra_args = args;
            }
            _ => return Err(invalid(&key_path, "unknown configuration key")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rstest::rstest;

    fn key_path_of(err: WorktreeError) -> String {
        match err {
            WorktreeError::InvalidConfig { key_path, .. } => key_path,
            other => panic!("expected INVALID_CONFIG, got {other:?}"),
        }
    }

    #[test]
    fn full_document_parses() {
        let config = Config::from_yaml_str(
            r#"
paths:
  worktreeRoot: .trees
git:
  baseBranch: main
  baseRemote: origin
github:
  enabled: false
hooks:
  enabled: true
  timeoutMs: 60000
locks:
  timeoutMs: 5000
  staleLockTTLSeconds: 900
list:
  table:
    columns: [branch, merged, path]
    path:
      truncate: false
      minWidth: 40
selector:
  cd:
    prompt: "tree> "
    surface: tmux
    tmuxPopupOpts: "-w 80% -h 60%"
    fzf:
      extraArgs: ["--no-sort"]
"#,
        )
        .unwrap();
        assert_eq!(config.worktree_root, ".trees");
        assert!(!config.github_enabled);
        assert_eq!(config.hook_timeout_ms, 60_000);
        assert_eq!(config.stale_lock_ttl_seconds, 900);
        assert_eq!(config.list.columns, vec![
            ListColumn::Branch,
            ListColumn::Merged,
            ListColumn::Path
        ]);
        assert!(!config.list.path_truncate);
        assert_eq!(config.list.path_min_width, 40);
        assert_eq!(config.selector_cd.fzf_extra_args, vec!["--no-sort"]);
    }

    #[rstest]
    #[case(8, true)]
    #[case(200, true)]
    #[case(7, false)]
    #[case(201, false)]
    fn min_width_bounds(#[case] width: u64, #[case] ok: bool) {
        let yaml = format!("list:\n  table:\n    path:\n      minWidth: {width}\n");
        let result = Config::from_yaml_str(&yaml);
        assert_eq!(result.is_ok(), ok, "minWidth={width}");
        if !ok {
            assert_eq!(
                key_path_of(result.unwrap_err()),
                "list.table.path.minWidth"
            );
        }
    }

    #[test]
    fn empty_columns_rejected() {
        let err = Config::from_yaml_str("list:\n  table:\n    columns: []\n").unwrap_err();
        assert_eq!(key_path_of(err), "list.table.columns");
    }

    #[test]
    fn duplicate_column_names_offending_index() {
        let err =
            Config::from_yaml_str("list:\n  table:\n    columns: [branch, branch]\n").unwrap_err();
        assert_eq!(key_path_of(err), "list.table.columns.1");
    }

    #[test]
    fn unknown_column_names_offending_index() {
        let err =
            Config::from_yaml_str("list:\n  table:\n    columns: [branch, nope]\n").unwrap_err();
        assert_eq!(key_path_of(err), "list.table.columns.1");
    }

    #[test]
    fn unknown_top_level_key_rejected() {
        let err = Config::from_yaml_str("worktrees: {}\n").unwrap_err();
        assert_eq!(key_path_of(err), "worktrees");
    }

    #[test]
    fn unknown_nested_key_rejected() {
        let err = Config::from_yaml_str("git:\n  baseBranches: [main]\n").unwrap_err();
        assert_eq!(key_path_of(err), "git.baseBranches");
    }

    #[test]
    fn absolute_worktree_root_rejected() {
        let err = Config::from_yaml_str("paths:\n  worktreeRoot: /tmp/trees\n").unwrap_err();
        assert_eq!(key_path_of(err), "paths.worktreeRoot");
    }

    #[test]
    fn wrong_scalar_type_rejected() {
        let err = Config::from_yaml_str("github:\n  enabled: yes please\n").unwrap_err();
        assert_eq!(key_path_of(err), "github.enabled");
    }
}
