//! Parsing for the `worktree list --porcelain -z` stream.

use std::path::PathBuf;

use super::WorktreeEntry;
use crate::errors::{Result, WorktreeError};

/// Parse the NUL-separated porcelain worktree listing.
///
/// A record opens at a `worktree <path>` token and closes at the empty
/// token. `HEAD <oid>` and `branch <full-ref>` attach to the open record;
/// the bare tokens `detached` and `bare` mark those states.
pub fn parse_worktree_porcelain(output: &str) -> Result<Vec<WorktreeEntry>> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for token in output.split('\0') {
        if token.is_empty() {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            continue;
        }

        let (key, value) = match token.split_once(' ') {
            Some((k, v)) => (k, Some(v)),
            None => (token, None),
        };

        match (key, current.as_mut()) {
            ("worktree", _) => {
                // An unterminated record would be a porcelain bug; don't
                // silently drop it.
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
                let path = value.ok_or_else(|| {
                    WorktreeError::internal("worktree token missing path in porcelain output")
                })?;
                current = Some(WorktreeEntry {
                    path: PathBuf::from(path),
                    head: String::new(),
                    branch: None,
                    bare: false,
                });
            }
            ("HEAD", Some(entry)) => {
                entry.head = value
                    .ok_or_else(|| {
                        WorktreeError::internal("HEAD token missing oid in porcelain output")
                    })?
                    .to_string();
            }
            ("branch", Some(entry)) => {
                let full_ref = value.ok_or_else(|| {
                    WorktreeError::internal("branch token missing ref in porcelain output")
                })?;
                entry.branch = Some(
                    full_ref
                        .strip_prefix("refs/heads/")
                        .unwrap_or(full_ref)
                        .to_string(),
                );
            }
            ("detached", Some(entry)) => {
                entry.branch = None;
            }
            ("bare", Some(entry)) => {
                entry.bare = true;
            }
            _ => {
                // Unknown attributes (locked, prunable, ...) are irrelevant here.
            }
        }
    }

    if let Some(entry) = current {
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn porcelain(tokens: &[&str]) -> String {
        let mut out = tokens.join("\0");
        out.push('\0');
        out
    }

    #[test]
    fn parses_attached_and_detached_trees() {
        let raw = porcelain(&[
            "worktree /repo",
            "HEAD 1111111111111111111111111111111111111111",
            "branch refs/heads/main",
            "",
            "worktree /repo/.worktree/feature/foo",
            "HEAD 2222222222222222222222222222222222222222",
            "branch refs/heads/feature/foo",
            "",
            "worktree /repo/.worktree/probe",
            "HEAD 3333333333333333333333333333333333333333",
            "detached",
            "",
        ]);

        let entries = parse_worktree_porcelain(&raw).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert_eq!(entries[1].branch.as_deref(), Some("feature/foo"));
        assert_eq!(entries[1].head, "2222222222222222222222222222222222222222");
        assert_eq!(entries[2].branch, None);
    }

    #[test]
    fn parses_bare_entry() {
        let raw = porcelain(&["worktree /repo.git", "bare", ""]);
        let entries = parse_worktree_porcelain(&raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].bare);
    }

    #[test]
    fn tolerates_missing_final_separator() {
        let raw = "worktree /repo\0HEAD 1111\0branch refs/heads/main";
        let entries = parse_worktree_porcelain(raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].branch.as_deref(), Some("main"));
    }

    #[test]
    fn empty_output_yields_no_entries() {
        assert!(parse_worktree_porcelain("").unwrap().is_empty());
    }
}
