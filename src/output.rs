//! Output: human lines or the versioned JSON envelope.

use std::path::Path;

use serde_json::{Value, json};

use crate::errors::WorktreeError;

/// Schema version of the outbound JSON envelope.
pub const ENVELOPE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Emits results for one command invocation.
#[derive(Debug, Clone)]
pub struct Reporter {
    pub mode: OutputMode,
    command: String,
}

impl Reporter {
    pub fn new(mode: OutputMode, command: impl Into<String>) -> Self {
        Reporter {
            mode,
            command: command.into(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Success envelope. `details` is merged into the envelope top level;
    /// `human` is the line printed outside JSON mode (skipped when empty).
    pub fn ok(&self, status: &str, repo_root: Option<&Path>, details: Value, human: &str) {
        match self.mode {
            OutputMode::Json => {
                println!("{}", self.ok_envelope(status, repo_root, details));
            }
            OutputMode::Human => {
                if !human.is_empty() {
                    println!("{human}");
                }
            }
        }
    }

    fn ok_envelope(&self, status: &str, repo_root: Option<&Path>, details: Value) -> Value {
        let mut envelope = json!({
            "schemaVersion": ENVELOPE_SCHEMA_VERSION,
            "command": self.command,
            "status": status,
            "repoRoot": repo_root,
        });
        if let (Some(envelope_map), Value::Object(detail_map)) =
            (envelope.as_object_mut(), details)
        {
            for (key, value) in detail_map {
                envelope_map.insert(key, value);
            }
        }
        envelope
    }

    /// Error envelope (stdout in JSON mode) or `[CODE] message` (stderr).
    pub fn error(&self, repo_root: Option<&Path>, err: &WorktreeError) {
        match self.mode {
            OutputMode::Json => {
                println!("{}", self.error_envelope(repo_root, err));
            }
            OutputMode::Human => {
                eprintln!("[{}] {err}", err.code());
                if debug_enabled() {
                    eprintln!("{err:#?}");
                }
            }
        }
    }

    fn error_envelope(&self, repo_root: Option<&Path>, err: &WorktreeError) -> Value {
        json!({
            "schemaVersion": ENVELOPE_SCHEMA_VERSION,
            "command": self.command,
            "status": "error",
            "repoRoot": repo_root,
            "code": err.code(),
            "message": err.to_string(),
            "details": err.details(),
        })
    }
}

pub fn debug_enabled() -> bool {
    ["VDE_WORKTREE_DEBUG", "VDE_DEBUG"]
        .iter()
        .any(|var| std::env::var(var).is_ok_and(|v| !v.is_empty() && v != "0"))
}

pub fn verbose_env_enabled() -> bool {
    ["VDE_WORKTREE_VERBOSE", "VDE_VERBOSE"]
        .iter()
        .any(|var| std::env::var(var).is_ok_and(|v| !v.is_empty() && v != "0"))
}
