//! Command-line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "vdew",
    version,
    disable_version_flag = true,
    about = "Manage a fleet of per-branch git worktrees"
)]
pub struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Emit a versioned JSON envelope instead of human output
    #[arg(long, global = true)]
    pub json: bool,

    /// Trace every git invocation
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Run pre/post hooks (default: per configuration)
    #[arg(long, global = true, overrides_with = "no_hooks")]
    pub hooks: bool,

    /// Skip pre/post hooks
    #[arg(long, global = true, overrides_with = "hooks")]
    pub no_hooks: bool,

    /// Query the hosted PR tool (default: per configuration)
    #[arg(long, global = true, overrides_with = "no_gh")]
    pub gh: bool,

    /// Skip the hosted PR tool; merged status degrades gracefully
    #[arg(long, global = true, overrides_with = "gh")]
    pub no_gh: bool,

    /// Print absolute paths instead of repo-relative ones
    #[arg(long, global = true)]
    pub full_path: bool,

    /// Permit force flags in non-interactive contexts
    #[arg(long, global = true)]
    pub allow_unsafe: bool,

    /// Hook timeout in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub hook_timeout_ms: Option<u64>,

    /// Repository-lock timeout in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub lock_timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the managed layout and ignore rules
    Init,

    /// List every worktree with its status facets
    List,

    /// Show the full status of one worktree
    Status {
        /// Branch to inspect (default: the current worktree)
        branch: Option<String>,
    },

    /// Print the worktree path for a branch
    Path {
        /// Branch to resolve (default: the current worktree)
        branch: Option<String>,
    },

    /// Create a branch from base and attach it to a new worktree
    New { branch: String },

    /// Attach a branch to a worktree, creating the branch if needed
    Switch { branch: String },

    /// Rename the current worktree's branch and relocate its directory
    Mv { new_branch: String },

    /// Delete a worktree and its branch
    Del {
        /// Branch to delete (default: the current worktree)
        branch: Option<String>,

        /// Shorthand for every force flag below
        #[arg(long)]
        force: bool,

        /// Delete even with uncommitted changes
        #[arg(long)]
        force_dirty: bool,

        /// Delete even when locked
        #[arg(long)]
        force_locked: bool,

        /// Delete even when not merged into base
        #[arg(long)]
        force_unmerged: bool,

        /// Delete even with unpushed (or unknown) upstream state
        #[arg(long)]
        allow_unpushed: bool,
    },

    /// Remove every merged, clean, unlocked worktree
    Gone {
        /// Actually delete; without this, only list candidates
        #[arg(long)]
        apply: bool,
    },

    /// Move stray worktrees under the managed root
    Adopt {
        /// Actually move; without this, only list candidates
        #[arg(long)]
        apply: bool,
    },

    /// Fetch a remote branch and attach it
    Get {
        /// `<remote>/<branch>`
        remote_branch: String,
    },

    /// Move the primary's current branch into a managed worktree
    Extract {
        /// Carry uncommitted changes along via a stash
        #[arg(long)]
        stash: bool,
    },

    /// Check a managed branch out in the primary, carrying its changes
    Absorb {
        branch: String,

        /// Source worktree (default: the branch's managed worktree)
        #[arg(long, value_name = "PATH")]
        from: Option<PathBuf>,
    },

    /// Push the primary's uncommitted changes back to a managed worktree
    Unabsorb {
        branch: String,

        /// Target worktree (default: the branch's managed worktree)
        #[arg(long, value_name = "PATH")]
        to: Option<PathBuf>,
    },

    /// Check a branch out in the primary worktree
    Use {
        branch: String,

        /// Permit a branch already attached to another worktree
        #[arg(long)]
        allow_shared: bool,
    },

    /// Run a command inside a branch's worktree
    Exec {
        branch: String,

        /// Command and arguments, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Run a hook script explicitly
    Invoke {
        /// Hook name, `<phase>-<action>` (e.g. `pre-new`)
        hook: String,

        /// Branch context for the hook environment
        branch: Option<String>,
    },

    /// Copy repo-relative files from the primary into a worktree
    Copy {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Destination branch (default: `WT_WORKTREE_PATH` env)
        #[arg(long)]
        to: Option<String>,
    },

    /// Symlink repo-relative files from the primary into a worktree
    Link {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Destination branch (default: `WT_WORKTREE_PATH` env)
        #[arg(long)]
        to: Option<String>,
    },

    /// Record an advisory lock on a branch's worktree
    Lock {
        branch: String,

        /// Why the worktree is locked
        #[arg(long)]
        reason: String,

        /// Lock owner (default: current user)
        #[arg(long)]
        owner: Option<String>,
    },

    /// Remove a branch's advisory lock
    Unlock {
        branch: String,

        /// Expected owner; mismatch refuses to unlock
        #[arg(long)]
        owner: Option<String>,
    },

    /// Print a worktree path for the shell wrapper, interactively if no
    /// branch is given
    Cd { branch: Option<String> },

    /// Emit a shell completion script
    Completion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Cli {
    /// `--hooks` / `--no-hooks` folded to an override.
    pub fn hooks_override(&self) -> Option<bool> {
        flag_pair(self.hooks, self.no_hooks)
    }

    /// `--gh` / `--no-gh` folded to an override.
    pub fn gh_override(&self) -> Option<bool> {
        flag_pair(self.gh, self.no_gh)
    }

    pub fn command_name(&self) -> &'static str {
        match &self.command {
            Command::Init => "init",
            Command::List => "list",
            Command::Status { .. } => "status",
            Command::Path { .. } => "path",
            Command::New { .. } => "new",
            Command::Switch { .. } => "switch",
            Command::Mv { .. } => "mv",
            Command::Del { .. } => "del",
            Command::Gone { .. } => "gone",
            Command::Adopt { .. } => "adopt",
            Command::Get { .. } => "get",
            Command::Extract { .. } => "extract",
            Command::Absorb { .. } => "absorb",
            Command::Unabsorb { .. } => "unabsorb",
            Command::Use { .. } => "use",
            Command::Exec { .. } => "exec",
            Command::Invoke { .. } => "invoke",
            Command::Copy { .. } => "copy",
            Command::Link { .. } => "link",
            Command::Lock { .. } => "lock",
            Command::Unlock { .. } => "unlock",
            Command::Cd { .. } => "cd",
            Command::Completion { .. } => "completion",
        }
    }
}

fn flag_pair(positive: bool, negative: bool) -> Option<bool> {
    match (positive, negative) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
