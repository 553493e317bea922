//! Stash-bearing flows between the primary and managed worktrees.

mod common;

use common::TestRepo;

use vde_worktree::pipeline::{
    AbsorbPlan, AdoptPlan, ExtractPlan, SwitchPlan, UnabsorbPlan, UsePlan, adopt_candidates,
    run_plan,
};

#[test]
fn extract_moves_branch_and_stash_into_managed_tree() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();

    repo.git(&["checkout", "-b", "feature/carved"]);
    repo.commit_file("carved.txt", "committed\n", "carved work");
    std::fs::write(repo.root.join("wip.txt"), "uncommitted\n").unwrap();

    let outcome = run_plan(&ws, &ExtractPlan { stash: true }).unwrap();
    assert_eq!(outcome.branch, "feature/carved");
    assert!(outcome.stashed);

    // The primary is back on base and clean.
    let primary_branch = repo.git(&["rev-parse", "--abbrev-ref", "HEAD"]);
    assert_eq!(primary_branch.trim(), "main");
    assert!(!repo.root.join("wip.txt").exists());
    assert_eq!(repo.git(&["status", "--porcelain"]).trim(), "");

    // The managed tree has both the commit and the stashed change.
    assert!(outcome.path.join("carved.txt").exists());
    assert_eq!(
        std::fs::read_to_string(outcome.path.join("wip.txt")).unwrap(),
        "uncommitted\n"
    );
}

#[test]
fn extract_requires_stash_flag_for_dirty_primary() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();

    repo.git(&["checkout", "-b", "feature/dirty"]);
    std::fs::write(repo.root.join("wip.txt"), "uncommitted\n").unwrap();

    let err = run_plan(&ws, &ExtractPlan { stash: false }).unwrap_err();
    assert_eq!(err.code(), "DIRTY_WORKTREE");
    // Nothing moved.
    assert!(repo.root.join("wip.txt").exists());
}

#[test]
fn extract_refuses_base_branch() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    let err = run_plan(&ws, &ExtractPlan { stash: false }).unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[cfg(unix)]
#[test]
fn failed_pre_hook_restores_extracted_stash() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    common::install_hook(&ws, "pre-extract", "exit 1");

    repo.git(&["checkout", "-b", "feature/guarded"]);
    std::fs::write(repo.root.join("wip.txt"), "precious\n").unwrap();

    let err = run_plan(&ws, &ExtractPlan { stash: true }).unwrap_err();
    assert_eq!(err.code(), "HOOK_FAILED");

    // The stash was popped back; the working tree looks untouched.
    assert_eq!(
        std::fs::read_to_string(repo.root.join("wip.txt")).unwrap(),
        "precious\n"
    );
    let branch = repo.git(&["rev-parse", "--abbrev-ref", "HEAD"]);
    assert_eq!(branch.trim(), "feature/guarded");
    assert_eq!(repo.git(&["stash", "list"]).trim(), "");
}

#[test]
fn absorb_then_unabsorb_round_trips_changes() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();

    let created = run_plan(
        &ws,
        &SwitchPlan {
            branch: "feature/shuttle".into(),
        },
    )
    .unwrap();
    std::fs::write(created.path.join("draft.txt"), "draft\n").unwrap();

    // absorb: branch and its dirty state land in the primary.
    let absorbed = run_plan(
        &ws,
        &AbsorbPlan {
            branch: "feature/shuttle".into(),
            from: None,
        },
    )
    .unwrap();
    assert!(absorbed.stashed);
    let branch = repo.git(&["rev-parse", "--abbrev-ref", "HEAD"]);
    assert_eq!(branch.trim(), "feature/shuttle");
    assert_eq!(
        std::fs::read_to_string(repo.root.join("draft.txt")).unwrap(),
        "draft\n"
    );
    // The source tree is clean now.
    assert_eq!(repo.git_in(&created.path, &["status", "--porcelain"]).trim(), "");

    // unabsorb: the changes travel back to the managed tree.
    std::fs::write(repo.root.join("draft.txt"), "draft v2\n").unwrap();
    let outcome = run_plan(
        &ws,
        &UnabsorbPlan {
            branch: "feature/shuttle".into(),
            to: None,
        },
    )
    .unwrap();
    assert_eq!(outcome.path, created.path);
    assert_eq!(
        std::fs::read_to_string(created.path.join("draft.txt")).unwrap(),
        "draft v2\n"
    );
    assert_eq!(repo.git(&["status", "--porcelain"]).trim(), "");
}

#[test]
fn absorb_requires_clean_primary() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    run_plan(
        &ws,
        &SwitchPlan {
            branch: "feature/blocked".into(),
        },
    )
    .unwrap();
    std::fs::write(repo.root.join("conflict.txt"), "local\n").unwrap();

    let err = run_plan(
        &ws,
        &AbsorbPlan {
            branch: "feature/blocked".into(),
            from: None,
        },
    )
    .unwrap_err();
    assert_eq!(err.code(), "DIRTY_WORKTREE");
}

#[test]
fn use_requires_allow_shared_for_attached_branch() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    run_plan(
        &ws,
        &SwitchPlan {
            branch: "feature/shared".into(),
        },
    )
    .unwrap();

    let err = run_plan(
        &ws,
        &UsePlan {
            branch: "feature/shared".into(),
            allow_shared: false,
        },
    )
    .unwrap_err();
    assert_eq!(err.code(), "BRANCH_IN_USE");

    let outcome = run_plan(
        &ws,
        &UsePlan {
            branch: "feature/shared".into(),
            allow_shared: true,
        },
    )
    .unwrap();
    assert!(outcome.shared);
    let branch = repo.git(&["rev-parse", "--abbrev-ref", "HEAD"]);
    assert_eq!(branch.trim(), "feature/shared");
}

#[test]
fn adopt_moves_stray_worktrees_under_managed_root() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();

    let stray = repo.root.join("stray-dir");
    repo.git(&[
        "worktree",
        "add",
        stray.to_str().unwrap(),
        "-b",
        "stray/branch",
    ]);

    let snapshot = ws.snapshot().unwrap();
    let candidates = adopt_candidates(&ws, &snapshot);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].branch, "stray/branch");
    assert_eq!(candidates[0].from, stray);

    let outcome = run_plan(&ws, &AdoptPlan).unwrap();
    assert_eq!(outcome.adopted.len(), 1);
    assert!(repo.root.join(".worktree/stray/branch").is_dir());
    assert!(!stray.exists());
}

#[test]
fn lock_files_appear_and_disappear() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    run_plan(
        &ws,
        &SwitchPlan {
            branch: "feature/held".into(),
        },
    )
    .unwrap();

    ws.locks.upsert("feature/held", "busy", "alice").unwrap();
    let lock_files: Vec<_> = std::fs::read_dir(ws.ctx.locks_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(lock_files.len(), 1);
    assert!(ws.snapshot().unwrap().find_branch("feature/held").unwrap().locked.value);

    ws.locks.delete("feature/held").unwrap();
    let lock_files: Vec<_> = std::fs::read_dir(ws.ctx.locks_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert!(lock_files.is_empty());
    assert!(!ws.snapshot().unwrap().find_branch("feature/held").unwrap().locked.value);
}
