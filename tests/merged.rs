//! The merged decision against real repository histories.

mod common;

use common::TestRepo;

use vde_worktree::pipeline::{NewPlan, run_plan};

#[test]
fn fresh_branch_is_not_merged() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    run_plan(
        &ws,
        &NewPlan {
            branch: "feature/fresh".into(),
        },
    )
    .unwrap();

    let snapshot = ws.snapshot().unwrap();
    let status = snapshot.find_branch("feature/fresh").unwrap();
    assert_eq!(status.merged.by_ancestry, Some(true));
    // The PR provider is disabled, so its verdict is unknown.
    assert_eq!(status.merged.by_pr, None);
    assert_eq!(status.merged.overall, Some(false));
}

#[test]
fn diverged_branch_records_lifecycle_evidence() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    let created = run_plan(
        &ws,
        &NewPlan {
            branch: "feature/work".into(),
        },
    )
    .unwrap();
    repo.commit_file_in(&created.path, "work.txt", "work\n", "do work");
    let head = repo.head_of("feature/work");

    let snapshot = ws.snapshot().unwrap();
    let status = snapshot.find_branch("feature/work").unwrap();
    assert_eq!(status.merged.by_ancestry, Some(false));
    assert_eq!(status.merged.by_lifecycle, Some(false));
    assert_eq!(status.merged.overall, Some(false));

    let record = ws.lifecycle.read("feature/work").unwrap().record.unwrap();
    assert!(record.ever_diverged);
    assert_eq!(record.last_diverged_head.as_deref(), Some(head.as_str()));
}

#[test]
fn merged_branch_is_recognized_via_lifecycle() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    let created = run_plan(
        &ws,
        &NewPlan {
            branch: "feature/landing".into(),
        },
    )
    .unwrap();
    repo.commit_file_in(&created.path, "landing.txt", "done\n", "land the work");

    // First snapshot observes the divergence.
    let snapshot = ws.snapshot().unwrap();
    assert_eq!(
        snapshot.find_branch("feature/landing").unwrap().merged.overall,
        Some(false)
    );

    repo.git(&[
        "merge",
        "--no-ff",
        "feature/landing",
        "-m",
        "merge feature/landing",
    ]);

    // The recorded diverged head is now contained in main.
    let snapshot = ws.snapshot().unwrap();
    let status = snapshot.find_branch("feature/landing").unwrap();
    assert_eq!(status.merged.by_ancestry, Some(true));
    assert_eq!(status.merged.by_lifecycle, Some(true));
    assert_eq!(status.merged.overall, Some(true));
}

#[test]
fn merged_branch_is_recognized_via_reflog_without_prior_snapshot() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    let created = run_plan(
        &ws,
        &NewPlan {
            branch: "feature/quiet".into(),
        },
    )
    .unwrap();
    repo.commit_file_in(&created.path, "quiet.txt", "done\n", "quiet work");
    repo.git(&[
        "merge",
        "--no-ff",
        "feature/quiet",
        "-m",
        "merge feature/quiet",
    ]);

    // No snapshot ever saw the branch diverged; the reflog scan finds the
    // work commit and proves it contained.
    let snapshot = ws.snapshot().unwrap();
    let status = snapshot.find_branch("feature/quiet").unwrap();
    assert_eq!(status.merged.by_ancestry, Some(true));
    assert_eq!(status.merged.by_lifecycle, Some(true));
    assert_eq!(status.merged.overall, Some(true));

    // And the discovered diverged head is persisted for the next run.
    let record = ws.lifecycle.read("feature/quiet").unwrap().record.unwrap();
    assert!(record.ever_diverged);
    assert!(record.last_diverged_head.is_some());
}

#[test]
fn rebase_of_branch_onto_base_does_not_count_as_merged() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();
    let created = run_plan(
        &ws,
        &NewPlan {
            branch: "feature/rebased".into(),
        },
    )
    .unwrap();
    repo.commit_file_in(&created.path, "rebased.txt", "wip\n", "divergent work");

    // Record the divergence.
    ws.snapshot().unwrap();
    let recorded = ws
        .lifecycle
        .read("feature/rebased")
        .unwrap()
        .record
        .unwrap();
    let diverged_head = recorded.last_diverged_head.clone().unwrap();

    // The branch is reset onto main: its head is now contained, but the
    // recorded diverged head never landed anywhere.
    repo.git_in(&created.path, &["reset", "--hard", "main"]);

    let snapshot = ws.snapshot().unwrap();
    let status = snapshot.find_branch("feature/rebased").unwrap();
    assert_eq!(status.merged.by_ancestry, Some(true));
    assert_eq!(status.merged.by_lifecycle, Some(false));
    assert_eq!(status.merged.overall, Some(false));

    // The divergence memory survives.
    let record = ws
        .lifecycle
        .read("feature/rebased")
        .unwrap()
        .record
        .unwrap();
    assert!(record.ever_diverged);
    assert_eq!(record.last_diverged_head.as_deref(), Some(diverged_head.as_str()));
}

#[test]
fn base_branch_carries_no_merged_or_pr_facet() {
    let repo = TestRepo::new();
    let ws = repo.initialized_workspace();

    let snapshot = ws.snapshot().unwrap();
    let main = snapshot.find_branch("main").unwrap();
    assert!(main.is_primary);
    assert_eq!(main.pr.status, None);
    assert_eq!(main.merged.overall, None);
    assert_eq!(main.merged.by_ancestry, None);
}
