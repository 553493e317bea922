//! Handlers for the mutating commands: build the plan, run the pipeline,
//! emit the result.

use std::path::PathBuf;

use serde_json::json;

use super::App;
use crate::errors::WorktreeError;
use crate::path::display_path;
use crate::pipeline::{
    AbsorbPlan, AdoptPlan, CreateStatus, DelFlags, DelPlan, ExtractPlan, GetPlan, GonePlan,
    InitPlan, MvPlan, NewPlan, SwitchPlan, UnabsorbPlan, UsePlan, adopt_candidates,
    gone_candidates, run_plan,
};

type CommandResult = std::result::Result<i32, WorktreeError>;

fn shown_path(app: &App, path: &std::path::Path) -> String {
    display_path(path, app.repo_root(), app.full_path)
}

pub fn init(app: &App) -> CommandResult {
    let outcome = run_plan(&app.ws, &InitPlan)?;
    let status = if outcome.already_initialized {
        "existing"
    } else {
        "created"
    };
    app.reporter.ok(
        status,
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &format!(
            "initialized worktree management at {}",
            outcome.meta_root.display()
        ),
    );
    Ok(0)
}

pub fn new(app: &App, branch: String) -> CommandResult {
    let outcome = run_plan(&app.ws, &NewPlan { branch })?;
    app.reporter.ok(
        "created",
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &outcome.path.display().to_string(),
    );
    Ok(0)
}

pub fn switch(app: &App, branch: String) -> CommandResult {
    let outcome = run_plan(&app.ws, &SwitchPlan { branch })?;
    let status = match outcome.status {
        CreateStatus::Created => "created",
        CreateStatus::Existing => "existing",
    };
    app.reporter.ok(
        status,
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &outcome.path.display().to_string(),
    );
    Ok(0)
}

pub fn get(app: &App, remote_branch: String) -> CommandResult {
    let outcome = run_plan(&app.ws, &GetPlan { remote_branch })?;
    let status = match outcome.status {
        CreateStatus::Created => "created",
        CreateStatus::Existing => "existing",
    };
    app.reporter.ok(
        status,
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &outcome.path.display().to_string(),
    );
    Ok(0)
}

pub fn mv(app: &App, new_branch: String) -> CommandResult {
    let outcome = run_plan(&app.ws, &MvPlan { new_branch })?;
    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &outcome.path.display().to_string(),
    );
    Ok(0)
}

pub fn del(app: &App, branch: Option<String>, flags: DelFlags) -> CommandResult {
    let outcome = run_plan(&app.ws, &DelPlan { branch, flags })?;
    app.reporter.ok(
        "deleted",
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &format!("deleted {}", outcome.branch),
    );
    Ok(0)
}

pub fn gone(app: &App, apply: bool) -> CommandResult {
    if !apply {
        // Dry run: no lock, no hooks, no side effects.
        let snapshot = app.ws.snapshot()?;
        let candidates: Vec<_> = gone_candidates(&snapshot)
            .into_iter()
            .map(|wt| {
                json!({
                    "branch": wt.entry.branch,
                    "path": wt.entry.path,
                })
            })
            .collect();
        let human = candidates
            .iter()
            .filter_map(|c| c["branch"].as_str().map(String::from))
            .collect::<Vec<_>>()
            .join("\n");
        app.reporter.ok(
            "ok",
            Some(app.repo_root()),
            json!({ "candidates": candidates, "applied": false }),
            &human,
        );
        return Ok(0);
    }

    let outcome = run_plan(&app.ws, &GonePlan)?;
    let human = outcome
        .removed
        .iter()
        .map(|entry| format!("deleted {}", entry.branch))
        .collect::<Vec<_>>()
        .join("\n");
    app.reporter.ok(
        "deleted",
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &human,
    );
    Ok(0)
}

pub fn adopt(app: &App, apply: bool) -> CommandResult {
    if !apply {
        let snapshot = app.ws.snapshot()?;
        let candidates = adopt_candidates(&app.ws, &snapshot);
        let human = candidates
            .iter()
            .map(|c| {
                format!(
                    "{} -> {}",
                    c.from.display(),
                    shown_path(app, &c.to)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        app.reporter.ok(
            "ok",
            Some(app.repo_root()),
            json!({ "candidates": candidates, "applied": false }),
            &human,
        );
        return Ok(0);
    }

    let outcome = run_plan(&app.ws, &AdoptPlan)?;
    let human = outcome
        .adopted
        .iter()
        .map(|c| format!("adopted {} at {}", c.branch, shown_path(app, &c.to)))
        .collect::<Vec<_>>()
        .join("\n");
    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &human,
    );
    Ok(0)
}

pub fn extract(app: &App, stash: bool) -> CommandResult {
    let outcome = run_plan(&app.ws, &ExtractPlan { stash })?;
    app.reporter.ok(
        "created",
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &outcome.path.display().to_string(),
    );
    Ok(0)
}

pub fn absorb(app: &App, branch: String, from: Option<PathBuf>) -> CommandResult {
    let outcome = run_plan(&app.ws, &AbsorbPlan { branch, from })?;
    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &format!("absorbed {}", outcome.branch),
    );
    Ok(0)
}

pub fn unabsorb(app: &App, branch: String, to: Option<PathBuf>) -> CommandResult {
    let outcome = run_plan(&app.ws, &UnabsorbPlan { branch, to })?;
    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &format!("moved changes to {}", shown_path(app, &outcome.path)),
    );
    Ok(0)
}

pub fn use_branch(app: &App, branch: String, allow_shared: bool) -> CommandResult {
    let outcome = run_plan(
        &app.ws,
        &UsePlan {
            branch,
            allow_shared,
        },
    )?;
    app.reporter.ok(
        "ok",
        Some(app.repo_root()),
        serde_json::to_value(&outcome)?,
        &format!("primary is now on {}", outcome.branch),
    );
    Ok(0)
}
