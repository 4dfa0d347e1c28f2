//! End-to-end tests of the `phasegate` binary: exit codes and output.

use crate::common::{PLAN_THREE_TASKS, phasegate, stdout, workflow_repo, write};

#[test]
fn validate_lists_every_unmet_gate_and_exits_one() {
    let repo = workflow_repo();
    let out = phasegate(repo.path(), &["validate"]);
    assert_eq!(out.status.code(), Some(1));
    let text = stdout(&out);
    assert!(text.contains("  - missing PLAN.md"), "{text}");
    assert!(text.contains("  - task count 0 < 3"), "{text}");
}

#[test]
fn pass_is_cached_and_advance_moves_one_phase() {
    let repo = workflow_repo();
    write(repo.path(), "PLAN.md", PLAN_THREE_TASKS);

    let first = phasegate(repo.path(), &["validate"]);
    assert_eq!(first.status.code(), Some(0));
    assert!(!stdout(&first).contains("(cached)"));
    let second = phasegate(repo.path(), &["validate"]);
    assert!(stdout(&second).contains("(cached)"), "{}", stdout(&second));
    let bypass = phasegate(repo.path(), &["validate", "--no-cache"]);
    assert!(!stdout(&bypass).contains("(cached)"));

    let advance = phasegate(repo.path(), &["advance"]);
    assert_eq!(advance.status.code(), Some(0));
    assert_eq!(stdout(&advance).trim(), "advanced plan -> build");

    let status = stdout(&phasegate(repo.path(), &["status"]));
    assert!(status.contains("phase: build (2/2)"), "{status}");
    assert!(status.contains("gates completed: 1/2"), "{status}");

    let stats = stdout(&phasegate(repo.path(), &["cache-stats"]));
    assert!(stats.contains("entries: 1"), "{stats}");
    assert!(stats.contains("hit rate:"), "{stats}");

    let cleared = phasegate(repo.path(), &["cache-clear"]);
    assert_eq!(cleared.status.code(), Some(0));
    assert!(stdout(&cleared).contains("removed 1 cache entries"));
}

#[test]
fn rejected_advance_exits_one_without_moving() {
    let repo = workflow_repo();
    write(repo.path(), "PLAN.md", "1. only\n");
    let out = phasegate(repo.path(), &["advance"]);
    assert_eq!(out.status.code(), Some(1));
    let text = stdout(&out);
    assert!(text.contains("cannot advance from plan"), "{text}");
    assert!(text.contains("task count 1 < 3"), "{text}");
    assert!(stdout(&phasegate(repo.path(), &["status"])).contains("phase: plan (1/2)"));
}

#[test]
fn validate_named_phase_and_ticket() {
    let repo = workflow_repo();
    let build = phasegate(repo.path(), &["validate", "--phase", "build"]);
    assert_eq!(build.status.code(), Some(1));
    assert!(stdout(&build).contains("missing src/lib.rs"));

    let unknown = phasegate(repo.path(), &["validate", "--phase", "deploy"]);
    assert_eq!(unknown.status.code(), Some(2));

    write(repo.path(), "PLAN.md", PLAN_THREE_TASKS);
    let scoped = phasegate(repo.path(), &["validate", "--ticket", "T-12"]);
    assert_eq!(scoped.status.code(), Some(0));
    let bad_ticket = phasegate(repo.path(), &["validate", "--ticket", "../escape"]);
    assert_eq!(bad_ticket.status.code(), Some(2));
}

#[test]
fn reset_requires_confirmation() {
    let repo = workflow_repo();
    write(repo.path(), "PLAN.md", PLAN_THREE_TASKS);
    assert_eq!(phasegate(repo.path(), &["advance"]).status.code(), Some(0));

    assert_eq!(phasegate(repo.path(), &["reset"]).status.code(), Some(2));
    assert!(stdout(&phasegate(repo.path(), &["status"])).contains("phase: build"));

    let reset = phasegate(repo.path(), &["reset", "--yes"]);
    assert_eq!(reset.status.code(), Some(0));
    assert_eq!(stdout(&reset).trim(), "reset to plan");
    assert!(stdout(&phasegate(repo.path(), &["status"])).contains("gates completed: 0/2"));
}

#[test]
fn admit_follows_the_ticket_limit() {
    let repo = workflow_repo();
    let open = phasegate(repo.path(), &["admit"]);
    assert_eq!(open.status.code(), Some(0));
    assert!(stdout(&open).contains("plan: 0/1 open tickets, admitted"));

    write(repo.path(), ".phasegate/tickets/plan/T-1", "");
    let full = phasegate(repo.path(), &["admit"]);
    assert_eq!(full.status.code(), Some(1));
    assert!(stdout(&full).contains("plan: 1/1 open tickets, full"));

    let other = phasegate(repo.path(), &["admit", "--phase", "build"]);
    assert_eq!(other.status.code(), Some(0));
}

#[test]
fn watch_status_prints_recent_audit_records() {
    let repo = workflow_repo();
    write(repo.path(), "PLAN.md", "1. one\n");
    phasegate(repo.path(), &["advance"]);
    write(repo.path(), "PLAN.md", PLAN_THREE_TASKS);
    phasegate(repo.path(), &["advance"]);

    let all = stdout(&phasegate(repo.path(), &["watch", "--status"]));
    let lines: Vec<&str> = all.lines().collect();
    assert_eq!(lines.len(), 2, "{all}");
    assert!(lines[0].contains("advance_rejected"));
    assert!(lines[1].contains("advanced"));
    assert!(lines[1].contains("plan -> build"));

    let last = stdout(&phasegate(repo.path(), &["watch", "--status", "--limit", "1"]));
    assert_eq!(last.lines().count(), 1);
}

#[test]
fn configuration_errors_exit_two() {
    let repo = workflow_repo();
    std::fs::remove_file(repo.path().join(".phasegate/gates.toml")).unwrap();
    let out = phasegate(repo.path(), &["status"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("gates.toml"));

    let repo = workflow_repo();
    write(
        repo.path(),
        ".phasegate/phases.toml",
        "[[phase]]\nid = \"plan\"\npatterns = [\"PLAN.md\"]\n",
    );
    let out = phasegate(repo.path(), &["validate"]);
    assert_eq!(out.status.code(), Some(2));
}
