//! Library-level workflow properties: cache liveness, monotonic advance and
//! the persisted state layout.

use std::time::Duration;

use phasegate_engine::{AdvanceOutcome, Engine};
use phasegate_gates::Shutdown;
use phasegate_types::Position;

use crate::common::{PLAN_THREE_TASKS, workflow_repo, write};

#[tokio::test]
async fn cached_pass_expires_after_ttl() {
    let repo = workflow_repo();
    write(repo.path(), ".phasegate/config.toml", "[cache]\nttl_secs = 1\n");
    write(repo.path(), "PLAN.md", PLAN_THREE_TASKS);
    let engine = Engine::load(repo.path(), Shutdown::never()).unwrap();
    let plan = engine.resolve_phase(None).unwrap().clone();

    assert!(!engine.validate(&plan, None, true).await.cache_hit);
    assert!(engine.validate(&plan, None, true).await.cache_hit);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let expired = engine.validate(&plan, None, true).await;
    assert!(!expired.cache_hit, "entry older than the TTL must not be reused");
    assert!(expired.report.passed());
}

#[tokio::test]
async fn state_files_are_human_readable() {
    let repo = workflow_repo();
    write(repo.path(), "PLAN.md", PLAN_THREE_TASKS);
    let engine = Engine::load(repo.path(), Shutdown::never()).unwrap();
    assert!(engine.advance().await.unwrap().advanced());

    let state = repo.path().join(".phasegate/state");
    assert_eq!(
        std::fs::read_to_string(state.join("current_phase")).unwrap(),
        "build\n"
    );
    assert!(state.join("gates/1.done").is_file());
    assert!(!state.join("gates/2.done").exists());

    let metrics = std::fs::read_to_string(repo.path().join(".phasegate/logs/metrics.jsonl")).unwrap();
    let record: serde_json::Value = serde_json::from_str(metrics.lines().next().unwrap()).unwrap();
    assert_eq!(record["phase"], "plan");
    assert_eq!(record["passed"], true);
    assert!(record["duration_ms"].is_u64());
}

#[tokio::test]
async fn advance_never_moves_backwards() {
    let repo = workflow_repo();
    write(repo.path(), "PLAN.md", PLAN_THREE_TASKS);
    write(repo.path(), "src/lib.rs", "");
    let engine = Engine::load(repo.path(), Shutdown::never()).unwrap();

    let mut last = 0;
    for _ in 0..4 {
        let outcome = engine.advance().await.unwrap();
        let ordinal = match engine.position().unwrap() {
            Position::Active(id) => engine.config().phases.get(&id).unwrap().ordinal,
            Position::Complete => u32::MAX,
        };
        assert!(ordinal >= last);
        if let AdvanceOutcome::Advanced { .. } = outcome {
            assert!(ordinal > last);
        }
        last = ordinal;
    }
    assert_eq!(engine.position().unwrap(), Position::Complete);

    write(repo.path(), "PLAN.md", "");
    assert_eq!(
        engine.advance().await.unwrap(),
        AdvanceOutcome::AlreadyComplete
    );
}

#[tokio::test]
async fn command_gate_failure_is_reported_not_raised() {
    let repo = workflow_repo();
    write(
        repo.path(),
        ".phasegate/gates.toml",
        "[[gates.plan]]\nkind = \"command\"\ncommand = \"phasegate-no-such-binary\"\ntimeout_secs = 5\n",
    );
    let engine = Engine::load(repo.path(), Shutdown::never()).unwrap();
    let plan = engine.resolve_phase(None).unwrap().clone();
    let validation = engine.validate(&plan, None, true).await;
    assert!(!validation.report.passed());
    assert_eq!(validation.report.failures.len(), 1);
    assert!(
        validation.report.failures[0].contains("could not be started"),
        "{:?}",
        validation.report.failures
    );
}
