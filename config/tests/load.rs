use std::fs;
use std::path::Path;
use std::time::Duration;

use phasegate_config::{ConfigError, EngineConfig};
use phasegate_types::{GateKind, PhaseId};

fn write(root: &Path, name: &str, body: &str) {
    let dir = root.join(".phasegate");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), body).unwrap();
}

const PHASES: &str = r#"
[[phase]]
id = "plan"
patterns = ["PLAN.md"]
auto_advance = true

[[phase]]
id = "build"
patterns = ["src/**"]
auto_advance = false
"#;

const GATES: &str = r#"
[[gates.plan]]
kind = "exists"
path = "PLAN.md"

[[gates.plan]]
kind = "count"
path = "PLAN.md"
min = 3

[[gates.build]]
kind = "command"
name = "tests"
command = "true"
"#;

#[test]
fn loads_phases_gates_and_defaults() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "phases.toml", PHASES);
    write(dir.path(), "gates.toml", GATES);

    let config = EngineConfig::load(dir.path()).unwrap();
    assert_eq!(config.phases.len(), 2);

    let plan = config.phases.first();
    assert_eq!(plan.id.as_str(), "plan");
    assert!(plan.auto_advance);
    assert_eq!(plan.gates.len(), 2);
    assert_eq!(plan.gates[0].name, "exists:PLAN.md");
    match &plan.gates[1].kind {
        GateKind::Count(count) => {
            assert_eq!(count.min, 3);
            assert_eq!(count.label, "task");
        }
        other => panic!("unexpected gate {other:?}"),
    }

    let build = config.phases.by_ordinal(2).unwrap();
    assert_eq!(build.gates[0].name, "tests");
    match &build.gates[0].kind {
        GateKind::Command(cmd) => assert_eq!(cmd.timeout, Duration::from_secs(30)),
        other => panic!("unexpected gate {other:?}"),
    }

    assert_eq!(config.limits.max_for(&PhaseId::new("build").unwrap()), 1);
    assert_eq!(config.settings.cache.ttl, Duration::from_secs(300));
    assert_eq!(config.settings.watch.debounce, Duration::from_millis(100));
}

#[test]
fn missing_gates_document_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "phases.toml", PHASES);
    let err = EngineConfig::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.path().ends_with("gates.toml"));
}

#[test]
fn auto_advance_must_be_explicit() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "phases.toml",
        "[[phase]]\nid = \"plan\"\npatterns = [\"PLAN.md\"]\n",
    );
    write(dir.path(), "gates.toml", "");
    let err = EngineConfig::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "{err}");
}

#[test]
fn rejects_gates_for_unknown_phase() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "phases.toml", PHASES);
    write(
        dir.path(),
        "gates.toml",
        "[[gates.ship]]\nkind = \"exists\"\npath = \"x\"\n",
    );
    let err = EngineConfig::load(dir.path()).unwrap_err();
    assert!(err.to_string().contains("unknown phase `ship`"), "{err}");
}

#[test]
fn rejects_paths_outside_repository() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "phases.toml", PHASES);
    write(
        dir.path(),
        "gates.toml",
        "[[gates.plan]]\nkind = \"exists\"\npath = \"../secret\"\n",
    );
    let err = EngineConfig::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }), "{err}");
}

#[test]
fn rejects_out_of_range_timeout_and_bad_regex() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "phases.toml", PHASES);
    write(
        dir.path(),
        "gates.toml",
        "[[gates.build]]\nkind = \"command\"\ncommand = \"sleep\"\ntimeout_secs = 0\n",
    );
    assert!(EngineConfig::load(dir.path()).is_err());

    write(
        dir.path(),
        "gates.toml",
        "[[gates.plan]]\nkind = \"contains\"\npath = \"PLAN.md\"\npattern = \"(\"\nregex = true\n",
    );
    assert!(EngineConfig::load(dir.path()).is_err());
}

#[test]
fn settings_and_limits_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "phases.toml", PHASES);
    write(dir.path(), "gates.toml", GATES);
    write(
        dir.path(),
        "config.toml",
        "[cache]\nttl_secs = 5\n[watch]\ndebounce_ms = 20\nignore = [\"tmp/\"]\n",
    );
    write(
        dir.path(),
        "ticket_limits.toml",
        "default = 4\n[limits]\nbuild = 2\n",
    );

    let config = EngineConfig::load(dir.path()).unwrap();
    assert_eq!(config.settings.cache.ttl, Duration::from_secs(5));
    assert_eq!(config.settings.watch.debounce, Duration::from_millis(20));
    assert!(config.settings.watch.ignore.contains(&".phasegate/".to_string()));
    assert_eq!(config.limits.max_for(&PhaseId::new("plan").unwrap()), 4);
    assert_eq!(config.limits.max_for(&PhaseId::new("build").unwrap()), 2);
}

#[test]
fn unknown_settings_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "phases.toml", PHASES);
    write(dir.path(), "gates.toml", GATES);
    write(dir.path(), "config.toml", "[cache]\nttl = 5\n");
    assert!(matches!(
        EngineConfig::load(dir.path()),
        Err(ConfigError::Parse { .. })
    ));
}
