//! Shared test utilities and fixtures
//!
//! Scratch repositories with a phasegate workflow, and a runner for the
//! compiled binary.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

pub const PLAN_THREE_TASKS: &str = "# Plan\n\n1. parse config\n2. build gates\n3. wire watcher\n";

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
name = "library"
kind = "exists"
path = "src/lib.rs"
"#;

/// A two-phase repository: `plan` (PLAN.md with at least three numbered
/// tasks) then `build` (src/lib.rs exists).
pub fn workflow_repo() -> TempDir {
    let dir = tempfile::tempdir().expect("create scratch repo");
    write(dir.path(), ".phasegate/phases.toml", PHASES);
    write(dir.path(), ".phasegate/gates.toml", GATES);
    write(dir.path(), ".phasegate/ticket_limits.toml", "default = 1\n");
    dir
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, content).expect("write fixture file");
}

/// Run the `phasegate` binary against `root`.
pub fn phasegate(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_phasegate"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("PHASEGATE_LOG")
        .env_remove("RUST_LOG")
        .output()
        .expect("run phasegate")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
