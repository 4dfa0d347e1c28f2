//! File-backed gate checks: existence, content pattern and line count.

use std::io;

use phasegate_types::{ContainsGate, CountGate, ExistsGate, GateResult};
use regex::Regex;

use crate::{GateCheck, GateCtx, GateFut};

impl GateCheck for ExistsGate {
    fn evaluate<'a>(&'a self, ctx: &'a GateCtx) -> GateFut<'a> {
        Box::pin(async move {
            match tokio::fs::try_exists(ctx.root().join(&self.path)).await {
                Ok(true) => GateResult::Pass,
                Ok(false) => GateResult::fail(format!("missing {}", self.path)),
                Err(e) => GateResult::fail(format!("cannot inspect {}: {e}", self.path)),
            }
        })
    }
}

impl GateCheck for ContainsGate {
    fn evaluate<'a>(&'a self, ctx: &'a GateCtx) -> GateFut<'a> {
        Box::pin(async move {
            let content = match read_text(ctx, &self.path).await {
                Ok(Some(content)) => content,
                Ok(None) => return GateResult::fail(format!("missing {}", self.path)),
                Err(e) => return GateResult::fail(format!("cannot read {}: {e}", self.path)),
            };
            if self.regex {
                let re = match Regex::new(&self.pattern) {
                    Ok(re) => re,
                    Err(e) => {
                        return GateResult::fail(format!(
                            "invalid pattern `{}` for {}: {e}",
                            self.pattern, self.path
                        ));
                    }
                };
                if re.is_match(&content) {
                    GateResult::Pass
                } else {
                    GateResult::fail(format!("{} does not match /{}/", self.path, self.pattern))
                }
            } else if content.contains(&self.pattern) {
                GateResult::Pass
            } else {
                GateResult::fail(format!("{} does not contain `{}`", self.path, self.pattern))
            }
        })
    }
}

impl GateCheck for CountGate {
    fn evaluate<'a>(&'a self, ctx: &'a GateCtx) -> GateFut<'a> {
        Box::pin(async move {
            let re = match Regex::new(&self.pattern) {
                Ok(re) => re,
                Err(e) => {
                    return GateResult::fail(format!(
                        "invalid pattern `{}` for {}: {e}",
                        self.pattern, self.path
                    ));
                }
            };
            // A missing document simply has zero qualifying lines.
            let content = match read_text(ctx, &self.path).await {
                Ok(content) => content.unwrap_or_default(),
                Err(e) => return GateResult::fail(format!("cannot read {}: {e}", self.path)),
            };
            let count = count_matching_lines(&content, &re);
            if count >= u64::from(self.min) {
                GateResult::Pass
            } else {
                GateResult::fail(format!("{} count {count} < {}", self.label, self.min))
            }
        })
    }
}

fn count_matching_lines(content: &str, re: &Regex) -> u64 {
    content.lines().filter(|line| re.is_match(line)).count() as u64
}

/// Read a repository file as text. `Ok(None)` when it does not exist.
async fn read_text(ctx: &GateCtx, path: &str) -> io::Result<Option<String>> {
    match tokio::fs::read(ctx.root().join(path)).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use phasegate_types::{ContainsGate, CountGate, ExistsGate, GateResult, NUMBERED_LINE_PATTERN};

    use crate::{GateCheck, GateCtx, Shutdown};

    fn ctx(dir: &tempfile::TempDir) -> GateCtx {
        GateCtx::new(dir.path(), 200, Shutdown::never())
    }

    fn plan_count(min: u32) -> CountGate {
        CountGate {
            path: "PLAN.md".into(),
            pattern: NUMBERED_LINE_PATTERN.into(),
            min,
            label: "task".into(),
        }
    }

    #[tokio::test]
    async fn exists_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let gate = ExistsGate {
            path: "PLAN.md".into(),
        };
        assert_eq!(
            gate.evaluate(&ctx(&dir)).await,
            GateResult::fail("missing PLAN.md")
        );
        fs::write(dir.path().join("PLAN.md"), "").unwrap();
        assert_eq!(gate.evaluate(&ctx(&dir)).await, GateResult::Pass);
    }

    #[tokio::test]
    async fn contains_literal_and_regex() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "## Status: approved\n").unwrap();
        let literal = ContainsGate {
            path: "README.md".into(),
            pattern: "Status: approved".into(),
            regex: false,
        };
        assert!(literal.evaluate(&ctx(&dir)).await.passed());

        let regex = ContainsGate {
            path: "README.md".into(),
            pattern: r"Status:\s+(approved|merged)".into(),
            regex: true,
        };
        assert!(regex.evaluate(&ctx(&dir)).await.passed());

        let absent = ContainsGate {
            path: "README.md".into(),
            pattern: "[x] signed".into(),
            regex: false,
        };
        assert_eq!(
            absent.evaluate(&ctx(&dir)).await,
            GateResult::fail("README.md does not contain `[x] signed`")
        );
    }

    #[tokio::test]
    async fn contains_on_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let gate = ContainsGate {
            path: "NOTES.md".into(),
            pattern: "x".into(),
            regex: false,
        };
        assert_eq!(
            gate.evaluate(&ctx(&dir)).await,
            GateResult::fail("missing NOTES.md")
        );
    }

    #[tokio::test]
    async fn count_treats_missing_file_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            plan_count(3).evaluate(&ctx(&dir)).await,
            GateResult::fail("task count 0 < 3")
        );
    }

    #[tokio::test]
    async fn count_only_numbered_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("PLAN.md"),
            "# Plan\n1. design\n2) build\n  3. test\n- not counted\n4.not counted\n",
        )
        .unwrap();
        assert!(plan_count(3).evaluate(&ctx(&dir)).await.passed());
        assert_eq!(
            plan_count(4).evaluate(&ctx(&dir)).await,
            GateResult::fail("task count 3 < 4")
        );
    }
}
