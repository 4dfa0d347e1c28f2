//! External command gates.
//!
//! The command runs in the repository root with stdin closed. Output is
//! captured (keeping only the tail) and quoted in the failure reason; it is
//! discarded when the command succeeds. Timeouts, spawn errors and shutdown
//! all become gate failures.

use std::process::{ExitStatus, Stdio};

use phasegate_types::{CommandGate, GateResult, tail_excerpt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::process::ChildGuard;
use crate::{GateCheck, GateCtx, GateFut};

/// Bytes of output retained per stream while the command runs.
const MAX_CAPTURE_BYTES: usize = 64 * 1024;

enum RunOutcome {
    Exited {
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    WaitFailed(std::io::Error),
    TimedOut,
    Cancelled,
}

impl GateCheck for CommandGate {
    fn evaluate<'a>(&'a self, ctx: &'a GateCtx) -> GateFut<'a> {
        Box::pin(async move {
            let cmdline = self.display();
            if ctx.shutdown().is_triggered() {
                return GateResult::fail(format!("command `{cmdline}` cancelled: shutting down"));
            }

            let mut command = Command::new(&self.command);
            command
                .args(&self.args)
                .current_dir(ctx.root())
                .env("PHASEGATE_ROOT", ctx.root())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            #[cfg(unix)]
            crate::process::set_new_session(&mut command);

            let child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    return GateResult::fail(format!("command `{cmdline}` could not be started: {e}"));
                }
            };
            let mut guard = ChildGuard::new(child);
            tracing::debug!(command = %cmdline, timeout = ?self.timeout, "command gate started");

            let stdout = guard.child_mut().stdout.take();
            let stderr = guard.child_mut().stderr.take();
            let mut shutdown = ctx.shutdown().clone();

            let outcome = {
                let run = async {
                    let (stdout, stderr) =
                        futures_util::future::join(drain_tail(stdout), drain_tail(stderr)).await;
                    match guard.child_mut().wait().await {
                        Ok(status) => RunOutcome::Exited {
                            status,
                            stdout,
                            stderr,
                        },
                        Err(e) => RunOutcome::WaitFailed(e),
                    }
                };
                tokio::select! {
                    result = tokio::time::timeout(self.timeout, run) => {
                        result.unwrap_or(RunOutcome::TimedOut)
                    }
                    () = shutdown.wait() => RunOutcome::Cancelled,
                }
            };

            match outcome {
                RunOutcome::Exited {
                    status,
                    stdout,
                    stderr,
                } => {
                    guard.disarm();
                    if status.success() {
                        return GateResult::Pass;
                    }
                    let status_text = status
                        .code()
                        .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit status {c}"));
                    let excerpt = excerpt(&stdout, &stderr, ctx.excerpt_chars());
                    if excerpt.is_empty() {
                        GateResult::fail(format!("command `{cmdline}` failed ({status_text})"))
                    } else {
                        GateResult::fail(format!(
                            "command `{cmdline}` failed ({status_text}): {excerpt}"
                        ))
                    }
                }
                RunOutcome::WaitFailed(e) => {
                    GateResult::fail(format!("command `{cmdline}` could not be awaited: {e}"))
                }
                RunOutcome::TimedOut => {
                    tracing::warn!(command = %cmdline, "command gate timed out");
                    GateResult::fail(format!(
                        "command `{cmdline}` timed out after {}s",
                        self.timeout.as_secs_f64()
                    ))
                }
                RunOutcome::Cancelled => {
                    GateResult::fail(format!("command `{cmdline}` cancelled: shutting down"))
                }
            }
        })
    }
}

/// Read a stream to EOF, retaining only the last [`MAX_CAPTURE_BYTES`].
///
/// The stream is always drained so a chatty command never blocks on a full pipe.
async fn drain_tail<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let Some(mut reader) = reader else {
        return Vec::new();
    };
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                kept.extend_from_slice(&buf[..n]);
                if kept.len() > MAX_CAPTURE_BYTES {
                    let excess = kept.len() - MAX_CAPTURE_BYTES;
                    kept.drain(..excess);
                }
            }
        }
    }
    kept
}

/// Prefer stderr; fall back to stdout when stderr is empty.
fn excerpt(stdout: &[u8], stderr: &[u8], max_chars: usize) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.trim().is_empty() {
        return tail_excerpt(&stderr, max_chars);
    }
    tail_excerpt(&String::from_utf8_lossy(stdout), max_chars)
}
