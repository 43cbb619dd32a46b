//! Pluggable step execution backend.
//!
//! The executor renders step commands and hands them to a [`StepBackend`]
//! instead of spawning processes directly. Production uses
//! [`CommandBackend`]; tests substitute an implementation that records
//! invocations or writes files itself.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::types::TransformName;

/// A rendered step command ready to execute.
#[derive(Debug, Clone)]
pub struct StepInvocation {
    pub transform: TransformName,
    pub step_index: usize,
    pub command: String,
}

/// Trait abstracting how a rendered step command is executed.
pub trait StepBackend: Send + Sync {
    fn run_step(
        &self,
        invocation: StepInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real backend: run the command through the platform shell and fail on a
/// non-zero exit status.
#[derive(Debug, Clone, Default)]
pub struct CommandBackend;

impl CommandBackend {
    pub fn new() -> Self {
        Self
    }
}

impl StepBackend for CommandBackend {
    fn run_step(
        &self,
        invocation: StepInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            info!(
                transform = %invocation.transform,
                step = invocation.step_index,
                cmd = %invocation.command,
                "running step command"
            );

            let mut cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(&invocation.command);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(&invocation.command);
                c
            };

            cmd.stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd.spawn().with_context(|| {
                format!(
                    "spawning step {} of transform '{}'",
                    invocation.step_index, invocation.transform
                )
            })?;

            // Drain both pipes so the tool never blocks on a full buffer.
            if let Some(stdout) = child.stdout.take() {
                let t = invocation.transform.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(transform = %t, "stdout: {line}");
                    }
                });
            }

            let mut stderr_tail = Vec::new();
            if let Some(stderr) = child.stderr.take() {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(transform = %invocation.transform, "stderr: {line}");
                    stderr_tail.push(line);
                    if stderr_tail.len() > 20 {
                        stderr_tail.remove(0);
                    }
                }
            }

            let status = child.wait().await.with_context(|| {
                format!(
                    "waiting for step {} of transform '{}'",
                    invocation.step_index, invocation.transform
                )
            })?;

            if !status.success() {
                let code = status.code().unwrap_or(-1);
                if stderr_tail.is_empty() {
                    bail!("step command exited with status {code}: {}", invocation.command);
                }
                bail!(
                    "step command exited with status {code}: {}\n{}",
                    invocation.command,
                    stderr_tail.join("\n")
                );
            }

            Ok(())
        })
    }
}
