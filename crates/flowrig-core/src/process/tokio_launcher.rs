//! Launcher backed by `tokio::process`.
//!
//! Children inherit the harness's stdin/stdout/stderr so their output is
//! passed straight through to the operator's terminal.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use super::trait_def::{Launcher, ManagedProcess};
use super::types::{ExitOutcome, ProcessSpec};

/// Spawns real OS processes.
#[derive(Debug, Clone, Default)]
pub struct TokioLauncher {
    /// When set, children get a null stdin instead of sharing the
    /// harness's. The trigger reads stdin, so sharing it lets a child
    /// swallow the operator's keypress.
    detach_stdin: bool,
}

impl TokioLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give children a null stdin.
    pub fn detach_stdin(mut self, detach: bool) -> Self {
        self.detach_stdin = detach;
        self
    }

    fn command(&self, spec: &ProcessSpec) -> Command {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.args());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        if self.detach_stdin {
            cmd.stdin(Stdio::null());
        } else {
            cmd.stdin(Stdio::inherit());
        }
        cmd
    }
}

#[async_trait]
impl Launcher for TokioLauncher {
    async fn run(&self, spec: &ProcessSpec) -> io::Result<ExitOutcome> {
        debug!(command = %spec, "running to completion");
        let status = self.command(spec).status().await?;
        Ok(ExitOutcome::from(status))
    }

    async fn spawn(&self, spec: &ProcessSpec) -> io::Result<Box<dyn ManagedProcess>> {
        let mut cmd = self.command(spec);
        // A panicking harness must not leave children behind.
        cmd.kill_on_drop(true);

        let child = cmd.spawn()?;
        let pid = child.id();
        debug!(command = %spec, ?pid, "spawned");

        Ok(Box::new(TokioProcess {
            child,
            pid,
            spec: spec.clone(),
            exited: None,
        }))
    }
}

/// A child spawned by [`TokioLauncher`].
struct TokioProcess {
    child: Child,
    /// Captured at spawn time; `Child::id` returns `None` once reaped.
    pid: Option<u32>,
    spec: ProcessSpec,
    /// Cached once observed so repeated waits agree.
    exited: Option<ExitOutcome>,
}

#[async_trait]
impl ManagedProcess for TokioProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        if self.exited.is_some() {
            return Ok(self.exited);
        }
        let outcome = self.child.try_wait()?.map(ExitOutcome::from);
        self.exited = outcome;
        Ok(outcome)
    }

    async fn kill(&mut self) -> io::Result<()> {
        if self.exited.is_some() {
            debug!(pid = ?self.pid, "already exited; not signalling");
            return Ok(());
        }
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<ExitOutcome> {
        if let Some(outcome) = self.exited {
            return Ok(outcome);
        }
        let outcome = ExitOutcome::from(self.child.wait().await?);
        self.exited = Some(outcome);
        Ok(outcome)
    }
}
