//! Ordered teardown of a roster.

use std::fmt;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::process::ExitOutcome;
use crate::roster::{ProcessRoster, Role, RosterEntry};

/// What happened to one process during teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Killed, then observed exiting.
    Exited(ExitOutcome),
    /// Had already exited before the kill; nothing was sent.
    AlreadyExited(ExitOutcome),
    /// Could not be signalled or waited on. Teardown moved on.
    Failed(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Exited(outcome) => write!(f, "terminated ({outcome})"),
            StepOutcome::AlreadyExited(outcome) => write!(f, "already exited ({outcome})"),
            StepOutcome::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownStep {
    pub role: Role,
    pub pid: Option<u32>,
    pub outcome: StepOutcome,
}

/// Teardown steps in the order they ran (last-started process first).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Roles in teardown order.
    pub fn order(&self) -> Vec<Role> {
        self.steps.iter().map(|step| step.role).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TeardownStep> {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Failed(_)))
    }
}

/// Drain `roster`, terminating each process and waiting for it to exit
/// before moving on to the one started before it.
pub(crate) async fn teardown_roster(roster: &mut ProcessRoster) -> TeardownReport {
    let mut report = TeardownReport::default();
    for entry in roster.drain_reverse() {
        report.steps.push(terminate(entry).await);
    }
    report
}

async fn terminate(mut entry: RosterEntry) -> TeardownStep {
    let role = entry.role;
    let pid = entry.process.pid();
    let uptime_secs = (Utc::now() - entry.started_at).num_seconds();

    let outcome = match entry.process.try_wait() {
        Ok(Some(outcome)) => {
            debug!(%role, ?pid, %outcome, "process already exited; skipping kill");
            StepOutcome::AlreadyExited(outcome)
        }
        Ok(None) => kill_and_wait(&mut entry).await,
        Err(e) => {
            warn!(%role, ?pid, error = %e, "could not poll process state; killing anyway");
            kill_and_wait(&mut entry).await
        }
    };

    match &outcome {
        StepOutcome::Exited(exit) => {
            info!(%role, ?pid, uptime_secs, outcome = %exit, "terminated");
        }
        StepOutcome::AlreadyExited(_) => {}
        StepOutcome::Failed(message) => {
            warn!(%role, ?pid, error = %message, "teardown step failed; continuing");
        }
    }

    TeardownStep { role, pid, outcome }
}

async fn kill_and_wait(entry: &mut RosterEntry) -> StepOutcome {
    let role = entry.role;
    let pid = entry.process.pid();

    if let Err(e) = entry.process.kill().await {
        // The process may have exited between the poll and the kill.
        return match entry.process.try_wait() {
            Ok(Some(outcome)) => {
                debug!(%role, ?pid, error = %e, "kill raced with exit; treating as exited");
                StepOutcome::AlreadyExited(outcome)
            }
            _ => StepOutcome::Failed(format!("kill failed: {e}")),
        };
    }

    match entry.process.wait().await {
        Ok(outcome) => StepOutcome::Exited(outcome),
        Err(e) => StepOutcome::Failed(format!("wait failed: {e}")),
    }
}
