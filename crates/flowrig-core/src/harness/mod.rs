//! The harness: brings a coordinator/worker topology up, holds it open
//! until the operator releases it, and tears it down last-started first.
//!
//! Every step runs sequentially on the calling task. The only concurrency is
//! the children themselves, which run alongside the harness once spawned.

pub mod state;
pub mod teardown;

use std::io;

use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::process::{ExitOutcome, Launcher, ProcessSpec};
use crate::roster::{ProcessRoster, RosterError};
use crate::settle::{Readiness, SettlePolicy, settle};
use crate::topology::Topology;
use crate::trigger::Trigger;

pub use state::HarnessState;
pub use teardown::{StepOutcome, TeardownReport, TeardownStep};

/// Errors that stop a harness run.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: HarnessState,
    },

    #[error("failed to launch build step `{command}`")]
    BuildLaunch {
        command: ProcessSpec,
        #[source]
        source: io::Error,
    },

    #[error("build step `{command}` failed with {outcome}")]
    BuildFailed {
        command: ProcessSpec,
        outcome: ExitOutcome,
    },

    #[error("failed to spawn coordinator `{command}`")]
    CoordinatorSpawn {
        command: ProcessSpec,
        #[source]
        source: io::Error,
    },

    #[error("coordinator `{command}` exited while settling ({outcome})")]
    CoordinatorExited {
        command: ProcessSpec,
        outcome: ExitOutcome,
    },

    /// A worker failed to spawn. Everything started before it has been torn
    /// down; `teardown` records how.
    #[error("failed to spawn worker {index} of {count} `{command}`")]
    WorkerSpawn {
        index: usize,
        count: usize,
        command: ProcessSpec,
        teardown: TeardownReport,
        #[source]
        source: io::Error,
    },

    #[error("control input failed")]
    Trigger {
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Roster(#[from] RosterError),
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Largest roster size reached, i.e. the size while awaiting the trigger.
    pub peak_roster_size: usize,
    pub teardown: TeardownReport,
}

/// Owns the launcher and the roster of everything it started.
pub struct Harness {
    launcher: Box<dyn Launcher>,
    roster: ProcessRoster,
    state: HarnessState,
    run_id: Uuid,
    peak_roster_size: usize,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .field("roster", &self.roster)
            .finish()
    }
}

impl Harness {
    pub fn new(launcher: impl Launcher + 'static) -> Self {
        Self {
            launcher: Box::new(launcher),
            roster: ProcessRoster::new(),
            state: HarnessState::Init,
            run_id: Uuid::new_v4(),
            peak_roster_size: 0,
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn roster(&self) -> &ProcessRoster {
        &self.roster
    }

    /// Poll the roster and return how many processes are still running.
    pub fn running_count(&mut self) -> usize {
        self.roster.running_count()
    }

    fn enter(&mut self, next: HarnessState, operation: &'static str) -> Result<(), HarnessError> {
        if !self.state.can_enter(next) {
            return Err(HarnessError::InvalidState {
                operation,
                state: self.state,
            });
        }
        self.state = next;
        Ok(())
    }

    fn record_size(&mut self) {
        self.peak_roster_size = self.peak_roster_size.max(self.roster.len());
    }

    /// Run the build step to completion. A launch failure or non-zero exit
    /// aborts the run before anything is spawned.
    pub async fn build(&mut self, spec: &ProcessSpec) -> Result<(), HarnessError> {
        self.enter(HarnessState::Building, "build")?;
        info!(command = %spec, "running build step");

        let outcome = match self.launcher.run(spec).await {
            Ok(outcome) => outcome,
            Err(source) => {
                self.state = HarnessState::Done { aborted: true };
                return Err(HarnessError::BuildLaunch {
                    command: spec.clone(),
                    source,
                });
            }
        };

        if !outcome.success() {
            self.state = HarnessState::Done { aborted: true };
            return Err(HarnessError::BuildFailed {
                command: spec.clone(),
                outcome,
            });
        }

        info!("build step succeeded");
        Ok(())
    }

    /// Spawn the coordinator as the first roster entry. Returns its pid.
    pub async fn start_coordinator(
        &mut self,
        spec: &ProcessSpec,
    ) -> Result<Option<u32>, HarnessError> {
        self.enter(HarnessState::StartingCoordinator, "start the coordinator")?;

        let process = match self.launcher.spawn(spec).await {
            Ok(process) => process,
            Err(source) => {
                self.state = HarnessState::Done { aborted: true };
                return Err(HarnessError::CoordinatorSpawn {
                    command: spec.clone(),
                    source,
                });
            }
        };

        let pid = process.pid();
        self.roster.push_coordinator(process)?;
        self.record_size();
        info!(?pid, command = %spec, "started coordinator");
        Ok(pid)
    }

    /// Give the coordinator time to start listening.
    ///
    /// If the coordinator has exited by the time settling ends, the run is
    /// aborted and the roster torn down.
    pub async fn settle(&mut self, policy: &SettlePolicy) -> Result<Readiness, HarnessError> {
        self.enter(HarnessState::Settling, "settle")?;
        let readiness = settle(policy).await;

        let exited = self
            .roster
            .coordinator_mut()
            .and_then(|entry| match entry.process.try_wait() {
                Ok(Some(outcome)) => Some((entry.process.spec().clone(), outcome)),
                Ok(None) => None,
                Err(e) => {
                    warn!(pid = ?entry.process.pid(), error = %e, "could not poll coordinator; assuming it is running");
                    None
                }
            });

        if let Some((command, outcome)) = exited {
            error!(command = %command, %outcome, "coordinator exited before workers started");
            self.teardown_as(true).await;
            return Err(HarnessError::CoordinatorExited { command, outcome });
        }

        Ok(readiness)
    }

    /// Spawn `count` workers one after another from the same spec.
    ///
    /// If any spawn fails, everything started so far (coordinator included)
    /// is torn down in reverse order before the error is returned.
    pub async fn start_workers(
        &mut self,
        spec: &ProcessSpec,
        count: usize,
    ) -> Result<(), HarnessError> {
        self.enter(HarnessState::StartingWorkers, "start workers")?;

        for index in 1..=count {
            match self.launcher.spawn(spec).await {
                Ok(process) => {
                    let pid = process.pid();
                    let role = match self.roster.push_worker(process) {
                        Ok(role) => role,
                        Err(e) => {
                            error!(index, error = %e, "roster rejected worker; tearing down");
                            self.teardown_as(true).await;
                            return Err(e.into());
                        }
                    };
                    self.record_size();
                    info!(%role, ?pid, "started worker");
                }
                Err(source) => {
                    error!(index, count, command = %spec, error = %source, "worker spawn failed; tearing down");
                    let teardown = self.teardown_as(true).await;
                    return Err(HarnessError::WorkerSpawn {
                        index,
                        count,
                        command: spec.clone(),
                        teardown,
                        source,
                    });
                }
            }
        }

        info!(workers = count, "all workers started");
        Ok(())
    }

    /// Block until `trigger` releases. There is no timeout.
    pub async fn await_trigger(&mut self, trigger: &mut dyn Trigger) -> Result<(), HarnessError> {
        self.enter(HarnessState::AwaitingTrigger, "await the trigger")?;
        info!(processes = self.roster.len(), "topology is up; waiting for trigger");
        trigger
            .wait()
            .await
            .map_err(|source| HarnessError::Trigger { source })
    }

    /// Terminate every started process, last-started first, waiting for
    /// each to exit before signalling the next. Always runs to completion.
    ///
    /// Calling this after the harness is done returns an empty report.
    pub async fn teardown(&mut self) -> TeardownReport {
        let aborted = self.state != HarnessState::AwaitingTrigger;
        self.teardown_as(aborted).await
    }

    async fn teardown_as(&mut self, aborted: bool) -> TeardownReport {
        if self.state.is_done() {
            return TeardownReport::default();
        }
        self.state = HarnessState::TearingDown;
        info!(processes = self.roster.len(), "tearing down");

        let report = teardown::teardown_roster(&mut self.roster).await;
        let failures = report.failures().count();
        if failures > 0 {
            warn!(failures, "teardown finished with failures");
        } else {
            info!(steps = report.len(), "teardown complete");
        }

        self.state = HarnessState::Done { aborted };
        report
    }

    /// Run the whole lifecycle for `topology`.
    ///
    /// Teardown still runs if the trigger itself fails; the trigger error is
    /// returned afterwards.
    pub async fn run(
        &mut self,
        topology: &Topology,
        trigger: &mut dyn Trigger,
    ) -> Result<RunReport, HarnessError> {
        let span = tracing::info_span!("harness_run", run_id = %self.run_id);
        self.run_lifecycle(topology, trigger).instrument(span).await
    }

    async fn run_lifecycle(
        &mut self,
        topology: &Topology,
        trigger: &mut dyn Trigger,
    ) -> Result<RunReport, HarnessError> {
        if let Some(build) = &topology.build {
            self.build(build).await?;
        }
        self.start_coordinator(&topology.coordinator).await?;
        self.settle(&topology.settle).await?;
        self.start_workers(&topology.worker, topology.workers).await?;

        if let Err(e) = self.await_trigger(trigger).await {
            warn!(error = %e, "trigger failed; tearing down");
            self.teardown_as(true).await;
            return Err(e);
        }
        let teardown = self.teardown().await;

        Ok(RunReport {
            run_id: self.run_id,
            peak_roster_size: self.peak_roster_size,
            teardown,
        })
    }
}
