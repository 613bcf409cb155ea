//! The process roster: every process the harness has started, in start
//! order.
//!
//! Element 0 is always the coordinator and every later element is a worker.
//! The roster only grows while the topology starts up and is only ever
//! emptied as a whole, last-started first, by [`ProcessRoster::drain_reverse`].

use std::fmt;

use chrono::{DateTime, Utc};

use crate::process::ManagedProcess;

/// What a roster entry is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Coordinator,
    /// A worker, numbered from 1 in start order.
    Worker(usize),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Coordinator => f.write_str("coordinator"),
            Role::Worker(index) => write!(f, "worker-{index}"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("roster already has a coordinator")]
    CoordinatorPresent,

    #[error("cannot add a worker before the coordinator")]
    NoCoordinator,
}

/// One started process together with its role.
pub struct RosterEntry {
    pub role: Role,
    pub process: Box<dyn ManagedProcess>,
    pub started_at: DateTime<Utc>,
}

impl fmt::Debug for RosterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RosterEntry")
            .field("role", &self.role)
            .field("pid", &self.process.pid())
            .field("command", &self.process.spec().to_string())
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// Ordered, owned collection of started processes.
#[derive(Debug, Default)]
pub struct ProcessRoster {
    entries: Vec<RosterEntry>,
}

impl ProcessRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the coordinator. Must be the first entry.
    pub fn push_coordinator(&mut self, process: Box<dyn ManagedProcess>) -> Result<(), RosterError> {
        if !self.entries.is_empty() {
            return Err(RosterError::CoordinatorPresent);
        }
        self.entries.push(RosterEntry {
            role: Role::Coordinator,
            process,
            started_at: Utc::now(),
        });
        Ok(())
    }

    /// Record a worker after the coordinator and any earlier workers.
    /// Returns the worker's role.
    pub fn push_worker(&mut self, process: Box<dyn ManagedProcess>) -> Result<Role, RosterError> {
        if self.entries.is_empty() {
            return Err(RosterError::NoCoordinator);
        }
        let role = Role::Worker(self.entries.len());
        self.entries.push(RosterEntry {
            role,
            process,
            started_at: Utc::now(),
        });
        Ok(role)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of workers (everything after the coordinator).
    pub fn worker_count(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn coordinator_mut(&mut self) -> Option<&mut RosterEntry> {
        self.entries.first_mut()
    }

    /// Poll every entry and return how many are still running.
    ///
    /// A process whose state cannot be read counts as running.
    pub fn running_count(&mut self) -> usize {
        self.entries
            .iter_mut()
            .map(|entry| entry.process.try_wait())
            .filter(|polled| !matches!(polled, Ok(Some(_))))
            .count()
    }

    /// Remove every entry, yielding the most recently started first.
    pub fn drain_reverse(&mut self) -> impl Iterator<Item = RosterEntry> + '_ {
        self.entries.drain(..).rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ExitOutcome, ProcessSpec};
    use async_trait::async_trait;
    use std::io;

    struct StubProcess {
        pid: u32,
        spec: ProcessSpec,
        exited: bool,
    }

    fn stub(pid: u32, exited: bool) -> Box<dyn ManagedProcess> {
        Box::new(StubProcess {
            pid,
            spec: ProcessSpec::new("stub", Vec::<String>::new()).unwrap(),
            exited,
        })
    }

    #[async_trait]
    impl ManagedProcess for StubProcess {
        fn pid(&self) -> Option<u32> {
            Some(self.pid)
        }

        fn spec(&self) -> &ProcessSpec {
            &self.spec
        }

        fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
            Ok(self.exited.then(|| ExitOutcome::code(0)))
        }

        async fn kill(&mut self) -> io::Result<()> {
            self.exited = true;
            Ok(())
        }

        async fn wait(&mut self) -> io::Result<ExitOutcome> {
            Ok(ExitOutcome::code(0))
        }
    }

    #[test]
    fn worker_before_coordinator_rejected() {
        let mut roster = ProcessRoster::new();
        assert_eq!(roster.push_worker(stub(1, false)), Err(RosterError::NoCoordinator));
        assert!(roster.is_empty());
    }

    #[test]
    fn second_coordinator_rejected() {
        let mut roster = ProcessRoster::new();
        roster.push_coordinator(stub(1, false)).unwrap();
        assert_eq!(
            roster.push_coordinator(stub(2, false)),
            Err(RosterError::CoordinatorPresent)
        );
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn workers_are_numbered_in_start_order() {
        let mut roster = ProcessRoster::new();
        roster.push_coordinator(stub(10, false)).unwrap();
        assert_eq!(roster.push_worker(stub(11, false)).unwrap(), Role::Worker(1));
        assert_eq!(roster.push_worker(stub(12, false)).unwrap(), Role::Worker(2));

        assert_eq!(roster.len(), 3);
        assert_eq!(roster.worker_count(), 2);
        assert_eq!(roster.entries()[0].role, Role::Coordinator);
    }

    #[test]
    fn drain_reverse_yields_last_started_first() {
        let mut roster = ProcessRoster::new();
        roster.push_coordinator(stub(10, false)).unwrap();
        roster.push_worker(stub(11, false)).unwrap();
        roster.push_worker(stub(12, false)).unwrap();

        let pids: Vec<Option<u32>> = roster.drain_reverse().map(|e| e.process.pid()).collect();
        assert_eq!(pids, vec![Some(12), Some(11), Some(10)]);
        assert!(roster.is_empty());
    }

    #[test]
    fn running_count_skips_exited() {
        let mut roster = ProcessRoster::new();
        roster.push_coordinator(stub(10, false)).unwrap();
        roster.push_worker(stub(11, true)).unwrap();
        roster.push_worker(stub(12, false)).unwrap();
        assert_eq!(roster.running_count(), 2);
    }

    #[test]
    fn running_count_drops_as_processes_exit() {
        let mut roster = ProcessRoster::new();
        roster.push_coordinator(stub(10, false)).unwrap();
        roster.push_worker(stub(11, false)).unwrap();
        assert_eq!(roster.running_count(), 2);

        roster.entries.last_mut().unwrap().process = stub(11, true);
        assert_eq!(roster.running_count(), 1);
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::Coordinator.to_string(), "coordinator");
        assert_eq!(Role::Worker(3).to_string(), "worker-3");
    }
}
