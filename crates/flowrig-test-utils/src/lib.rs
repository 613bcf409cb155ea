//! Shared test doubles for flowrig integration tests.
//!
//! [`FakeLauncher`] hands out [`FakeProcess`] handles that never touch the
//! OS. Every call the harness makes is appended to a shared [`Journal`], so
//! tests can assert on exact ordering (e.g. that a process was waited on
//! before the next one was killed).

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use flowrig_core::process::{ExitOutcome, Launcher, ManagedProcess, ProcessSpec};

/// Exit reported for a killed fake process.
pub const KILLED: ExitOutcome = ExitOutcome {
    code: None,
    signal: Some(9),
};

/// One call observed by the fake launcher or one of its processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Run { command: String },
    Spawn { pid: u32, command: String },
    Kill { pid: u32 },
    Wait { pid: u32 },
}

/// Append-only log shared between the launcher and its processes.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    fn push(&self, event: Event) {
        self.lock().push(event);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        // A panicking test thread must not hide the journal from the others.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, Event::Spawn { .. }))
            .count()
    }

    pub fn run_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, Event::Run { .. }))
            .count()
    }

    /// Pids in the order they were killed.
    pub fn kill_order(&self) -> Vec<u32> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Event::Kill { pid } => Some(*pid),
                _ => None,
            })
            .collect()
    }

    /// Pids in the order they were spawned.
    pub fn spawn_order(&self) -> Vec<u32> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Event::Spawn { pid, .. } => Some(*pid),
                _ => None,
            })
            .collect()
    }
}

/// How the n-th spawned process (0-based) should behave.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    /// The process has already exited with this outcome before teardown.
    pub exited_early: Option<ExitOutcome>,
    /// `try_wait` reports running, but `kill` fails because the process
    /// exits at that moment.
    pub exits_during_kill: bool,
    /// `kill` fails and the process keeps running.
    pub kill_fails: bool,
}

/// A launcher that fabricates processes and records every interaction.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    journal: Journal,
    build_outcome: ExitOutcome,
    build_launch_fails: bool,
    fail_spawn_at: Option<usize>,
    behaviors: HashMap<usize, Behavior>,
    first_pid: u32,
    spawned: Arc<Mutex<usize>>,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            journal: Journal::default(),
            build_outcome: ExitOutcome::code(0),
            build_launch_fails: false,
            fail_spawn_at: None,
            behaviors: HashMap::new(),
            first_pid: 1000,
            spawned: Arc::new(Mutex::new(0)),
        }
    }

    /// A handle to the journal; stays valid after the launcher is moved
    /// into a harness.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Make the build step exit with `code`.
    pub fn build_exits_with(mut self, code: i32) -> Self {
        self.build_outcome = ExitOutcome::code(code);
        self
    }

    /// Make the build step fail to launch at all.
    pub fn build_launch_fails(mut self) -> Self {
        self.build_launch_fails = true;
        self
    }

    /// Fail the spawn with this 0-based index (0 is the coordinator).
    pub fn fail_spawn_at(mut self, index: usize) -> Self {
        self.fail_spawn_at = Some(index);
        self
    }

    /// Configure the process spawned at this 0-based index.
    pub fn with_behavior(mut self, index: usize, behavior: Behavior) -> Self {
        self.behaviors.insert(index, behavior);
        self
    }

    /// The pid the process spawned at `index` will receive.
    pub fn pid_for(&self, index: usize) -> u32 {
        self.first_pid + index as u32
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn run(&self, spec: &ProcessSpec) -> io::Result<ExitOutcome> {
        if self.build_launch_fails {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such build tool"));
        }
        self.journal.push(Event::Run {
            command: spec.to_string(),
        });
        Ok(self.build_outcome)
    }

    async fn spawn(&self, spec: &ProcessSpec) -> io::Result<Box<dyn ManagedProcess>> {
        let index = {
            let mut spawned = self.spawned.lock().unwrap_or_else(|p| p.into_inner());
            let index = *spawned;
            *spawned += 1;
            index
        };

        if self.fail_spawn_at == Some(index) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", spec.program()),
            ));
        }

        let pid = self.pid_for(index);
        self.journal.push(Event::Spawn {
            pid,
            command: spec.to_string(),
        });

        let behavior = self.behaviors.get(&index).copied().unwrap_or_default();
        Ok(Box::new(FakeProcess {
            pid,
            spec: spec.clone(),
            journal: self.journal.clone(),
            behavior,
            exited: behavior.exited_early,
        }))
    }
}

/// A process that exists only in the journal.
#[derive(Debug)]
pub struct FakeProcess {
    pid: u32,
    spec: ProcessSpec,
    journal: Journal,
    behavior: Behavior,
    exited: Option<ExitOutcome>,
}

#[async_trait]
impl ManagedProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        Ok(self.exited)
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.journal.push(Event::Kill { pid: self.pid });

        if self.exited.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "can't kill an exited process",
            ));
        }
        if self.behavior.exits_during_kill {
            self.exited = Some(ExitOutcome::code(0));
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no such process"));
        }
        if self.behavior.kill_fails {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "operation not permitted",
            ));
        }

        self.exited = Some(KILLED);
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<ExitOutcome> {
        self.journal.push(Event::Wait { pid: self.pid });
        match self.exited {
            Some(outcome) => Ok(outcome),
            // A real wait would block forever here.
            None => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "fake process is still running",
            )),
        }
    }
}
