//! `flowrig run`: bring the topology up, hold it open, tear it down.

use std::io;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::warn;

use flowrig_core::harness::StepOutcome;
use flowrig_core::trigger::{OrInterrupt, Trigger, stdin_trigger};
use flowrig_core::{Harness, HarnessError, RunReport, TokioLauncher, Topology};

/// Exit status when a second Ctrl-C interrupts teardown.
const INTERRUPTED_EXIT: i32 = 130;

/// Prints the operator prompt, then defers to the wrapped trigger.
///
/// Once released, a watcher is left running so that another Ctrl-C during
/// teardown exits immediately instead of being swallowed.
struct Prompt<T> {
    inner: T,
    processes: usize,
    watcher: Option<JoinHandle<()>>,
}

impl<T> Prompt<T> {
    fn new(inner: T, processes: usize) -> Self {
        Self {
            inner,
            processes,
            watcher: None,
        }
    }
}

#[async_trait]
impl<T: Trigger> Trigger for Prompt<T> {
    async fn wait(&mut self) -> io::Result<()> {
        println!();
        println!(
            "{} processes running. Press Enter (or Ctrl-C) to tear down.",
            self.processes
        );
        let released = self.inner.wait().await;
        self.watcher = Some(tokio::spawn(interrupt_teardown()));
        released
    }
}

impl<T> Drop for Prompt<T> {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

async fn interrupt_teardown() {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted during teardown; remaining processes may still be running");
        std::process::exit(INTERRUPTED_EXIT);
    }
}

/// Run the full lifecycle for `topology`.
pub async fn run_topology(topology: &Topology) -> Result<RunReport, HarnessError> {
    // Children get a null stdin so they cannot consume the trigger line.
    let launcher = TokioLauncher::new().detach_stdin(true);
    let mut harness = Harness::new(launcher);

    println!("flowrig run {}", harness.run_id());
    println!("{topology}");

    let mut trigger = Prompt::new(OrInterrupt::new(stdin_trigger()), topology.process_count());
    let report = harness.run(topology, &mut trigger).await?;

    print_teardown(&report);
    Ok(report)
}

fn print_teardown(report: &RunReport) {
    println!();
    println!("Teardown ({} processes):", report.teardown.len());
    for step in &report.teardown.steps {
        let pid = step
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("  {:<14} pid {:<8} {}", step.role.to_string(), pid, step.outcome);
    }

    let failures = report.teardown.failures().count();
    if failures > 0 {
        println!("{failures} process(es) could not be terminated cleanly.");
    }
    let already = report
        .teardown
        .steps
        .iter()
        .filter(|s| matches!(s.outcome, StepOutcome::AlreadyExited(_)))
        .count();
    if already > 0 {
        println!("{already} process(es) had exited before teardown.");
    }
}
