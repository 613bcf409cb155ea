//! The shape of one harness run: what to build, what to start, and how many.

use std::fmt;

use crate::process::ProcessSpec;
use crate::settle::SettlePolicy;

/// Everything [`crate::Harness::run`] needs to bring a topology up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Build step run before anything is spawned. `None` skips it.
    pub build: Option<ProcessSpec>,
    pub coordinator: ProcessSpec,
    /// Every worker is launched from this same spec.
    pub worker: ProcessSpec,
    pub workers: usize,
    pub settle: SettlePolicy,
}

impl Topology {
    /// Processes the topology starts: the coordinator plus every worker.
    pub fn process_count(&self) -> usize {
        self.workers + 1
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.build {
            Some(build) => writeln!(f, "build:       {build}")?,
            None => writeln!(f, "build:       (skipped)")?,
        }
        writeln!(f, "coordinator: {}", self.coordinator)?;
        writeln!(f, "worker:      {} (x{})", self.worker, self.workers)?;
        write!(f, "settle:      {}", self.settle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn display_lists_every_step() {
        let topology = Topology {
            build: None,
            coordinator: ProcessSpec::from_tokens(["server", "--port", "12121"]).unwrap(),
            worker: ProcessSpec::from_tokens(["client", "--host", "localhost:12121"]).unwrap(),
            workers: 4,
            settle: SettlePolicy::Delay(Duration::from_millis(500)),
        };

        let text = topology.to_string();
        assert!(text.contains("(skipped)"));
        assert!(text.contains("server --port 12121"));
        assert!(text.contains("client --host localhost:12121 (x4)"));
        assert!(text.contains("fixed delay of 500ms"));
        assert_eq!(topology.process_count(), 5);
    }
}
