//! Launch a coordinator and its workers, hold them open for inspection, and
//! tear them down last-started first.

pub mod harness;
pub mod process;
pub mod roster;
pub mod settle;
pub mod topology;
pub mod trigger;

pub use harness::{Harness, HarnessError, HarnessState, RunReport};
pub use process::{ExitOutcome, Launcher, ManagedProcess, ProcessSpec, TokioLauncher};
pub use roster::{ProcessRoster, Role};
pub use settle::SettlePolicy;
pub use topology::Topology;
