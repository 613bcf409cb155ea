//! Harness lifecycle states.
//!
//! ```text
//! Init -> Building -> StartingCoordinator -> Settling -> StartingWorkers
//!      -> AwaitingTrigger -> TearingDown -> Done
//! ```
//!
//! `Building`, `StartingCoordinator`, `Settling` and `StartingWorkers` can
//! abort straight to `Done { aborted: true }`. The build step is optional,
//! so `StartingCoordinator` may also be entered from `Init`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Init,
    Building,
    StartingCoordinator,
    Settling,
    StartingWorkers,
    AwaitingTrigger,
    TearingDown,
    Done { aborted: bool },
}

impl HarnessState {
    /// Whether an operation that enters `next` may run from `self`.
    ///
    /// Teardown is always allowed: it is the recovery path from every state.
    pub fn can_enter(self, next: HarnessState) -> bool {
        use HarnessState::*;
        matches!(
            (self, next),
            (Init, Building)
                | (Init | Building, StartingCoordinator)
                | (StartingCoordinator, Settling)
                | (Settling, StartingWorkers)
                | (StartingWorkers, AwaitingTrigger)
                | (_, TearingDown)
        )
    }

    pub fn is_done(self) -> bool {
        matches!(self, HarnessState::Done { .. })
    }
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HarnessState::Init => "init",
            HarnessState::Building => "building",
            HarnessState::StartingCoordinator => "starting_coordinator",
            HarnessState::Settling => "settling",
            HarnessState::StartingWorkers => "starting_workers",
            HarnessState::AwaitingTrigger => "awaiting_trigger",
            HarnessState::TearingDown => "tearing_down",
            HarnessState::Done { aborted: false } => "done",
            HarnessState::Done { aborted: true } => "done (aborted)",
        };
        f.write_str(s)
    }
}
