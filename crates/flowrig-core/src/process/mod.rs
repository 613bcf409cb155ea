//! Process launching: the [`Launcher`] seam, the [`ManagedProcess`] handle
//! and the value types they exchange.
//!
//! # Architecture
//!
//! ```text
//! Harness
//!     |
//!     v
//! &dyn Launcher --run(build spec)--> ExitOutcome
//!     |
//!     |   spawn(spec)
//!     |        |
//!     |        v
//!     |   Box<dyn ManagedProcess> { pid, spec }
//!     |        |
//!     |   try_wait()
//!     |   kill()
//!     |   wait()
//! ```

pub mod tokio_launcher;
pub mod trait_def;
pub mod types;

pub use tokio_launcher::TokioLauncher;
pub use trait_def::{Launcher, ManagedProcess};
pub use types::{ExitOutcome, ProcessSpec, SpecError};
