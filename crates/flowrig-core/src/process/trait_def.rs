//! The `Launcher` and `ManagedProcess` traits -- the seam between the
//! harness and the operating system.
//!
//! [`super::TokioLauncher`] is the real implementation. Tests inject fakes
//! so the lifecycle can be exercised without spawning anything.

use std::io;

use async_trait::async_trait;

use super::types::{ExitOutcome, ProcessSpec};

/// Starts external programs on behalf of the harness.
///
/// The trait is object-safe so the harness can hold a `Box<dyn Launcher>`.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run `spec` to completion and report how it exited.
    ///
    /// Used for the build step; the caller decides whether a non-zero exit
    /// is fatal.
    async fn run(&self, spec: &ProcessSpec) -> io::Result<ExitOutcome>;

    /// Spawn `spec` and return a handle to the running process.
    async fn spawn(&self, spec: &ProcessSpec) -> io::Result<Box<dyn ManagedProcess>>;
}

/// A live handle to a spawned process.
///
/// Implementations must make [`ManagedProcess::try_wait`] and
/// [`ManagedProcess::wait`] report the same outcome once the process has
/// exited, no matter how many times they are called.
#[async_trait]
pub trait ManagedProcess: Send {
    /// OS process id, if the platform reported one.
    fn pid(&self) -> Option<u32>;

    /// The spec this process was launched from.
    fn spec(&self) -> &ProcessSpec;

    /// Non-blocking check: `Some(outcome)` once the process has exited.
    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>>;

    /// Send a forceful termination request.
    ///
    /// This only delivers the request. Use [`ManagedProcess::wait`] to
    /// observe the exit.
    async fn kill(&mut self) -> io::Result<()>;

    /// Block until the process has exited.
    async fn wait(&mut self) -> io::Result<ExitOutcome>;
}

// Compile-time assertion: both traits must be usable as trait objects.
const _: () = {
    fn _assert_object_safe(_: &dyn Launcher, _: &dyn ManagedProcess) {}
};
