//! Task and wait-intent protocol.
//!
//! A task is a suspendable unit of computation. The loop resumes it by
//! calling [`Task::step`] with no argument; the task runs until it either
//! finishes or reaches a point where it would block, and reports that as a
//! [`Step`]. The runtime never sends a value back into a resumed task — a
//! resume only means "your wait condition is satisfied, proceed".
//!
//! Tasks are written as explicit state machines (or, for single-shot work,
//! plain `FnMut() -> Step` closures). A task may compose smaller suspendable
//! operations internally; the loop only ever observes one wait intent per
//! step call.
//!
//! # Example
//!
//! ```ignore
//! use miniloop::{Step, Task, WaitIntent, wait_readable};
//! use std::os::unix::io::RawFd;
//!
//! struct WaitThenRead {
//!     fd: RawFd,
//!     waited: bool,
//! }
//!
//! impl Task for WaitThenRead {
//!     fn step(&mut self) -> Step {
//!         if !self.waited {
//!             self.waited = true;
//!             return Step::Wait(wait_readable(self.fd));
//!         }
//!         // fd is readable now; do the read, then finish.
//!         Step::Done
//!     }
//! }
//! ```

use crate::error::TaskError;

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

/// What a suspending task is waiting for.
///
/// Yielded inside [`Step::Wait`]. The loop does not reschedule the task
/// until the described condition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitIntent {
    /// Suspend until the handle is readable.
    Read(RawFd),
    /// Suspend until the handle is writable.
    Write(RawFd),
    /// Suspend until monotonic time reaches the deadline.
    Timer(Instant),
}

/// The outcome of stepping a task once.
#[derive(Debug)]
pub enum Step {
    /// The task suspended; park it until the wait condition fires.
    Wait(WaitIntent),
    /// Normal completion. The task is discarded; there is no result channel.
    Done,
    /// The step raised an error. The loop logs it and discards the task;
    /// the failure is never propagated into other tasks or the loop itself.
    Failed(TaskError),
}

/// A suspendable unit of computation driven by the event loop.
///
/// `step` is called once per resumption and must not block the thread:
/// anything that could block belongs behind a yielded [`WaitIntent`].
pub trait Task {
    /// Runs the task until it completes, fails, or needs to wait.
    fn step(&mut self) -> Step;
}

impl<F> Task for F
where
    F: FnMut() -> Step,
{
    fn step(&mut self) -> Step {
        (self)()
    }
}

/// Suspends the calling task for at least `duration`.
///
/// Returns the intent to yield; the task resumes no earlier than
/// `now + duration`.
///
/// # Example
/// ```ignore
/// return Step::Wait(sleep(Duration::from_secs(1)));
/// ```
pub fn sleep(duration: Duration) -> WaitIntent {
    WaitIntent::Timer(Instant::now() + duration)
}

/// Suspends the calling task until `fd` is readable.
pub fn wait_readable(fd: RawFd) -> WaitIntent {
    WaitIntent::Read(fd)
}

/// Suspends the calling task until `fd` is writable.
pub fn wait_writable(fd: RawFd) -> WaitIntent {
    WaitIntent::Write(fd)
}
