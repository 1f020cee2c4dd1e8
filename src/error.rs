//! Error taxonomy for the event loop.
//!
//! Three levels, with distinct propagation rules:
//! - [`TaskError`]: raised while stepping a task; contained to that task
//! - [`WatchConflict`] / [`WatchError`]: a bad registration from one task;
//!   that task is dropped, existing state is left untouched
//! - [`MultiplexerError`]: the OS readiness primitive itself failed; fatal,
//!   propagated out of [`EventLoop::run`](crate::EventLoop::run)
//!
//! No retries happen anywhere in the core; retry policy belongs to the task
//! author.

use crate::poll::Direction;

use std::io;
use std::os::unix::io::RawFd;
use thiserror::Error;

/// An error raised by a task's step function.
///
/// Isolated to the failing task: the loop logs it, discards the task, and
/// keeps running everything else.
pub type TaskError = Box<dyn std::error::Error>;

/// A second watch was registered for a `(handle, direction)` pair that
/// already has one outstanding.
///
/// At most one task may wait on a given handle+direction at a time;
/// last-write-wins is deliberately rejected because it would silently
/// orphan the task holding the first watch. The registration is refused
/// before any state is mutated.
#[derive(Debug, Error)]
#[error("a {direction:?} watch is already registered for handle {fd}")]
pub struct WatchConflict {
    /// The contested handle.
    pub fd: RawFd,
    /// The contested direction.
    pub direction: Direction,
}

/// A watch registration was rejected.
///
/// Either kind signals a usage bug in the registering task (a duplicate
/// watch, or a handle the OS refuses to poll); the loop drops that task and
/// continues.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Conflict(#[from] WatchConflict),
    #[error("failed to register {direction:?} interest for handle {fd}: {source}")]
    Register {
        fd: RawFd,
        direction: Direction,
        source: io::Error,
    },
}

/// The OS readiness primitive failed.
///
/// Fatal: the loop cannot make progress without it, so this propagates out
/// of `run()`.
#[derive(Debug, Error)]
#[error("readiness multiplexer failed: {0}")]
pub struct MultiplexerError(#[from] pub io::Error);
