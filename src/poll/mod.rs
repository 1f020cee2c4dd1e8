//! Readiness multiplexer: watch bookkeeping over the OS polling primitive.
//!
//! The [`Multiplexer`] pairs a platform poller (epoll on Linux, kqueue on
//! macOS) with a table mapping each watched `(handle, direction)` to the
//! task that owns the watch. Watches are single-shot: once readiness is
//! reported the watch is removed and the owning task must re-register to
//! wait again.

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "macos")]
mod kqueue;

#[cfg(target_os = "linux")]
use epoll::Poller;
#[cfg(target_os = "macos")]
use kqueue::Poller;

use crate::error::{MultiplexerError, WatchConflict, WatchError};
use crate::task::Task;

use log::trace;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// The direction of I/O interest for a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

/// One readiness event reported by the platform poller.
///
/// Error and hang-up conditions are folded into both flags so that a task
/// waiting on a dying handle wakes up and observes the failure from its own
/// syscall.
struct ReadyEvent {
    fd: RawFd,
    readable: bool,
    writable: bool,
}

/// Tracks which task is waiting on which handle+direction and blocks on the
/// OS readiness primitive on the loop's behalf.
pub(crate) struct Multiplexer {
    poller: Poller,
    watches: HashMap<(RawFd, Direction), Box<dyn Task>>,
}

impl Multiplexer {
    pub(crate) fn new() -> Result<Self, MultiplexerError> {
        Ok(Self {
            poller: Poller::new()?,
            watches: HashMap::new(),
        })
    }

    /// Registers one watch owned by `task`.
    ///
    /// Fails without touching any state if a watch for the same
    /// `(fd, direction)` pair is already outstanding, or if the OS refuses
    /// the handle. The rejected task is dropped by the caller.
    pub(crate) fn watch(
        &mut self,
        fd: RawFd,
        direction: Direction,
        task: Box<dyn Task>,
    ) -> Result<(), WatchError> {
        if self.watches.contains_key(&(fd, direction)) {
            return Err(WatchConflict { fd, direction }.into());
        }

        self.poller
            .add(fd, direction)
            .map_err(|source| WatchError::Register {
                fd,
                direction,
                source,
            })?;

        self.watches.insert((fd, direction), task);
        Ok(())
    }

    /// Removes all watches for a handle, e.g. when the handle is closed.
    ///
    /// Tasks owning the dropped watches are discarded; nothing would ever
    /// wake them again.
    pub(crate) fn unwatch(&mut self, fd: RawFd) {
        self.drop_watch(fd, Direction::Read);
        self.drop_watch(fd, Direction::Write);
    }

    /// Blocks up to `timeout` on the OS readiness primitive and returns the
    /// tasks whose handles became ready, in the order the OS reported them.
    ///
    /// `None` blocks indefinitely; the caller must guarantee at least one
    /// watch exists, or the loop would deadlock. Returned watches are
    /// removed (single-shot). An interrupted poll yields an empty batch and
    /// lets the caller recompute its timeout.
    pub(crate) fn poll(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<Box<dyn Task>>, MultiplexerError> {
        let events = self.poller.wait(timeout).map_err(MultiplexerError)?;
        let mut woken = Vec::new();

        for event in events {
            if event.readable
                && let Some(task) = self.take_watch(event.fd, Direction::Read)
            {
                woken.push(task);
            }
            if event.writable
                && let Some(task) = self.take_watch(event.fd, Direction::Write)
            {
                woken.push(task);
            }
        }

        trace!("poll woke {} task(s)", woken.len());
        Ok(woken)
    }

    pub(crate) fn len(&self) -> usize {
        self.watches.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    fn take_watch(&mut self, fd: RawFd, direction: Direction) -> Option<Box<dyn Task>> {
        let task = self.watches.remove(&(fd, direction))?;
        // The handle may already be closed; deregistration failure is fine.
        let _ = self.poller.remove(fd, direction);
        Some(task)
    }

    fn drop_watch(&mut self, fd: RawFd, direction: Direction) {
        if self.watches.remove(&(fd, direction)).is_some() {
            let _ = self.poller.remove(fd, direction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;
    use crate::task::Step;

    use std::time::Duration;

    fn noop() -> Box<dyn Task> {
        Box::new(|| Step::Done)
    }

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0i32; 2];
        let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(res, 0, "pipe() failed");
        (fds[0], fds[1])
    }

    fn close(fd: RawFd) {
        unsafe { libc::close(fd) };
    }

    #[test]
    fn duplicate_watch_is_rejected() {
        let (rfd, wfd) = pipe();
        let mut mux = Multiplexer::new().unwrap();

        mux.watch(rfd, Direction::Read, noop()).unwrap();
        let err = mux.watch(rfd, Direction::Read, noop()).unwrap_err();
        assert!(matches!(err, WatchError::Conflict(_)));

        // The original watch survives the rejected registration.
        assert_eq!(mux.len(), 1);

        close(rfd);
        close(wfd);
    }

    #[test]
    fn both_directions_on_one_handle_coexist() {
        let (rfd, wfd) = pipe();
        let mut mux = Multiplexer::new().unwrap();

        mux.watch(rfd, Direction::Read, noop()).unwrap();
        mux.watch(rfd, Direction::Write, noop()).unwrap();
        assert_eq!(mux.len(), 2);

        mux.unwatch(rfd);
        assert!(mux.is_empty());

        close(rfd);
        close(wfd);
    }

    #[test]
    fn poll_is_single_shot() {
        let (rfd, wfd) = pipe();
        let mut mux = Multiplexer::new().unwrap();

        mux.watch(rfd, Direction::Read, noop()).unwrap();

        let byte = [1u8];
        let wrote = unsafe { libc::write(wfd, byte.as_ptr() as *const _, 1) };
        assert_eq!(wrote, 1);

        let woken = mux.poll(Some(Duration::from_millis(200))).unwrap();
        assert_eq!(woken.len(), 1);
        assert!(mux.is_empty());

        close(rfd);
        close(wfd);
    }

    #[test]
    fn zero_timeout_returns_immediately() {
        let (rfd, wfd) = pipe();
        let mut mux = Multiplexer::new().unwrap();

        mux.watch(rfd, Direction::Read, noop()).unwrap();

        // Nothing written: the pipe is not readable yet.
        let woken = mux.poll(Some(Duration::ZERO)).unwrap();
        assert!(woken.is_empty());
        assert_eq!(mux.len(), 1);

        close(rfd);
        close(wfd);
    }
}
