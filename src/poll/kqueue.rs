//! macOS poller backed by kqueue.
//!
//! kqueue keys interest by `(ident, filter)` pair, which maps one-to-one
//! onto this crate's `(handle, direction)` watches, so no per-descriptor
//! mask bookkeeping is needed.

use super::{Direction, ReadyEvent};

use libc::{
    EV_ADD, EV_DELETE, EV_ENABLE, EVFILT_READ, EVFILT_WRITE, kevent, kqueue, timespec,
};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

const MAX_EVENTS: usize = 64;

pub(super) struct Poller {
    kqueue_fd: RawFd,
}

fn direction_filter(direction: Direction) -> i16 {
    match direction {
        Direction::Read => EVFILT_READ,
        Direction::Write => EVFILT_WRITE,
    }
}

fn empty_event() -> kevent {
    kevent {
        ident: 0,
        filter: 0,
        flags: 0,
        fflags: 0,
        data: 0,
        udata: ptr::null_mut(),
    }
}

impl Poller {
    pub(super) fn new() -> io::Result<Self> {
        let kqueue_fd = unsafe { kqueue() };
        if kqueue_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { kqueue_fd })
    }

    pub(super) fn add(&mut self, fd: RawFd, direction: Direction) -> io::Result<()> {
        let mut change = empty_event();
        change.ident = fd as usize;
        change.filter = direction_filter(direction);
        change.flags = EV_ADD | EV_ENABLE;

        self.change(&change)
    }

    pub(super) fn remove(&mut self, fd: RawFd, direction: Direction) -> io::Result<()> {
        let mut change = empty_event();
        change.ident = fd as usize;
        change.filter = direction_filter(direction);
        change.flags = EV_DELETE;

        match self.change(&change) {
            // Already gone: the descriptor was closed and the kernel
            // dropped the filter.
            Err(err)
                if err.raw_os_error() == Some(libc::ENOENT)
                    || err.raw_os_error() == Some(libc::EBADF) =>
            {
                Ok(())
            }
            other => other,
        }
    }

    pub(super) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<ReadyEvent>> {
        let mut events = [empty_event(); MAX_EVENTS];

        let ts;
        let ts_ptr = match timeout {
            None => ptr::null(),
            Some(duration) => {
                ts = timespec {
                    tv_sec: duration.as_secs().min(i64::MAX as u64) as i64,
                    tv_nsec: duration.subsec_nanos() as i64,
                };
                &ts as *const timespec
            }
        };

        let n = unsafe {
            kevent(
                self.kqueue_fd,
                ptr::null(),
                0,
                events.as_mut_ptr(),
                MAX_EVENTS as i32,
                ts_ptr,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        let ready = events
            .iter()
            .take(n as usize)
            .map(|event| ReadyEvent {
                fd: event.ident as RawFd,
                readable: event.filter == EVFILT_READ,
                writable: event.filter == EVFILT_WRITE,
            })
            .collect();

        Ok(ready)
    }

    fn change(&self, change: &kevent) -> io::Result<()> {
        let ret = unsafe { kevent(self.kqueue_fd, change, 1, ptr::null_mut(), 0, ptr::null()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe { libc::close(self.kqueue_fd) };
    }
}
