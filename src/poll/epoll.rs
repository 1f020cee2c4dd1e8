//! Linux poller backed by epoll.
//!
//! epoll keys interest by file descriptor with a combined event mask, so
//! this wrapper maintains the current mask per descriptor and translates
//! per-direction add/remove calls into `EPOLL_CTL_ADD`/`MOD`/`DEL`.

use super::{Direction, ReadyEvent};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

const MAX_EVENTS: usize = 64;

pub(super) struct Poller {
    epoll_fd: RawFd,
    // Current interest mask per registered descriptor.
    interest: HashMap<RawFd, u32>,
}

fn direction_bit(direction: Direction) -> u32 {
    match direction {
        Direction::Read => EPOLLIN as u32,
        Direction::Write => EPOLLOUT as u32,
    }
}

/// Converts a poll timeout to epoll's millisecond granularity, rounding up
/// so a not-yet-expired deadline never becomes a zero timeout (which would
/// busy-spin the loop). `None` means block indefinitely.
fn timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(duration) => {
            let mut ms = duration.as_millis();
            if duration.as_nanos() % 1_000_000 != 0 {
                ms += 1;
            }
            ms.min(i32::MAX as u128) as i32
        }
    }
}

impl Poller {
    pub(super) fn new() -> io::Result<Self> {
        let epoll_fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll_fd,
            interest: HashMap::new(),
        })
    }

    pub(super) fn add(&mut self, fd: RawFd, direction: Direction) -> io::Result<()> {
        let current = self.interest.get(&fd).copied().unwrap_or(0);
        let mask = current | direction_bit(direction);
        let op = if current == 0 {
            EPOLL_CTL_ADD
        } else {
            EPOLL_CTL_MOD
        };

        self.ctl(op, fd, mask)?;
        self.interest.insert(fd, mask);
        Ok(())
    }

    pub(super) fn remove(&mut self, fd: RawFd, direction: Direction) -> io::Result<()> {
        let Some(current) = self.interest.get(&fd).copied() else {
            return Ok(());
        };

        let mask = current & !direction_bit(direction);
        let result = if mask == 0 {
            self.interest.remove(&fd);
            self.ctl(EPOLL_CTL_DEL, fd, 0)
        } else {
            self.interest.insert(fd, mask);
            self.ctl(EPOLL_CTL_MOD, fd, mask)
        };

        match result {
            // ENOENT / EBADF are expected when the descriptor was already
            // closed; the kernel dropped the registration for us.
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
        let mut events = [epoll_event { events: 0, u64: 0 }; MAX_EVENTS];

        let n = unsafe {
            epoll_wait(
                self.epoll_fd,
                events.as_mut_ptr(),
                MAX_EVENTS as i32,
                timeout_ms(timeout),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                // EINTR: report nothing ready; the loop recomputes its
                // timeout and polls again.
                return Ok(Vec::new());
            }
            return Err(err);
        }

        let hangup = (EPOLLERR | EPOLLHUP) as u32;
        let ready = events
            .iter()
            .take(n as usize)
            .map(|event| ReadyEvent {
                fd: event.u64 as RawFd,
                readable: event.events & (EPOLLIN as u32 | hangup) != 0,
                writable: event.events & (EPOLLOUT as u32 | hangup) != 0,
            })
            .collect();

        Ok(ready)
    }

    fn ctl(&self, op: i32, fd: RawFd, mask: u32) -> io::Result<()> {
        let mut event = epoll_event {
            events: mask,
            u64: fd as u64,
        };
        let event_ptr = if op == EPOLL_CTL_DEL {
            std::ptr::null_mut()
        } else {
            &mut event
        };

        let ret = unsafe { epoll_ctl(self.epoll_fd, op, fd, event_ptr) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epoll_fd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_rounds_up_to_whole_milliseconds() {
        assert_eq!(timeout_ms(None), -1);
        assert_eq!(timeout_ms(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_ms(Some(Duration::from_millis(5))), 5);
        assert_eq!(timeout_ms(Some(Duration::from_micros(1))), 1);
        assert_eq!(timeout_ms(Some(Duration::from_micros(4_500))), 5);
    }
}
