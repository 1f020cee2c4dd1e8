use miniloop::{EventLoop, Step, Task, sleep, wait_readable};

use std::cell::Cell;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(res, 0, "pipe() failed");
    (fds[0], fds[1])
}

/// Waits for the read end of the pipe, drains one byte, then finishes.
struct Reader {
    fd: RawFd,
    waiting: bool,
    completed: Rc<Cell<bool>>,
}

impl Task for Reader {
    fn step(&mut self) -> Step {
        if !self.waiting {
            self.waiting = true;
            return Step::Wait(wait_readable(self.fd));
        }

        let mut buf = [0u8; 1];
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut _, 1) };
        assert_eq!(n, 1);
        self.completed.set(true);
        Step::Done
    }
}

/// Sleeps briefly, then writes one byte into the pipe.
struct DelayedWriter {
    fd: RawFd,
    slept: bool,
}

impl Task for DelayedWriter {
    fn step(&mut self) -> Step {
        if !self.slept {
            self.slept = true;
            return Step::Wait(sleep(Duration::from_millis(20)));
        }

        let byte = [1u8];
        let n = unsafe { libc::write(self.fd, byte.as_ptr() as *const _, 1) };
        assert_eq!(n, 1);
        Step::Done
    }
}

#[test]
fn second_watch_on_same_handle_is_rejected() {
    let (rfd, wfd) = pipe();

    let first_completed = Rc::new(Cell::new(false));
    let second_completed = Rc::new(Cell::new(false));

    let mut event_loop = EventLoop::new().expect("create loop");
    event_loop.spawn(Reader {
        fd: rfd,
        waiting: false,
        completed: Rc::clone(&first_completed),
    });
    event_loop.spawn(Reader {
        fd: rfd,
        waiting: false,
        completed: Rc::clone(&second_completed),
    });
    event_loop.spawn(DelayedWriter {
        fd: wfd,
        slept: false,
    });

    event_loop.run().expect("run");

    // The first registration wins and resolves normally; the duplicate is
    // rejected and its task dropped without touching the first watch.
    assert!(first_completed.get());
    assert!(!second_completed.get());

    unsafe {
        libc::close(rfd);
        libc::close(wfd);
    }
}
