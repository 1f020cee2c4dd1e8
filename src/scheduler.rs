//! The event loop: ready queue, wait-intent classification, poll timeout.
//!
//! One loop iteration drains every currently-runnable task, then blocks for
//! more work:
//!
//! 1. pop tasks FIFO from the ready queue, step each once, and park it
//!    according to the wait intent it yields (watch table or timer heap);
//!    `Done` and `Failed` tasks are discarded
//! 2. stop when nothing is left that could ever become runnable again
//! 3. compute the poll timeout from the earliest pending deadline
//! 4. block on the readiness multiplexer (or plain-sleep when only timers
//!    remain), requeueing every woken task
//! 5. requeue every expired timer task
//!
//! Separating "drain all runnable work" from "block for more work" keeps
//! tasks from starving each other within one batch, and the timeout
//! computation keeps the loop from spinning when nothing is ready.

use crate::error::MultiplexerError;
use crate::poll::{Direction, Multiplexer};
use crate::task::{Step, Task, WaitIntent};
use crate::timer::TimerHeap;

use log::{debug, error, trace};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::thread;
use std::time::Instant;

type ReadyQueue = Rc<RefCell<VecDeque<Box<dyn Task>>>>;

/// A handle for enqueueing tasks into an [`EventLoop`] from inside a
/// running task.
///
/// The accept loop of a server uses this to spawn one task per connection.
/// Cloning is cheap; every clone feeds the same ready queue.
///
/// # Example
/// ```ignore
/// let spawner = event_loop.spawner();
/// event_loop.spawn(move || {
///     spawner.spawn(|| Step::Done);
///     Step::Done
/// });
/// ```
#[derive(Clone)]
pub struct Spawner {
    ready: ReadyQueue,
}

impl Spawner {
    /// Enqueues a task. Fire-and-forget: there is no way to observe the
    /// task's completion or retrieve a value from it.
    pub fn spawn(&self, task: impl Task + 'static) {
        self.ready.borrow_mut().push_back(Box::new(task));
    }
}

/// A single-threaded cooperative event loop.
///
/// Owns the ready queue, the readiness watch table, and the timer heap.
/// Constructed explicitly and passed around (no process-wide singleton), so
/// independent loops can coexist, e.g. one per test.
///
/// # Example
/// ```ignore
/// let mut event_loop = EventLoop::new()?;
/// event_loop.spawn(|| Step::Done);
/// event_loop.run()?;
/// ```
pub struct EventLoop {
    ready: ReadyQueue,
    multiplexer: Multiplexer,
    timers: TimerHeap,
}

impl EventLoop {
    /// Creates an empty loop. Fails only if the OS readiness primitive
    /// cannot be set up.
    pub fn new() -> Result<Self, MultiplexerError> {
        Ok(Self {
            ready: Rc::new(RefCell::new(VecDeque::new())),
            multiplexer: Multiplexer::new()?,
            timers: TimerHeap::new(),
        })
    }

    /// Enqueues a task, callable both before and during [`run`](Self::run).
    pub fn spawn(&self, task: impl Task + 'static) {
        self.ready.borrow_mut().push_back(Box::new(task));
    }

    /// Returns a handle that lets running tasks spawn siblings.
    pub fn spawner(&self) -> Spawner {
        Spawner {
            ready: Rc::clone(&self.ready),
        }
    }

    /// Drops all outstanding watches for a handle, e.g. before the
    /// embedding code closes it. Tasks owning the dropped watches are
    /// discarded; nothing would ever wake them again.
    pub fn unwatch(&mut self, fd: RawFd) {
        self.multiplexer.unwatch(fd);
    }

    /// Drives the loop until no task, watch, or timer remains.
    ///
    /// Blocks the calling thread. Task-level failures are logged and
    /// contained; only a failure of the readiness primitive itself aborts
    /// the loop.
    pub fn run(&mut self) -> Result<(), MultiplexerError> {
        loop {
            self.drain_ready();

            if self.ready.borrow().is_empty()
                && self.multiplexer.is_empty()
                && self.timers.is_empty()
            {
                debug!("event loop exhausted");
                return Ok(());
            }

            let now = Instant::now();
            let timeout = self
                .timers
                .peek_deadline()
                .map(|deadline| deadline.saturating_duration_since(now));

            if self.multiplexer.is_empty() {
                // Timers only: nothing to block on in the multiplexer, so
                // plain-sleep until the earliest deadline.
                if let Some(duration) = timeout
                    && !duration.is_zero()
                {
                    trace!("sleeping {duration:?} until next timer");
                    thread::sleep(duration);
                }
            } else {
                trace!(
                    "polling {} watch(es) with {} timer(s) pending, timeout {timeout:?}",
                    self.multiplexer.len(),
                    self.timers.len()
                );
                let woken = self.multiplexer.poll(timeout)?;
                let mut ready = self.ready.borrow_mut();
                for task in woken {
                    ready.push_back(task);
                }
            }

            let expired = self.timers.pop_expired(Instant::now());
            if !expired.is_empty() {
                trace!("{} timer(s) expired", expired.len());
                let mut ready = self.ready.borrow_mut();
                for task in expired {
                    ready.push_back(task);
                }
            }
        }
    }

    /// Steps every currently-runnable task once, FIFO, classifying each
    /// yielded wait intent. Tasks spawned during the drain run in the same
    /// pass.
    fn drain_ready(&mut self) {
        loop {
            // The borrow must not be held across step(): the task may
            // spawn siblings into the same queue.
            let next = self.ready.borrow_mut().pop_front();
            let Some(mut task) = next else {
                break;
            };

            match task.step() {
                Step::Wait(WaitIntent::Read(fd)) => self.register(fd, Direction::Read, task),
                Step::Wait(WaitIntent::Write(fd)) => self.register(fd, Direction::Write, task),
                Step::Wait(WaitIntent::Timer(deadline)) => self.timers.push(deadline, task),
                Step::Done => trace!("task completed"),
                Step::Failed(err) => error!("task failed: {err}"),
            }
        }
    }

    fn register(&mut self, fd: RawFd, direction: Direction, task: Box<dyn Task>) {
        // A rejected registration is a usage bug in that one task; the
        // task holding the existing watch is left untouched.
        if let Err(err) = self.multiplexer.watch(fd, direction, task) {
            error!("dropping task: {err}");
        }
    }
}
