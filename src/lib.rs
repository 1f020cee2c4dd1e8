//! Minimal single-threaded cooperative event loop.
//!
//! This crate schedules many suspendable tasks over one OS thread. A task is
//! stepped until it yields a *wait intent* describing what it is waiting for
//! (I/O readiness on a handle, or a wall-clock deadline); the loop parks it,
//! blocks on one readiness primitive with a timeout derived from the earliest
//! pending deadline, and requeues the task when its wait condition fires.
//!
//! # Architecture
//!
//! - **EventLoop**: drains the ready queue, classifies yielded wait intents,
//!   computes the poll timeout, and requeues woken tasks
//! - **Multiplexer**: wraps the OS readiness primitive (epoll on Linux,
//!   kqueue on macOS) and tracks which task owns each handle+direction watch
//! - **TimerHeap**: priority queue of sleeping tasks ordered by deadline
//! - **Task**: a suspendable unit of computation stepped with no argument
//!
//! # Example
//!
//! ```ignore
//! use miniloop::{EventLoop, Step, sleep};
//! use std::time::Duration;
//!
//! let mut event_loop = EventLoop::new()?;
//! let mut slept = false;
//! event_loop.spawn(move || {
//!     if !slept {
//!         slept = true;
//!         return Step::Wait(sleep(Duration::from_millis(100)));
//!     }
//!     println!("woke up");
//!     Step::Done
//! });
//! event_loop.run()?;
//! ```
//!
//! Scheduling is strictly cooperative: a task relinquishes control only by
//! returning from its step function, and a task that never yields starves
//! the whole loop.

mod error;
mod poll;
mod scheduler;
mod task;
mod timer;

pub use error::{MultiplexerError, TaskError, WatchConflict, WatchError};
pub use poll::Direction;
pub use scheduler::{EventLoop, Spawner};
pub use task::{Step, Task, WaitIntent, sleep, wait_readable, wait_writable};
