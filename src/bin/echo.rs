//! Example workload: a TCP server built on the cooperative loop.
//!
//! One accept-loop task plus one task per connection, all yielding wait
//! intents around every potentially-blocking socket call. Each connection
//! receives a fixed greeting for every chunk of bytes it sends and is
//! closed on EOF. Run with `RUST_LOG=info cargo run --bin echo`.

use miniloop::{EventLoop, Spawner, Step, Task, wait_readable, wait_writable};

use log::{info, warn};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;

const RESPONSE: &[u8] = b"Hello World!\n";

/// Accepts connections forever, spawning a [`Connection`] task for each.
struct Acceptor {
    listener: TcpListener,
    spawner: Spawner,
}

impl Task for Acceptor {
    fn step(&mut self) -> Step {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("connection from {peer}");
                    if let Err(err) = stream.set_nonblocking(true) {
                        warn!("dropping connection from {peer}: {err}");
                        continue;
                    }
                    self.spawner.spawn(Connection::new(stream));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Step::Wait(wait_readable(self.listener.as_raw_fd()));
                }
                Err(err) => return Step::Failed(err.into()),
            }
        }
    }
}

enum ConnectionState {
    Reading,
    Writing { pending: Vec<u8> },
}

/// Per-connection state machine: read a request, send the greeting, repeat
/// until EOF. The socket closes on every exit path because the task owns
/// the stream and drop closes it.
struct Connection {
    stream: TcpStream,
    state: ConnectionState,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            state: ConnectionState::Reading,
        }
    }
}

impl Task for Connection {
    fn step(&mut self) -> Step {
        loop {
            match &mut self.state {
                ConnectionState::Reading => {
                    let mut buf = [0u8; 4096];
                    match self.stream.read(&mut buf) {
                        Ok(0) => return Step::Done,
                        Ok(_) => {
                            self.state = ConnectionState::Writing {
                                pending: RESPONSE.to_vec(),
                            };
                        }
                        Err(err) if err.kind() == ErrorKind::WouldBlock => {
                            return Step::Wait(wait_readable(self.stream.as_raw_fd()));
                        }
                        Err(err) => return Step::Failed(err.into()),
                    }
                }
                ConnectionState::Writing { pending } => {
                    match self.stream.write(pending) {
                        Ok(written) => {
                            pending.drain(..written);
                            if pending.is_empty() {
                                self.state = ConnectionState::Reading;
                            }
                        }
                        Err(err) if err.kind() == ErrorKind::WouldBlock => {
                            return Step::Wait(wait_writable(self.stream.as_raw_fd()));
                        }
                        Err(err) => return Step::Failed(err.into()),
                    }
                }
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    flexi_logger::Logger::try_with_env_or_str("info")?.start()?;

    let listener = TcpListener::bind("127.0.0.1:8000")?;
    listener.set_nonblocking(true)?;
    info!("listening on {}", listener.local_addr()?);

    let mut event_loop = EventLoop::new()?;
    let spawner = event_loop.spawner();
    event_loop.spawn(Acceptor { listener, spawner });
    event_loop.run()?;

    Ok(())
}
