use miniloop::{EventLoop, Spawner, Step, Task, wait_readable, wait_writable};

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream as StdTcpStream};
use std::os::unix::io::AsRawFd;
use std::thread;

const RESPONSE: &[u8] = b"Hello World!\n";

/// Accepts exactly one connection, hands it to a [`Greeter`], then finishes.
struct OneShotAcceptor {
    listener: TcpListener,
    spawner: Spawner,
}

impl Task for OneShotAcceptor {
    fn step(&mut self) -> Step {
        match self.listener.accept() {
            Ok((stream, _peer)) => {
                if let Err(err) = stream.set_nonblocking(true) {
                    return Step::Failed(err.into());
                }
                self.spawner.spawn(Greeter {
                    stream,
                    state: GreeterState::Reading,
                });
                Step::Done
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                Step::Wait(wait_readable(self.listener.as_raw_fd()))
            }
            Err(err) => Step::Failed(err.into()),
        }
    }
}

enum GreeterState {
    Reading,
    Writing { pending: Vec<u8> },
}

/// Replies with a fixed greeting to every request chunk until EOF.
struct Greeter {
    stream: StdTcpStream,
    state: GreeterState,
}

impl Task for Greeter {
    fn step(&mut self) -> Step {
        loop {
            match &mut self.state {
                GreeterState::Reading => {
                    let mut buf = [0u8; 4096];
                    match self.stream.read(&mut buf) {
                        Ok(0) => return Step::Done,
                        Ok(_) => {
                            self.state = GreeterState::Writing {
                                pending: RESPONSE.to_vec(),
                            };
                        }
                        Err(err) if err.kind() == ErrorKind::WouldBlock => {
                            return Step::Wait(wait_readable(self.stream.as_raw_fd()));
                        }
                        Err(err) => return Step::Failed(err.into()),
                    }
                }
                GreeterState::Writing { pending } => match self.stream.write(pending) {
                    Ok(written) => {
                        pending.drain(..written);
                        if pending.is_empty() {
                            self.state = GreeterState::Reading;
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {
                        return Step::Wait(wait_writable(self.stream.as_raw_fd()));
                    }
                    Err(err) => return Step::Failed(err.into()),
                },
            }
        }
    }
}

#[test]
fn accepts_a_connection_and_replies() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.set_nonblocking(true).expect("set_nonblocking");
    let port = listener.local_addr().expect("local addr").port();

    let mut event_loop = EventLoop::new().expect("create loop");
    let spawner = event_loop.spawner();
    event_loop.spawn(OneShotAcceptor { listener, spawner });

    let client = thread::spawn(move || {
        let mut conn = StdTcpStream::connect(("127.0.0.1", port)).expect("connect");
        conn.write_all(b"ping").expect("write");

        let mut reply = vec![0u8; RESPONSE.len()];
        conn.read_exact(&mut reply).expect("read_exact");
        reply
    });

    // The loop terminates once the client hangs up and the greeter sees EOF.
    event_loop.run().expect("run");

    let reply = client.join().expect("client thread");
    assert_eq!(&reply[..], RESPONSE);
}
