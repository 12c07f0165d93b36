use crate::error::{Error, Result};
use crate::server::echo::prepare_echo;
use crate::server::limiter::{ConnectionLimiter, ConnectionPermit};
use crate::server::monitor::ServerCounters;
use crate::server::{ACCEPT_POLL_INTERVAL_MS, READ_TIMEOUT_MS};
use crate::shutdown::ShutdownFlag;
use crate::time::timestamp_us;
use crate::transport::frame::FrameReader;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Echo server handling each TCP connection on its own worker thread.
pub struct TcpEchoServer {
    listener: TcpListener,
    limiter: ConnectionLimiter,
    counters: Arc<ServerCounters>,
}

/// Map a bind failure to a diagnostic that names the address.
pub(crate) fn bind_error(addr: SocketAddr, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::AddrInUse {
        Error::Socket(format!(
            "Failed to bind to {}: Address already in use. Try a different port or ensure no other process is using it.",
            addr
        ))
    } else {
        Error::Socket(format!("Failed to bind to {}: {}", addr, e))
    }
}

impl TcpEchoServer {
    pub fn bind(
        addr: SocketAddr,
        max_connections: usize,
        counters: Arc<ServerCounters>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| bind_error(addr, e))?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            limiter: ConnectionLimiter::new(max_connections),
            counters,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve connections until `shutdown` is requested, then join
    /// every worker.
    pub fn run(self, shutdown: &ShutdownFlag) -> Result<()> {
        info!(
            address = %self.local_addr()?,
            max_connections = self.limiter.max(),
            "TCP echo server listening"
        );

        let poll = Duration::from_millis(ACCEPT_POLL_INTERVAL_MS);
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        while !shutdown.is_requested() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Some(worker) = self.admit(stream, peer, shutdown) {
                        workers.push(worker);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(poll),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if shutdown.is_requested() {
                        break;
                    }
                    self.counters.increment_error();
                    error!(error = %e, "Failed to accept connection");
                    thread::sleep(poll);
                }
            }

            let (finished, running): (Vec<_>, Vec<_>) =
                workers.into_iter().partition(|w| w.is_finished());
            finished.into_iter().for_each(join_worker);
            workers = running;
        }

        info!(workers = workers.len(), "Shutting down TCP server");
        workers.into_iter().for_each(join_worker);
        Ok(())
    }

    /// Spawn a worker for `stream`, or close it when the limit is reached.
    fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: &ShutdownFlag,
    ) -> Option<JoinHandle<()>> {
        let Some(permit) = self.limiter.try_acquire() else {
            self.counters.increment_rejected();
            warn!(
                peer = %peer,
                max_connections = self.limiter.max(),
                "Connection limit reached, rejecting client"
            );
            return None;
        };

        info!(peer = %peer, "New client connected");
        let counters = Arc::clone(&self.counters);
        let shutdown = shutdown.clone();
        let spawned = thread::Builder::new()
            .name(format!("conn-{}", peer))
            .spawn(move || serve_connection(stream, peer, counters, shutdown, permit));

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.counters.increment_error();
                error!(error = %e, peer = %peer, "Failed to spawn connection worker");
                None
            }
        }
    }
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        error!("Connection worker panicked");
    }
}

fn configure_stream(stream: &TcpStream) -> io::Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)))
}

/// Echo frames on one connection until EOF, an error, or shutdown.
fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    counters: Arc<ServerCounters>,
    shutdown: ShutdownFlag,
    _permit: ConnectionPermit,
) {
    if let Err(e) = configure_stream(&stream) {
        counters.increment_error();
        error!(error = %e, peer = %peer, "Failed to configure connection");
        return;
    }

    counters.connection_opened();
    let mut frames = FrameReader::new();

    while !shutdown.is_requested() {
        let frame = match frames.read_frame(&mut stream) {
            Ok(frame) => frame,
            Err(Error::Timeout) => continue,
            Err(Error::ConnectionClosed) => {
                debug!(peer = %peer, "Client disconnected");
                break;
            }
            Err(e) => {
                if !shutdown.is_requested() {
                    counters.increment_error();
                    warn!(error = %e, peer = %peer, "Dropping connection");
                }
                break;
            }
        };

        let recv_ts = timestamp_us();
        if let Err(e) = prepare_echo(frame, recv_ts, &counters) {
            counters.increment_error();
            warn!(error = %e, peer = %peer, "Dropping connection");
            break;
        }

        match stream.write_all(frame) {
            Ok(()) => counters.increment_echoed(),
            Err(e) => {
                counters.increment_error();
                error!(error = %e, peer = %peer, "Failed to send packet");
                break;
            }
        }
    }

    counters.connection_closed();
}
